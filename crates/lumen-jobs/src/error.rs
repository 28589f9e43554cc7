//! Job error types.

use lumen_core::LumenError;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
///
/// Split in two families: job faults end the job in `failed` and are never
/// retried, everything else is an infrastructure fault that leaves the
/// delivery unacknowledged so it is handed out again.
#[derive(Debug, Error)]
pub enum JobError {
    /// The uploaded source file is gone.
    #[error("Input file is missing")]
    InputMissing { path: String },

    /// The input reference points outside the owner's upload directory.
    #[error("Input rejected: {0}")]
    InputRejected(String),

    /// No renderer for the job's media kind.
    #[error("Unsupported media kind: {0}")]
    UnsupportedMedia(String),

    /// The renderer rejected the input.
    #[error("Render failed: {0}")]
    Render(String),

    /// Render did not finish in time.
    #[error("Render timed out after {0} seconds")]
    Timeout(u64),

    /// The owner lock stayed contended for too long.
    #[error("Owner lock still contended after {attempts} attempts")]
    Contention { attempts: u32 },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Job store error.
    #[error("Store error: {0}")]
    Store(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Illegal status transition.
    #[error("Invalid status transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    /// Rejected input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Worker error.
    #[error("Worker error: {0}")]
    Worker(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Returns true if this error terminally fails the job.
    pub fn is_job_fault(&self) -> bool {
        matches!(
            self,
            JobError::InputMissing { .. }
                | JobError::InputRejected(_)
                | JobError::UnsupportedMedia(_)
                | JobError::Render(_)
                | JobError::Timeout(_)
                | JobError::Contention { .. }
        )
    }

    /// Returns true if the job should be left for redelivery.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            JobError::Redis(_) | JobError::Pool(_) | JobError::Store(_) | JobError::Serialization(_)
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::InputMissing { .. } => "input_missing",
            JobError::InputRejected(_) => "input_rejected",
            JobError::UnsupportedMedia(_) => "unsupported_media",
            JobError::Render(_) => "render",
            JobError::Timeout(_) => "timeout",
            JobError::Contention { .. } => "contention",
            JobError::Serialization(_) => "serialization",
            JobError::Redis(_) | JobError::Pool(_) => "redis",
            JobError::Store(_) => "store",
            JobError::NotFound(_) => "not_found",
            JobError::InvalidTransition { .. } => "invalid_transition",
            JobError::Validation(_) => "validation",
            JobError::Configuration(_) => "configuration",
            JobError::Worker(_) => "worker",
            JobError::Internal(_) => "internal",
        }
    }
}

impl From<LumenError> for JobError {
    fn from(err: LumenError) -> Self {
        match err {
            LumenError::InvalidTransition { job_id, from, to } => {
                JobError::InvalidTransition { job_id, from, to }
            }
            LumenError::Validation(msg) => JobError::Validation(msg),
            LumenError::NotFound { id, .. } => JobError::NotFound(id),
            LumenError::Store(msg) | LumenError::Coordination(msg) => JobError::Store(msg),
            LumenError::Configuration(msg) => JobError::Configuration(msg),
            other => JobError::Internal(other.to_string()),
        }
    }
}

impl From<JobError> for LumenError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Validation(msg) => LumenError::Validation(msg),
            JobError::NotFound(id) => LumenError::not_found("Job", id),
            JobError::InvalidTransition { job_id, from, to } => {
                LumenError::InvalidTransition { job_id, from, to }
            }
            JobError::Redis(_) | JobError::Pool(_) => LumenError::Coordination(err.to_string()),
            JobError::Store(msg) => LumenError::Store(msg),
            JobError::Configuration(msg) => LumenError::Configuration(msg),
            JobError::Timeout(_) => LumenError::Timeout(err.to_string()),
            other => LumenError::Internal(other.to_string()),
        }
    }
}
