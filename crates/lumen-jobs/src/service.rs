//! Ingress operations: submit a job, list an owner's jobs.

use crate::error::{JobError, JobResult};
use crate::metrics::JobMetrics;
use crate::payload::ThumbnailPayload;
use crate::queue::WorkQueue;
use crate::store::JobStore;
use crate::uploads::owner_relative;
use lumen_core::{JobId, JobSummary, OwnerId, ThumbnailJob};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A thumbnail request from the upload layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub input_ref: String,
    pub media_kind: String,
    pub filename: String,
}

/// Result of [`JobService::enqueue`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueOutcome {
    /// The job as stored.
    pub job: JobSummary,
    /// False if the job id was already known.
    pub created: bool,
}

/// Creates jobs and reads them back.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    queue_name: String,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn WorkQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            queue,
            queue_name: queue_name.into(),
        }
    }

    /// Records a job as `queued` and hands it to the work queue.
    ///
    /// Idempotent on the job id: a repeat call creates nothing. An existing
    /// job that has not finished is offered to the queue again, which the
    /// queue's own dedup turns into a no-op while it is already queued.
    #[instrument(skip(self, request), fields(job_id = %request.job_id, owner_id = %request.owner_id))]
    pub async fn enqueue(&self, request: EnqueueRequest) -> JobResult<EnqueueOutcome> {
        validate(&request)?;

        let mut job = ThumbnailJob::new(
            request.job_id,
            request.owner_id,
            request.input_ref,
            request.media_kind,
            request.filename,
        );
        job.mark_queued()?;

        let created = self.store.insert_if_absent(&job).await?;
        if !created {
            job = self
                .store
                .get(&job.job_id)
                .await?
                .ok_or_else(|| JobError::NotFound(job.job_id.to_string()))?;
            JobMetrics::deduplicated(&self.queue_name);
            debug!(status = %job.status, "Job already known");

            if job.is_terminal() {
                return Ok(EnqueueOutcome {
                    job: job.summary(),
                    created,
                });
            }
        }

        let queued = self.queue.enqueue(ThumbnailPayload::from_job(&job)).await?;
        if created {
            JobMetrics::enqueued(
                &self.queue_name,
                job.media_kind().map_or("unknown", |k| k.as_str()),
            );
            info!(media_kind = %job.media_kind, queued, "Job enqueued");
        }

        Ok(EnqueueOutcome {
            job: job.summary(),
            created,
        })
    }

    /// An owner's jobs, newest first.
    pub async fn list_jobs(&self, owner: &OwnerId) -> JobResult<Vec<JobSummary>> {
        if owner.is_blank() {
            return Err(JobError::Validation("ownerId must not be empty".to_string()));
        }
        let jobs = self.store.list_by_owner(owner).await?;
        Ok(jobs.iter().map(ThumbnailJob::summary).collect())
    }

    /// One job, if it belongs to `owner`.
    pub async fn get_job(&self, owner: &OwnerId, job_id: &JobId) -> JobResult<JobSummary> {
        match self.store.get(job_id).await? {
            Some(job) if &job.owner_id == owner => Ok(job.summary()),
            _ => Err(JobError::NotFound(job_id.to_string())),
        }
    }

    /// Checks that the work queue backend answers.
    pub async fn health_check(&self) -> JobResult<()> {
        self.queue.health_check().await
    }
}

fn validate(request: &EnqueueRequest) -> JobResult<()> {
    if request.job_id.is_blank() {
        return Err(JobError::Validation("jobId must not be empty".to_string()));
    }
    if request.owner_id.is_blank() {
        return Err(JobError::Validation("ownerId must not be empty".to_string()));
    }
    if request.input_ref.trim().is_empty() {
        return Err(JobError::Validation("inputRef must not be empty".to_string()));
    }
    owner_relative(&request.owner_id, &request.input_ref)
        .map_err(|reason| JobError::Validation(format!("inputRef {reason}")))?;
    Ok(())
}
