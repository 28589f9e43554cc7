//! Work queue payloads.

use crate::error::JobResult;
use chrono::{DateTime, Utc};
use lumen_core::{JobId, OwnerId, ThumbnailJob};
use serde::{Deserialize, Serialize};

/// What a worker needs to render one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailPayload {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub input_ref: String,
    pub media_kind: String,
    pub filename: String,
}

impl ThumbnailPayload {
    /// Builds the payload for a stored job.
    pub fn from_job(job: &ThumbnailJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            owner_id: job.owner_id.clone(),
            input_ref: job.input_ref.clone(),
            media_kind: job.media_kind.clone(),
            filename: job.filename.clone(),
        }
    }
}

/// A payload plus its queue bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedPayload {
    pub payload: ThumbnailPayload,
    /// Times the job was put back because its owner was busy.
    #[serde(default)]
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub ready_at: DateTime<Utc>,
}

impl QueuedPayload {
    /// Wraps a payload that is ready immediately.
    pub fn new(payload: ThumbnailPayload) -> Self {
        let now = Utc::now();
        Self {
            payload,
            attempt: 0,
            enqueued_at: now,
            ready_at: now,
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> JobResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> JobResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the job id.
    pub fn job_id(&self) -> &JobId {
        &self.payload.job_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_from_job() {
        let job = ThumbnailJob::new(
            JobId::from("j1"),
            OwnerId::from("u1"),
            "u1/a.mp4",
            "video/mp4",
            "a.mp4",
        );
        let payload = ThumbnailPayload::from_job(&job);
        assert_eq!(payload.job_id, job.job_id);
        assert_eq!(payload.media_kind, "video/mp4");
    }

    #[test]
    fn test_queued_payload_json() {
        let job = ThumbnailJob::new(JobId::from("j1"), OwnerId::from("u1"), "/in", "image", "a");
        let queued = QueuedPayload::new(ThumbnailPayload::from_job(&job));
        let json = queued.to_json().unwrap();
        assert!(json.contains("\"jobId\":\"j1\""));

        let parsed = QueuedPayload::from_json(&json).unwrap();
        assert_eq!(parsed.attempt, 0);
        assert_eq!(parsed.job_id().as_str(), "j1");
    }
}
