//! Job status change events.

use serde::{Deserialize, Serialize};

use super::{JobStatus, ThumbnailJob};
use crate::{JobId, OwnerId};

/// Event name clients listen on for job updates.
pub const JOB_UPDATE_EVENT: &str = "thumbnail:job:update";

/// A job status change, published once per transition.
///
/// Transient: events are delivered to whoever is subscribed at publish time
/// and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobEvent {
    /// Captures the current state of a job.
    #[must_use]
    pub fn from_job(job: &ThumbnailJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            owner_id: job.owner_id.clone(),
            status: job.status,
            result_ref: job.result_ref.clone(),
            error_message: job.error_message.clone(),
        }
    }

    /// Room this event must be delivered to.
    #[must_use]
    pub fn room(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Client-facing projection; drops the owner id.
    #[must_use]
    pub fn to_update(&self) -> JobUpdate {
        JobUpdate {
            job_id: self.job_id.clone(),
            status: self.status,
            result_ref: self.result_ref.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// Payload of a `thumbnail:job:update` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub result_ref: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_from_job() {
        let mut job = ThumbnailJob::new(
            JobId::from("j1"),
            OwnerId::from("u1"),
            "/in",
            "image",
            "a.png",
        );
        job.mark_processing().unwrap();
        job.mark_completed("/uploads/thumbnails/u1/j1.webp").unwrap();

        let event = JobEvent::from_job(&job);
        assert_eq!(event.room().as_str(), "u1");
        assert_eq!(event.status, JobStatus::Completed);

        let update = serde_json::to_value(event.to_update()).unwrap();
        assert_eq!(update["jobId"], "j1");
        assert_eq!(update["status"], "completed");
        assert_eq!(update["resultRef"], "/uploads/thumbnails/u1/j1.webp");
        assert!(update.get("ownerId").is_none());
    }

    #[test]
    fn test_update_carries_null_fields() {
        let mut job = ThumbnailJob::new(
            JobId::from("j1"),
            OwnerId::from("u1"),
            "u1/a.png",
            "image",
            "a.png",
        );
        job.mark_processing().unwrap();

        let update = serde_json::to_value(JobEvent::from_job(&job).to_update()).unwrap();
        let fields = update.as_object().unwrap();
        assert!(fields.contains_key("resultRef"));
        assert!(fields.contains_key("errorMessage"));
        assert!(update["resultRef"].is_null());
        assert!(update["errorMessage"].is_null());
    }
}
