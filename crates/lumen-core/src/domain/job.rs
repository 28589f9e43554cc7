//! Thumbnail job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobStatus, MediaKind};
use crate::{JobId, LumenError, LumenResult, OwnerId};

/// A request to thumbnail one uploaded file, as persisted in the job store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailJob {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    /// Location of the uploaded source file.
    pub input_ref: String,
    /// Kind as supplied by ingress. Kept raw so an unsupported kind can still
    /// be recorded and failed.
    pub media_kind: String,
    pub filename: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThumbnailJob {
    /// Creates a new job in `pending`.
    #[must_use]
    pub fn new(
        job_id: JobId,
        owner_id: OwnerId,
        input_ref: impl Into<String>,
        media_kind: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            owner_id,
            input_ref: input_ref.into(),
            media_kind: media_kind.into(),
            filename: filename.into(),
            status: JobStatus::Pending,
            result_ref: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolves the media kind, or `None` if it is unsupported.
    #[must_use]
    pub fn media_kind(&self) -> Option<MediaKind> {
        MediaKind::parse(&self.media_kind)
    }

    /// Checks if the job reached `completed` or `failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Marks the job as handed to the work queue.
    pub fn mark_queued(&mut self) -> LumenResult<()> {
        self.transition(JobStatus::Queued)
    }

    /// Marks the job as being rendered.
    pub fn mark_processing(&mut self) -> LumenResult<()> {
        self.transition(JobStatus::Processing)
    }

    /// Marks the job as completed with its thumbnail reference.
    pub fn mark_completed(&mut self, result_ref: impl Into<String>) -> LumenResult<()> {
        self.transition(JobStatus::Completed)?;
        self.result_ref = Some(result_ref.into());
        self.error_message = None;
        Ok(())
    }

    /// Marks the job as failed with a human-readable reason.
    pub fn mark_failed(&mut self, message: impl Into<String>) -> LumenResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        self.result_ref = None;
        Ok(())
    }

    /// Projects the record onto the listing row.
    #[must_use]
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.job_id.clone(),
            filename: self.filename.clone(),
            status: self.status,
            result_ref: self.result_ref.clone(),
            error_message: self.error_message.clone(),
            created_at: self.created_at,
        }
    }

    fn transition(&mut self, next: JobStatus) -> LumenResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(LumenError::InvalidTransition {
                job_id: self.job_id.to_string(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// One row of an owner's job listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub filename: String,
    pub status: JobStatus,
    #[serde(default)]
    pub result_ref: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ThumbnailJob {
        ThumbnailJob::new(
            JobId::from("j1"),
            OwnerId::from("u1"),
            "u1/cat.png",
            "image/png",
            "cat.png",
        )
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.media_kind(), Some(MediaKind::Image));
        assert!(job.result_ref.is_none());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_happy_path() {
        let mut job = job();
        job.mark_queued().unwrap();
        job.mark_processing().unwrap();
        job.mark_completed("/uploads/thumbnails/u1/j1.webp").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(
            job.result_ref.as_deref(),
            Some("/uploads/thumbnails/u1/j1.webp")
        );
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_failed_clears_result() {
        let mut job = job();
        job.mark_processing().unwrap();
        job.mark_failed("Input file is missing").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result_ref.is_none());
        assert_eq!(job.error_message.as_deref(), Some("Input file is missing"));
    }

    #[test]
    fn test_terminal_job_rejects_transition() {
        let mut job = job();
        job.mark_processing().unwrap();
        job.mark_completed("r").unwrap();
        let err = job.mark_processing().unwrap_err();
        assert!(matches!(err, LumenError::InvalidTransition { .. }));
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn test_unsupported_kind() {
        let job = ThumbnailJob::new(
            JobId::from("j2"),
            OwnerId::from("u1"),
            "u1/doc.pdf",
            "application/pdf",
            "doc.pdf",
        );
        assert!(job.media_kind().is_none());
    }

    #[test]
    fn test_camel_case_serialization() {
        let json = serde_json::to_value(job()).unwrap();
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["ownerId"], "u1");
        assert_eq!(json["status"], "pending");
        assert!(json.get("resultRef").is_none());
    }

    #[test]
    fn test_summary_keeps_null_fields() {
        let json = serde_json::to_value(job().summary()).unwrap();
        assert!(json.as_object().unwrap().contains_key("resultRef"));
        assert!(json["resultRef"].is_null());
        assert!(json["errorMessage"].is_null());
    }
}
