//! Job record persistence.

use crate::error::JobResult;
use async_trait::async_trait;
use lumen_core::{JobId, OwnerId, ThumbnailJob};

/// Durable store of job records.
///
/// Implementations refuse to overwrite a terminal record or move a record
/// backwards in the status order; such writes fail with
/// [`JobError::InvalidTransition`](crate::JobError::InvalidTransition).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores a new record. Returns `false` if one with the same id exists.
    async fn insert_if_absent(&self, job: &ThumbnailJob) -> JobResult<bool>;

    /// Loads a record.
    async fn get(&self, job_id: &JobId) -> JobResult<Option<ThumbnailJob>>;

    /// Overwrites a record after a validated transition.
    async fn save(&self, job: &ThumbnailJob) -> JobResult<()>;

    /// All records of an owner, newest first.
    async fn list_by_owner(&self, owner: &OwnerId) -> JobResult<Vec<ThumbnailJob>>;
}
