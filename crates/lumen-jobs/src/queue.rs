//! Work queue abstraction.
//!
//! At-least-once, FIFO-with-delay delivery deduplicated on the job id. An
//! entry keeps its dedup marker from `enqueue` until `ack`, including while
//! it is in flight or parked after a contended attempt, so a job can be
//! queued at most once at any time.

use crate::error::JobResult;
use crate::payload::{QueuedPayload, ThumbnailPayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lumen_core::{JobId, OwnerId};
use std::time::Duration;

/// A claimed queue entry.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The entry as stored in the queue.
    pub entry: QueuedPayload,
    /// Consumer that claimed it.
    pub consumer_id: String,
    /// When it was claimed.
    pub claimed_at: DateTime<Utc>,
}

impl Delivery {
    /// Job id of the delivery.
    pub fn job_id(&self) -> &JobId {
        &self.entry.payload.job_id
    }

    /// Owner of the delivered job.
    pub fn owner_id(&self) -> &OwnerId {
        &self.entry.payload.owner_id
    }

    /// Payload of the delivery.
    pub fn payload(&self) -> &ThumbnailPayload {
        &self.entry.payload
    }

    /// Contended attempts before this delivery.
    pub fn attempt(&self) -> u32 {
        self.entry.attempt
    }
}

/// Queue of thumbnail jobs shared by every worker process.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Inserts a job for delivery. Returns `false` without changing anything
    /// if an entry with the same job id is queued or in flight.
    async fn enqueue(&self, payload: ThumbnailPayload) -> JobResult<bool>;

    /// Claims the oldest ready entry.
    async fn dequeue(&self, consumer_id: &str) -> JobResult<Option<Delivery>>;

    /// Removes a delivered entry and its dedup marker.
    async fn ack(&self, job_id: &JobId) -> JobResult<()>;

    /// Parks a delivered entry until `delay` has passed. Returns the new
    /// contended attempt count.
    async fn requeue_with_delay(&self, delivery: &Delivery, delay: Duration) -> JobResult<u32>;

    /// Makes in-flight entries older than `visibility_timeout` ready again.
    /// Returns how many were recovered.
    async fn recover_stale(&self, visibility_timeout: Duration) -> JobResult<u64>;

    /// Entries waiting (ready or delayed).
    async fn pending_count(&self) -> JobResult<u64>;

    /// Entries claimed but not yet acknowledged.
    async fn in_flight_count(&self) -> JobResult<u64>;

    /// Check backend connectivity.
    async fn health_check(&self) -> JobResult<()> {
        Ok(())
    }
}
