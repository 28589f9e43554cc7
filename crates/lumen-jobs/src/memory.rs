//! In-process backends.
//!
//! Used by single-process deployments without Redis and by tests. They keep
//! the same contracts as the Redis backends, including dedup, delayed
//! readiness, lock expiry and the forward-only job write guard.

use crate::error::{JobError, JobResult};
use crate::lock::CoordinationStore;
use crate::payload::{QueuedPayload, ThumbnailPayload};
use crate::queue::{Delivery, WorkQueue};
use crate::store::JobStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lumen_core::{JobId, OwnerId, ThumbnailJob};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Default)]
struct QueueState {
    /// Entry bodies keyed by job id; presence is the dedup marker.
    entries: HashMap<JobId, QueuedPayload>,
    /// Claim times of in-flight entries.
    in_flight: HashMap<JobId, DateTime<Utc>>,
    /// Insertion counter, to keep FIFO order among equal ready times.
    seq: HashMap<JobId, u64>,
    next_seq: u64,
}

/// Work queue held in process memory.
#[derive(Default)]
pub struct InMemoryWorkQueue {
    state: Mutex<QueueState>,
}

impl InMemoryWorkQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, payload: ThumbnailPayload) -> JobResult<bool> {
        let mut state = self.state.lock();
        if state.entries.contains_key(&payload.job_id) {
            return Ok(false);
        }
        let entry = QueuedPayload::new(payload);
        let id = entry.job_id().clone();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.seq.insert(id.clone(), seq);
        state.entries.insert(id, entry);
        Ok(true)
    }

    async fn dequeue(&self, consumer_id: &str) -> JobResult<Option<Delivery>> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let next = state
            .entries
            .values()
            .filter(|e| !state.in_flight.contains_key(e.job_id()) && e.ready_at <= now)
            .min_by_key(|e| (e.ready_at, state.seq.get(e.job_id()).copied().unwrap_or(u64::MAX)))
            .cloned();

        let Some(entry) = next else {
            return Ok(None);
        };

        state.in_flight.insert(entry.job_id().clone(), now);
        debug!(job_id = %entry.job_id(), consumer_id, "Dequeued job");
        Ok(Some(Delivery {
            entry,
            consumer_id: consumer_id.to_string(),
            claimed_at: now,
        }))
    }

    async fn ack(&self, job_id: &JobId) -> JobResult<()> {
        let mut state = self.state.lock();
        state.entries.remove(job_id);
        state.in_flight.remove(job_id);
        state.seq.remove(job_id);
        Ok(())
    }

    async fn requeue_with_delay(&self, delivery: &Delivery, delay: Duration) -> JobResult<u32> {
        let mut state = self.state.lock();
        let mut entry = delivery.entry.clone();
        entry.attempt = entry.attempt.saturating_add(1);
        entry.ready_at = Utc::now() + ChronoDuration::from_std(delay).unwrap_or_default();
        let attempt = entry.attempt;

        let id = entry.job_id().clone();
        state.in_flight.remove(&id);
        state.entries.insert(id, entry);
        Ok(attempt)
    }

    async fn recover_stale(&self, visibility_timeout: Duration) -> JobResult<u64> {
        let mut state = self.state.lock();
        let cutoff = Utc::now() - ChronoDuration::from_std(visibility_timeout).unwrap_or_default();
        let before = state.in_flight.len();
        state.in_flight.retain(|_, claimed| *claimed > cutoff);
        Ok((before - state.in_flight.len()) as u64)
    }

    async fn pending_count(&self) -> JobResult<u64> {
        let state = self.state.lock();
        Ok((state.entries.len() - state.in_flight.len()) as u64)
    }

    async fn in_flight_count(&self) -> JobResult<u64> {
        Ok(self.state.lock().in_flight.len() as u64)
    }
}

/// Coordination store held in process memory, with TTL expiry.
#[derive(Default)]
pub struct InMemoryCoordinationStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryCoordinationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> JobResult<bool> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if let Some((_, expires)) = entries.get(key) {
            if *expires > now {
                return Ok(false);
            }
        }
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> JobResult<bool> {
        let mut entries = self.entries.lock();
        let held = matches!(
            entries.get(key),
            Some((current, expires)) if current == value && *expires > Instant::now()
        );
        if held {
            entries.remove(key);
        }
        Ok(held)
    }
}

/// Job store held in process memory.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, ThumbnailJob>>,
}

impl InMemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_if_absent(&self, job: &ThumbnailJob) -> JobResult<bool> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&job.job_id) {
            return Ok(false);
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(true)
    }

    async fn get(&self, job_id: &JobId) -> JobResult<Option<ThumbnailJob>> {
        Ok(self.jobs.lock().get(job_id).cloned())
    }

    async fn save(&self, job: &ThumbnailJob) -> JobResult<()> {
        let mut jobs = self.jobs.lock();
        let current = jobs
            .get_mut(&job.job_id)
            .ok_or_else(|| JobError::NotFound(job.job_id.to_string()))?;

        if current.is_terminal() || job.status.rank() < current.status.rank() {
            return Err(JobError::InvalidTransition {
                job_id: job.job_id.to_string(),
                from: current.status.to_string(),
                to: job.status.to_string(),
            });
        }
        *current = job.clone();
        Ok(())
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> JobResult<Vec<ThumbnailJob>> {
        let mut jobs: Vec<ThumbnailJob> = self
            .jobs
            .lock()
            .values()
            .filter(|j| &j.owner_id == owner)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}
