//! Per-delivery job state machine.
//!
//! ```text
//! delivery ─► load ─┬─ missing/terminal ─► ack, Skipped
//!                   └─ acquire owner lock ─┬─ busy ─► requeue with delay, Contended
//!                                          │          (or fail, Escalated)
//!                                          └─ held ─► processing ─► render ─┬─► completed
//!                                                                           └─► failed
//!                                             release lock on every path
//! ```

use crate::error::{JobError, JobResult};
use crate::events::EventBus;
use crate::lock::DistributedLock;
use crate::metrics::JobMetrics;
use crate::queue::{Delivery, WorkQueue};
use crate::renderer::{RenderOutput, RenderRequest, RendererRegistry};
use crate::retry::ContentionPolicy;
use crate::store::JobStore;
use lumen_config::JobsConfig;
use lumen_core::{JobEvent, ThumbnailJob};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How a delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Thumbnail produced.
    Completed,
    /// The job hit a job fault and is now `failed`.
    Failed,
    /// The owner was busy; the delivery comes back after `delay`.
    Contended { attempt: u32, delay: Duration },
    /// The job was gone or already finished.
    Skipped,
    /// The owner stayed busy for too many attempts; the job is now `failed`.
    Escalated,
}

/// Processor timing settings.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Owner lock lifetime. Must exceed `render_timeout`.
    pub lock_ttl: Duration,
    /// Upper bound on one render.
    pub render_timeout: Duration,
    /// Backoff for busy owners.
    pub contention: ContentionPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for ProcessorConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            lock_ttl: config.lock_ttl(),
            render_timeout: config.render_timeout(),
            contention: ContentionPolicy::from(config),
        }
    }
}

/// Runs the job state machine for single deliveries.
#[derive(Clone)]
pub struct JobProcessor {
    queue: Arc<dyn WorkQueue>,
    lock: DistributedLock,
    store: Arc<dyn JobStore>,
    renderers: RendererRegistry,
    bus: Arc<dyn EventBus>,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        lock: DistributedLock,
        store: Arc<dyn JobStore>,
        renderers: RendererRegistry,
        bus: Arc<dyn EventBus>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            queue,
            lock,
            store,
            renderers,
            bus,
            config,
        }
    }

    /// Handles one delivery.
    ///
    /// Job faults end in `Ok(Outcome::Failed)`. An `Err` is an
    /// infrastructure fault; the delivery is left unacknowledged so the
    /// queue hands it out again.
    pub async fn process(&self, delivery: &Delivery) -> JobResult<Outcome> {
        let Some(job) = self.load_open(delivery).await? else {
            return Ok(Outcome::Skipped);
        };

        let Some(lock) = self
            .lock
            .acquire(&job.owner_id, self.config.lock_ttl)
            .await?
        else {
            return self.contended(delivery, job).await;
        };

        let result = self.process_locked(delivery).await;

        if let Err(e) = self.lock.release(&lock).await {
            warn!(owner_id = %job.owner_id, error = %e, "Failed to release owner lock; it will lapse on TTL");
        }
        result
    }

    /// Loads the job, acking the delivery if there is nothing left to do.
    async fn load_open(&self, delivery: &Delivery) -> JobResult<Option<ThumbnailJob>> {
        match self.store.get(delivery.job_id()).await? {
            None => {
                warn!(job_id = %delivery.job_id(), "Delivery for unknown job");
                self.queue.ack(delivery.job_id()).await?;
                JobMetrics::skipped("missing");
                Ok(None)
            }
            Some(job) if job.is_terminal() => {
                debug!(job_id = %job.job_id, status = %job.status, "Job already finished");
                self.queue.ack(delivery.job_id()).await?;
                JobMetrics::skipped("terminal");
                Ok(None)
            }
            Some(job) => Ok(Some(job)),
        }
    }

    async fn process_locked(&self, delivery: &Delivery) -> JobResult<Outcome> {
        // Another worker may have finished the job between load and lock.
        let Some(mut job) = self.load_open(delivery).await? else {
            return Ok(Outcome::Skipped);
        };

        job.mark_processing()?;
        if !self.save_or_skip(delivery, &job).await? {
            return Ok(Outcome::Skipped);
        }
        self.publish(&job).await;

        let started = Instant::now();
        match self.render(&job).await {
            Ok(output) => {
                job.mark_completed(output.result_ref)?;
                if !self.finish(delivery, &job).await? {
                    return Ok(Outcome::Skipped);
                }
                JobMetrics::completed(kind_label(&job), started.elapsed());
                info!(job_id = %job.job_id, owner_id = %job.owner_id, "Job completed");
                Ok(Outcome::Completed)
            }
            Err(e) if e.is_infrastructure() => Err(e),
            Err(e) => {
                job.mark_failed(e.to_string())?;
                if !self.finish(delivery, &job).await? {
                    return Ok(Outcome::Skipped);
                }
                JobMetrics::failed(kind_label(&job), e.kind());
                warn!(job_id = %job.job_id, owner_id = %job.owner_id, error = %e, "Job failed");
                Ok(Outcome::Failed)
            }
        }
    }

    async fn render(&self, job: &ThumbnailJob) -> JobResult<RenderOutput> {
        let renderer = self.renderers.resolve(&job.media_kind)?;
        let request = RenderRequest {
            job_id: job.job_id.clone(),
            owner_id: job.owner_id.clone(),
            input_ref: job.input_ref.clone(),
        };

        tokio::time::timeout(self.config.render_timeout, renderer.render(&request))
            .await
            .map_err(|_| JobError::Timeout(self.config.render_timeout.as_secs()))?
    }

    async fn contended(&self, delivery: &Delivery, mut job: ThumbnailJob) -> JobResult<Outcome> {
        let attempt = delivery.attempt().saturating_add(1);

        if self.config.contention.should_escalate(attempt) {
            let err = JobError::Contention { attempts: attempt };
            job.mark_failed(err.to_string())?;
            if !self.finish(delivery, &job).await? {
                return Ok(Outcome::Skipped);
            }
            JobMetrics::failed(kind_label(&job), err.kind());
            error!(job_id = %job.job_id, owner_id = %job.owner_id, attempts = attempt, "Owner lock contention exhausted");
            return Ok(Outcome::Escalated);
        }

        let delay = self.config.contention.delay_for_attempt(attempt);
        let attempt = self.queue.requeue_with_delay(delivery, delay).await?;
        JobMetrics::contended(attempt);
        debug!(
            job_id = %job.job_id,
            owner_id = %job.owner_id,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Owner busy, requeued"
        );
        Ok(Outcome::Contended { attempt, delay })
    }

    /// Saves a terminal state, acks, then notifies.
    async fn finish(&self, delivery: &Delivery, job: &ThumbnailJob) -> JobResult<bool> {
        let saved = self.save_or_skip(delivery, job).await?;
        if saved {
            self.publish(job).await;
        }
        Ok(saved)
    }

    /// Saves `job`. A refused write means someone else already moved the job
    /// further; the delivery is acked and `false` returned.
    async fn save_or_skip(&self, delivery: &Delivery, job: &ThumbnailJob) -> JobResult<bool> {
        match self.store.save(job).await {
            Ok(()) => {
                if job.is_terminal() {
                    self.queue.ack(delivery.job_id()).await?;
                }
                Ok(true)
            }
            Err(JobError::InvalidTransition { from, to, .. }) => {
                warn!(job_id = %job.job_id, from = %from, to = %to, "Job moved on elsewhere, dropping delivery");
                self.queue.ack(delivery.job_id()).await?;
                JobMetrics::skipped("superseded");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn publish(&self, job: &ThumbnailJob) {
        if let Err(e) = self.bus.publish(&JobEvent::from_job(job)).await {
            warn!(job_id = %job.job_id, status = %job.status, error = %e, "Failed to publish job event");
        }
    }
}

fn kind_label(job: &ThumbnailJob) -> &'static str {
    job.media_kind().map_or("unknown", |k| k.as_str())
}
