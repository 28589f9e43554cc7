//! Worker pool for processing thumbnail jobs.

use crate::error::{JobError, JobResult};
use crate::metrics::{JobMetrics, WorkerMetrics};
use crate::processor::{JobProcessor, Outcome};
use crate::queue::WorkQueue;
use lumen_config::JobsConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers in this process.
    pub concurrency: usize,

    /// Queue name, for logs and metrics.
    pub queue_name: String,

    /// Idle wait between empty polls.
    pub poll_interval: Duration,

    /// How long a claimed entry may stay unacknowledged.
    pub visibility_timeout: Duration,

    /// How often stale in-flight entries are swept.
    pub recovery_interval: Duration,

    /// Shutdown timeout.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for WorkerPoolConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            queue_name: config.queue_name.clone(),
            poll_interval: config.poll_interval(),
            visibility_timeout: config.visibility_timeout(),
            recovery_interval: config.recovery_interval(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

#[derive(Default)]
struct Counters {
    active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    contended: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

/// Pool of workers pulling from one work queue.
///
/// Workers of the same process and of other processes share the queue; the
/// owner lock inside [`JobProcessor`] keeps same-owner jobs from overlapping.
pub struct WorkerPool {
    /// Unique pool ID.
    id: String,

    queue: Arc<dyn WorkQueue>,

    processor: JobProcessor,

    config: WorkerPoolConfig,

    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,

    /// Running flag.
    running: Arc<AtomicBool>,

    /// Set by `stop`; covers a stop that lands before `start` subscribes.
    stop_requested: Arc<AtomicBool>,

    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(queue: Arc<dyn WorkQueue>, processor: JobProcessor, config: WorkerPoolConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            id: format!("worker-pool-{}", Uuid::new_v4()),
            queue,
            processor,
            config,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Runs the pool until [`stop`](Self::stop) is called.
    pub async fn start(&self) -> JobResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Worker("Worker pool already running".to_string()));
        }

        let concurrency = self.config.concurrency.max(1);
        info!(
            pool_id = %self.id,
            concurrency,
            queue = %self.config.queue_name,
            "Starting worker pool"
        );
        WorkerMetrics::update_workers(&self.id, 0, concurrency);

        // Every receiver exists before the flag is read, so a stop either
        // shows up in the flag or reaches all of them.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let worker_rxs: Vec<_> = (0..concurrency).map(|_| self.shutdown_tx.subscribe()).collect();
        let recovery_rx = self.shutdown_tx.subscribe();

        if self.stop_requested.swap(false, Ordering::SeqCst) {
            info!(pool_id = %self.id, "Stop requested before start");
            self.running.store(false, Ordering::SeqCst);
            return Ok(());
        }

        let mut workers = JoinSet::new();

        for (slot, rx) in worker_rxs.into_iter().enumerate() {
            let worker = Worker {
                consumer_id: format!("{}-{slot}", self.id),
                pool_id: self.id.clone(),
                concurrency,
                queue: self.queue.clone(),
                processor: self.processor.clone(),
                poll_interval: self.config.poll_interval,
                counters: self.counters.clone(),
            };
            workers.spawn(worker.run(rx).instrument(tracing::info_span!("worker", slot)));
        }

        workers.spawn(
            recovery_loop(
                self.queue.clone(),
                self.config.clone(),
                recovery_rx,
            )
            .instrument(tracing::info_span!("queue_recovery")),
        );

        let _ = shutdown_rx.recv().await;
        info!(pool_id = %self.id, "Waiting for workers to finish...");

        let drained = timeout(self.config.shutdown_timeout, async {
            while workers.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(pool_id = %self.id, "Shutdown timeout elapsed, aborting remaining workers");
            workers.abort_all();
        }

        self.running.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
        WorkerMetrics::update_workers(&self.id, 0, concurrency);

        let stats = self.stats();
        info!(
            pool_id = %self.id,
            completed = stats.jobs_completed,
            failed = stats.jobs_failed,
            contended = stats.jobs_contended,
            "Worker pool stopped"
        );

        Ok(())
    }

    /// Stop the worker pool. In-flight jobs run to completion.
    pub fn stop(&self) {
        info!(pool_id = %self.id, "Stopping worker pool...");
        self.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the pool ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        let c = &self.counters;
        WorkerPoolStats {
            id: self.id.clone(),
            running: self.is_running(),
            concurrency: self.config.concurrency,
            active: c.active.load(Ordering::Relaxed),
            jobs_completed: c.completed.load(Ordering::Relaxed),
            jobs_failed: c.failed.load(Ordering::Relaxed),
            jobs_contended: c.contended.load(Ordering::Relaxed),
            jobs_skipped: c.skipped.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
        }
    }
}

struct Worker {
    consumer_id: String,
    pool_id: String,
    concurrency: usize,
    queue: Arc<dyn WorkQueue>,
    processor: JobProcessor,
    poll_interval: Duration,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }

            match self.queue.dequeue(&self.consumer_id).await {
                Ok(Some(delivery)) => {
                    let active = self.counters.active.fetch_add(1, Ordering::Relaxed) + 1;
                    WorkerMetrics::update_workers(&self.pool_id, active, self.concurrency);

                    debug!(job_id = %delivery.job_id(), attempt = delivery.attempt(), "Processing job");
                    let result = self.processor.process(&delivery).await;
                    self.record(&delivery.job_id().to_string(), result);

                    let active = self.counters.active.fetch_sub(1, Ordering::Relaxed) - 1;
                    WorkerMetrics::update_workers(&self.pool_id, active, self.concurrency);
                }
                Ok(None) => {
                    if self.idle(&mut shutdown_rx).await {
                        break;
                    }
                }
                Err(e) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "Failed to dequeue job");
                    if self.idle(&mut shutdown_rx).await {
                        break;
                    }
                }
            }
        }
        debug!(consumer_id = %self.consumer_id, "Worker exited");
    }

    fn record(&self, job_id: &str, result: JobResult<Outcome>) {
        let counter = match result {
            Ok(Outcome::Completed) => &self.counters.completed,
            Ok(Outcome::Failed | Outcome::Escalated) => &self.counters.failed,
            Ok(Outcome::Contended { .. }) => &self.counters.contended,
            Ok(Outcome::Skipped) => &self.counters.skipped,
            Err(e) => {
                // Left unacknowledged; recovery makes it visible again.
                error!(job_id = %job_id, error = %e, "Job processing aborted");
                &self.counters.errors
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Waits one poll interval. Returns true if shutdown was requested.
    async fn idle(&self, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = shutdown_rx.recv() => true,
            () = tokio::time::sleep(self.poll_interval) => false,
        }
    }
}

async fn recovery_loop(
    queue: Arc<dyn WorkQueue>,
    config: WorkerPoolConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(config.recovery_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if let Err(e) = queue.recover_stale(config.visibility_timeout).await {
                    warn!(error = %e, "Stale job recovery failed");
                }
                match (queue.pending_count().await, queue.in_flight_count().await) {
                    (Ok(pending), Ok(in_flight)) => {
                        JobMetrics::update_queue_sizes(&config.queue_name, pending, in_flight);
                    }
                    (Err(e), _) | (_, Err(e)) => debug!(error = %e, "Queue size check failed"),
                }
            }
        }
    }
}

/// Worker pool statistics.
#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    /// Pool ID.
    pub id: String,

    /// Is running.
    pub running: bool,

    /// Configured concurrency.
    pub concurrency: usize,

    /// Workers currently processing a job.
    pub active: u64,

    pub jobs_completed: u64,

    /// Includes contention escalations.
    pub jobs_failed: u64,

    pub jobs_contended: u64,

    pub jobs_skipped: u64,

    /// Infrastructure errors while dequeuing or processing.
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_before_start_returns() {
        use crate::lock::DistributedLock;
        use crate::memory::{InMemoryCoordinationStore, InMemoryJobStore, InMemoryWorkQueue};
        use crate::redis::RedisKeys;
        use crate::{InProcessEventBus, ProcessorConfig, RendererRegistry};

        let queue = Arc::new(InMemoryWorkQueue::new());
        let processor = JobProcessor::new(
            queue.clone(),
            DistributedLock::new(Arc::new(InMemoryCoordinationStore::new()), RedisKeys::default()),
            Arc::new(InMemoryJobStore::new()),
            RendererRegistry::new(),
            Arc::new(InProcessEventBus::default()),
            ProcessorConfig::default(),
        );
        let pool = WorkerPool::new(queue, processor, WorkerPoolConfig::default());

        pool.stop();
        timeout(Duration::from_secs(1), pool.start())
            .await
            .expect("start returns after an early stop")
            .unwrap();
        assert!(!pool.is_running());
    }

    #[test]
    fn test_worker_pool_config_from_jobs_config() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.queue_name, "thumbnail-jobs");
        assert_eq!(config.visibility_timeout, Duration::from_secs(120));
    }
}
