//! Prometheus metrics for thumbnail jobs, owner locks and event fan-out.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Jobs accepted by `enqueue`.
    pub const JOBS_ENQUEUED_TOTAL: &str = "lumen_jobs_enqueued_total";
    /// `enqueue` calls that matched an existing job.
    pub const JOBS_DEDUPLICATED_TOTAL: &str = "lumen_jobs_deduplicated_total";
    /// Jobs that produced a thumbnail.
    pub const JOBS_COMPLETED_TOTAL: &str = "lumen_jobs_completed_total";
    /// Jobs that ended in `failed`.
    pub const JOBS_FAILED_TOTAL: &str = "lumen_jobs_failed_total";
    /// Deliveries put back because the owner lock was held.
    pub const JOBS_CONTENDED_TOTAL: &str = "lumen_jobs_contended_total";
    /// Deliveries skipped because the job was gone or already terminal.
    pub const JOBS_SKIPPED_TOTAL: &str = "lumen_jobs_skipped_total";
    /// In-flight entries returned to the queue after their visibility timeout.
    pub const JOBS_RECOVERED_TOTAL: &str = "lumen_jobs_recovered_total";

    /// Pending queue entries.
    pub const QUEUE_PENDING: &str = "lumen_queue_pending";
    /// In-flight queue entries.
    pub const QUEUE_IN_FLIGHT: &str = "lumen_queue_in_flight";

    /// Render duration in seconds.
    pub const RENDER_DURATION_SECONDS: &str = "lumen_render_duration_seconds";

    /// Owner lock acquisition attempts.
    pub const LOCK_ACQUIRE_TOTAL: &str = "lumen_lock_acquire_total";
    /// Owner lock releases.
    pub const LOCK_RELEASE_TOTAL: &str = "lumen_lock_release_total";

    /// Events published on the bus.
    pub const EVENTS_PUBLISHED_TOTAL: &str = "lumen_events_published_total";
    /// Events delivered to realtime sessions.
    pub const EVENTS_RELAYED_TOTAL: &str = "lumen_events_relayed_total";
    /// Open realtime sessions.
    pub const REALTIME_SESSIONS: &str = "lumen_realtime_sessions";

    /// Busy worker slots.
    pub const WORKERS_ACTIVE: &str = "lumen_workers_active";
    /// Worker pool concurrency.
    pub const WORKERS_CONCURRENCY: &str = "lumen_workers_concurrency";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(
        names::JOBS_DEDUPLICATED_TOTAL,
        "Total number of enqueue calls that matched an existing job"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(names::JOBS_FAILED_TOTAL, "Total number of jobs that failed");
    describe_counter!(
        names::JOBS_CONTENDED_TOTAL,
        "Total number of deliveries delayed by a busy owner lock"
    );
    describe_counter!(
        names::JOBS_SKIPPED_TOTAL,
        "Total number of deliveries for missing or finished jobs"
    );
    describe_counter!(
        names::JOBS_RECOVERED_TOTAL,
        "Total number of stale in-flight entries made ready again"
    );

    describe_gauge!(names::QUEUE_PENDING, "Current number of pending queue entries");
    describe_gauge!(names::QUEUE_IN_FLIGHT, "Current number of in-flight queue entries");

    describe_histogram!(
        names::RENDER_DURATION_SECONDS,
        "Thumbnail render duration in seconds"
    );

    describe_counter!(names::LOCK_ACQUIRE_TOTAL, "Owner lock acquisition attempts");
    describe_counter!(names::LOCK_RELEASE_TOTAL, "Owner lock releases");

    describe_counter!(names::EVENTS_PUBLISHED_TOTAL, "Job events published");
    describe_counter!(
        names::EVENTS_RELAYED_TOTAL,
        "Job events delivered to realtime sessions"
    );
    describe_gauge!(names::REALTIME_SESSIONS, "Open realtime sessions");

    describe_gauge!(names::WORKERS_ACTIVE, "Number of busy worker slots");
    describe_gauge!(names::WORKERS_CONCURRENCY, "Worker pool concurrency setting");
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job enqueued.
    pub fn enqueued(queue: &str, media_kind: &str) {
        counter!(
            names::JOBS_ENQUEUED_TOTAL,
            "queue" => queue.to_string(),
            "media_kind" => media_kind.to_string()
        )
        .increment(1);
    }

    /// Record an enqueue that hit an existing job.
    pub fn deduplicated(queue: &str) {
        counter!(names::JOBS_DEDUPLICATED_TOTAL, "queue" => queue.to_string()).increment(1);
    }

    /// Record a completed job.
    pub fn completed(media_kind: &str, duration: Duration) {
        counter!(
            names::JOBS_COMPLETED_TOTAL,
            "media_kind" => media_kind.to_string()
        )
        .increment(1);

        histogram!(
            names::RENDER_DURATION_SECONDS,
            "media_kind" => media_kind.to_string(),
            "status" => "completed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a failed job.
    pub fn failed(media_kind: &str, error_type: &str) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "media_kind" => media_kind.to_string(),
            "error_type" => error_type.to_string()
        )
        .increment(1);
    }

    /// Record a contended delivery.
    pub fn contended(attempt: u32) {
        let bucket = match attempt {
            0..=1 => "1",
            2..=9 => "2-9",
            _ => "10+",
        };
        counter!(names::JOBS_CONTENDED_TOTAL, "attempt" => bucket).increment(1);
    }

    /// Record a skipped delivery.
    pub fn skipped(reason: &'static str) {
        counter!(names::JOBS_SKIPPED_TOTAL, "reason" => reason).increment(1);
    }

    /// Record recovered in-flight entries.
    pub fn recovered(queue: &str, count: u64) {
        counter!(names::JOBS_RECOVERED_TOTAL, "queue" => queue.to_string()).increment(count);
    }

    /// Update queue size gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn update_queue_sizes(queue: &str, pending: u64, in_flight: u64) {
        gauge!(names::QUEUE_PENDING, "queue" => queue.to_string()).set(pending as f64);
        gauge!(names::QUEUE_IN_FLIGHT, "queue" => queue.to_string()).set(in_flight as f64);
    }
}

/// Owner lock metrics recorder.
#[derive(Clone)]
pub struct LockMetrics;

impl LockMetrics {
    /// Record an acquisition attempt.
    pub fn acquire(acquired: bool) {
        let result = if acquired { "acquired" } else { "busy" };
        counter!(names::LOCK_ACQUIRE_TOTAL, "result" => result).increment(1);
    }

    /// Record a release.
    pub fn release(released: bool) {
        let result = if released { "released" } else { "lost" };
        counter!(names::LOCK_RELEASE_TOTAL, "result" => result).increment(1);
    }
}

/// Event fan-out metrics recorder.
#[derive(Clone)]
pub struct EventMetrics;

impl EventMetrics {
    /// Record a published event.
    pub fn published(bus: &'static str) {
        counter!(names::EVENTS_PUBLISHED_TOTAL, "bus" => bus).increment(1);
    }

    /// Record deliveries to realtime sessions.
    pub fn relayed(sessions: usize) {
        counter!(names::EVENTS_RELAYED_TOTAL).increment(sessions as u64);
    }

    /// Update the open session gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn sessions(open: usize) {
        gauge!(names::REALTIME_SESSIONS).set(open as f64);
    }
}

/// Worker metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Update worker gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn update_workers(pool_id: &str, active: u64, concurrency: usize) {
        gauge!(names::WORKERS_ACTIVE, "pool_id" => pool_id.to_string()).set(active as f64);
        gauge!(names::WORKERS_CONCURRENCY, "pool_id" => pool_id.to_string())
            .set(concurrency as f64);
    }
}
