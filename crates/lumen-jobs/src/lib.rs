//! Lumen Jobs - thumbnail job coordination.
//!
//! Turns uploaded files into thumbnails with:
//! - A shared work queue, deduplicated on job id, with delayed requeue and
//!   at-least-once delivery
//! - A per-owner distributed lock so one owner's jobs never render at once
//! - A job processor that drives each job through
//!   `queued -> processing -> completed | failed` and always releases its lock
//! - An event bus that fans status changes out to realtime gateways
//!
//! # Architecture
//!
//! ```text
//!  JobService::enqueue ──► JobStore (queued)
//!          │
//!          ▼
//!     WorkQueue ──► WorkerPool ──► JobProcessor ──► MediaRenderer
//!                                   │    │
//!                     DistributedLock    └──► EventBus ──► gateway rooms
//! ```
//!
//! Every backend has a Redis implementation for multi-process deployments
//! and an in-memory one for single-process runs and tests.

pub mod error;
pub mod events;
pub mod lock;
pub mod memory;
pub mod metrics;
pub mod payload;
pub mod processor;
pub mod queue;
pub mod redis;
pub mod renderer;
pub mod retry;
pub mod service;
pub mod store;
pub mod uploads;
pub mod worker;

pub use error::{JobError, JobResult};
pub use events::{EventBus, EventHandler, InProcessEventBus, Subscription};
pub use lock::{CoordinationStore, DistributedLock, LockToken};
pub use memory::{InMemoryCoordinationStore, InMemoryJobStore, InMemoryWorkQueue};
pub use metrics::{register_metrics, EventMetrics, JobMetrics, LockMetrics, WorkerMetrics};
pub use payload::{QueuedPayload, ThumbnailPayload};
pub use processor::{JobProcessor, Outcome, ProcessorConfig};
pub use queue::{Delivery, WorkQueue};
pub use renderer::{
    FfmpegTools, ImageRenderer, MediaRenderer, RenderOutput, RenderRequest, RendererRegistry,
    ThumbnailTarget, VideoRenderer,
};
pub use retry::ContentionPolicy;
pub use service::{EnqueueOutcome, EnqueueRequest, JobService};
pub use store::JobStore;
pub use uploads::UploadRoot;
pub use worker::{WorkerPool, WorkerPoolConfig, WorkerPoolStats};

/// Re-export commonly used traits
pub mod prelude {
    pub use crate::events::{EventBus, EventHandler};
    pub use crate::lock::CoordinationStore;
    pub use crate::queue::WorkQueue;
    pub use crate::renderer::MediaRenderer;
    pub use crate::store::JobStore;
    pub use crate::{JobError, JobResult};
}
