//! Job event bus.
//!
//! Fire-and-forget fan-out of [`JobEvent`]s from workers to whoever is
//! listening, typically the realtime gateway. Events published while nobody
//! is subscribed are lost; clients that reconnect re-read the job listing.

use crate::error::JobResult;
use crate::metrics::EventMetrics;
use async_trait::async_trait;
use lumen_core::JobEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives published job events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event. Errors are logged by the bus and go no further.
    async fn handle(&self, event: &JobEvent) -> JobResult<()>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        "handler"
    }
}

/// A live subscription. Dropping it or calling
/// [`unsubscribe`](Self::unsubscribe) stops delivery to the handler.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Stops delivery.
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    /// Returns true while the subscription is still delivering.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Publish/subscribe channel for job events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to every current subscriber.
    async fn publish(&self, event: &JobEvent) -> JobResult<()>;

    /// Register a handler for every event published from now on.
    async fn subscribe(&self, handler: Arc<dyn EventHandler>) -> JobResult<Subscription>;
}

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Event bus local to one process, backed by a broadcast channel.
pub struct InProcessEventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl InProcessEventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, slow subscribers skip the oldest events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl EventBus for InProcessEventBus {
    async fn publish(&self, event: &JobEvent) -> JobResult<()> {
        // SendError only means there are zero receivers.
        let delivered = self.sender.send(event.clone()).unwrap_or(0);
        EventMetrics::published("in_process");
        debug!(
            job_id = %event.job_id,
            status = %event.status,
            subscribers = delivered,
            "Published job event"
        );
        Ok(())
    }

    async fn subscribe(&self, handler: Arc<dyn EventHandler>) -> JobResult<Subscription> {
        let receiver = self.sender.subscribe();
        info!(handler = handler.name(), "Subscribed to in-process event bus");
        Ok(Subscription::new(tokio::spawn(dispatch_loop(
            receiver, handler,
        ))))
    }
}

async fn dispatch_loop(mut receiver: broadcast::Receiver<JobEvent>, handler: Arc<dyn EventHandler>) {
    loop {
        match receiver.recv().await {
            Ok(event) => dispatch(handler.as_ref(), &event).await,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(handler = handler.name(), skipped = n, "Event subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!(handler = handler.name(), "Event bus closed");
                break;
            }
        }
    }
}

/// Hands one event to a handler, logging its failure.
pub(crate) async fn dispatch(handler: &dyn EventHandler, event: &JobEvent) {
    if let Err(e) = handler.handle(event).await {
        warn!(
            handler = handler.name(),
            job_id = %event.job_id,
            error = %e,
            "Event handler failed"
        );
    }
}
