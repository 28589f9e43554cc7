use super::Gateway;
use async_trait::async_trait;
use lumen_core::JobEvent;
use lumen_jobs::{EventHandler, JobResult};
use std::sync::Arc;

/// Forwards bus events into the gateway's owner rooms.
pub struct RelayHandler {
    gateway: Arc<Gateway>,
}

impl RelayHandler {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn handle(&self, event: &JobEvent) -> JobResult<()> {
        self.gateway.relay(event).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "gateway_relay"
    }
}
