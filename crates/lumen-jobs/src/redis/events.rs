//! Redis pub/sub event bus, for gateways running apart from workers.

use super::RedisKeys;
use crate::error::JobResult;
use crate::events::{dispatch, EventBus, EventHandler, Subscription};
use crate::metrics::EventMetrics;
use async_trait::async_trait;
use deadpool_redis::Pool;
use futures::StreamExt;
use lumen_core::JobEvent;
use redis::aio::PubSub;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Event bus over a Redis channel.
pub struct RedisEventBus {
    pool: Pool,
    client: redis::Client,
    channel: String,
}

impl RedisEventBus {
    /// Create a bus publishing through `pool` and subscribing through `client`.
    pub fn new(pool: Pool, client: redis::Client, keys: &RedisKeys) -> Self {
        Self {
            pool,
            client,
            channel: keys.events(),
        }
    }

    async fn open(client: &redis::Client, channel: &str) -> JobResult<PubSub> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, event: &JobEvent) -> JobResult<()> {
        let json = serde_json::to_string(event)?;
        let mut conn = self.pool.get().await?;
        let receivers: i64 = conn.publish(&self.channel, json).await?;
        EventMetrics::published("redis");
        debug!(job_id = %event.job_id, status = %event.status, receivers, "Published job event");
        Ok(())
    }

    async fn subscribe(&self, handler: Arc<dyn EventHandler>) -> JobResult<Subscription> {
        let first = Self::open(&self.client, &self.channel).await?;
        let client = self.client.clone();
        let channel = self.channel.clone();
        info!(handler = handler.name(), channel = %channel, "Subscribed to Redis event channel");

        let task = tokio::spawn(async move {
            let mut pubsub = Some(first);
            loop {
                let current = match pubsub.take() {
                    Some(p) => p,
                    None => match Self::open(&client, &channel).await {
                        Ok(p) => {
                            info!(channel = %channel, "Resubscribed to Redis event channel");
                            p
                        }
                        Err(e) => {
                            warn!(error = %e, "Redis resubscribe failed");
                            tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                            continue;
                        }
                    },
                };

                let mut messages = current.into_on_message();
                while let Some(msg) = messages.next().await {
                    let event = msg
                        .get_payload::<String>()
                        .map_err(crate::JobError::from)
                        .and_then(|p| serde_json::from_str::<JobEvent>(&p).map_err(Into::into));
                    match event {
                        Ok(event) => dispatch(handler.as_ref(), &event).await,
                        Err(e) => warn!(error = %e, "Ignoring malformed job event"),
                    }
                }

                warn!(channel = %channel, "Redis event subscription ended");
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
            }
        });

        Ok(Subscription::new(task))
    }
}
