//! Redis-backed queue, lock store, job store and event bus.

mod events;
mod lock;
mod queue;
mod store;

pub use events::RedisEventBus;
pub use lock::RedisCoordinationStore;
pub use queue::RedisWorkQueue;
pub use store::RedisJobStore;

use crate::error::{JobError, JobResult};
use deadpool_redis::{Config, Pool, Runtime};
use lumen_config::RedisConfig;
use tracing::info;

/// Create a Redis connection pool.
pub async fn create_pool(config: &RedisConfig) -> JobResult<Pool> {
    info!("Creating Redis connection pool...");

    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| JobError::Configuration(format!("Invalid Redis config: {e}")))?
        .max_size(config.pool_size as usize)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create pool: {e}")))?;

    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// Redis key builder.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    /// Create a new key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Ready entries (sorted set: job id scored by ready-at millis).
    pub fn queue_ready(&self, queue_name: &str) -> String {
        format!("{}:queue:{}:ready", self.prefix, queue_name)
    }

    /// Entry bodies and dedup markers (hash: job id -> queued payload).
    pub fn queue_data(&self, queue_name: &str) -> String {
        format!("{}:queue:{}:data", self.prefix, queue_name)
    }

    /// Claimed entries (sorted set: job id scored by claim millis).
    pub fn queue_inflight(&self, queue_name: &str) -> String {
        format!("{}:queue:{}:inflight", self.prefix, queue_name)
    }

    /// Job record (hash with `doc`, `rank` and `terminal` fields).
    pub fn job(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    /// Owner's job index (sorted set scored by creation millis).
    pub fn owner_jobs(&self, owner_id: &str) -> String {
        format!("{}:owner:{}:jobs", self.prefix, owner_id)
    }

    /// Per-owner processing lock.
    pub fn owner_lock(&self, owner_id: &str) -> String {
        format!("{}:lock:owner:{}", self.prefix, owner_id)
    }

    /// Job event channel.
    pub fn events(&self) -> String {
        format!("{}:events", self.prefix)
    }
}

impl Default for RedisKeys {
    fn default() -> Self {
        Self::new("lumen")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_keys() {
        let keys = RedisKeys::new("test");

        assert_eq!(keys.queue_ready("thumbnail-jobs"), "test:queue:thumbnail-jobs:ready");
        assert_eq!(keys.queue_data("q"), "test:queue:q:data");
        assert_eq!(keys.queue_inflight("q"), "test:queue:q:inflight");
        assert_eq!(keys.job("123"), "test:job:123");
        assert_eq!(keys.owner_jobs("u1"), "test:owner:u1:jobs");
        assert_eq!(keys.owner_lock("u1"), "test:lock:owner:u1");
        assert_eq!(keys.events(), "test:events");
    }

    #[test]
    fn test_default_prefix() {
        assert_eq!(RedisKeys::default().events(), "lumen:events");
    }
}
