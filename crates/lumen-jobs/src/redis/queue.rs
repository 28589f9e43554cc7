//! Redis work queue.
//!
//! Three keys per queue: a `data` hash holding each entry body (its presence
//! is the dedup marker), a `ready` sorted set scored by when the entry may be
//! delivered, and an `inflight` sorted set scored by claim time.

use super::RedisKeys;
use crate::error::JobResult;
use crate::metrics::JobMetrics;
use crate::payload::{QueuedPayload, ThumbnailPayload};
use crate::queue::{Delivery, WorkQueue};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use deadpool_redis::Pool;
use lumen_core::JobId;
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tracing::{debug, error, info};

const ENQUEUE_SCRIPT: &str = r"
if redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2]) == 0 then
    return 0
end
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
return 1
";

const DEQUEUE_SCRIPT: &str = r"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #ids == 0 then
    return false
end
local id = ids[1]
redis.call('ZREM', KEYS[1], id)
local body = redis.call('HGET', KEYS[3], id)
if not body then
    return false
end
redis.call('ZADD', KEYS[2], ARGV[1], id)
return {id, body}
";

const RECOVER_SCRIPT: &str = r"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, id in ipairs(ids) do
    redis.call('ZREM', KEYS[1], id)
    redis.call('ZADD', KEYS[2], ARGV[2], id)
end
return #ids
";

/// Redis-backed work queue shared by all worker processes.
pub struct RedisWorkQueue {
    pool: Pool,
    queue_name: String,
    ready: String,
    data: String,
    inflight: String,
}

impl RedisWorkQueue {
    /// Create a queue named `queue_name` under the given keys.
    pub fn new(pool: Pool, keys: &RedisKeys, queue_name: impl Into<String>) -> Self {
        let queue_name = queue_name.into();
        Self {
            pool,
            ready: keys.queue_ready(&queue_name),
            data: keys.queue_data(&queue_name),
            inflight: keys.queue_inflight(&queue_name),
            queue_name,
        }
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> JobResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn enqueue(&self, payload: ThumbnailPayload) -> JobResult<bool> {
        let entry = QueuedPayload::new(payload);
        let json = entry.to_json()?;
        let mut conn = self.conn().await?;

        let inserted: i32 = Script::new(ENQUEUE_SCRIPT)
            .key(&self.data)
            .key(&self.ready)
            .arg(entry.job_id().as_str())
            .arg(&json)
            .arg(entry.ready_at.timestamp_millis())
            .invoke_async(&mut *conn)
            .await?;

        let inserted = inserted == 1;
        if inserted {
            debug!(job_id = %entry.job_id(), queue = %self.queue_name, "Enqueued job");
        } else {
            debug!(job_id = %entry.job_id(), queue = %self.queue_name, "Job already queued");
        }
        Ok(inserted)
    }

    async fn dequeue(&self, consumer_id: &str) -> JobResult<Option<Delivery>> {
        let mut conn = self.conn().await?;
        let now = Utc::now();

        let claimed: Option<(String, String)> = Script::new(DEQUEUE_SCRIPT)
            .key(&self.ready)
            .key(&self.inflight)
            .key(&self.data)
            .arg(now.timestamp_millis())
            .invoke_async(&mut *conn)
            .await?;

        let Some((id, body)) = claimed else {
            return Ok(None);
        };

        match QueuedPayload::from_json(&body) {
            Ok(entry) => {
                debug!(
                    job_id = %entry.job_id(),
                    attempt = entry.attempt,
                    consumer_id = %consumer_id,
                    "Dequeued job"
                );
                Ok(Some(Delivery {
                    entry,
                    consumer_id: consumer_id.to_string(),
                    claimed_at: now,
                }))
            }
            Err(e) => {
                error!(error = %e, job_id = %id, queue = %self.queue_name, "Dropping unreadable queue entry");
                self.ack(&JobId::from(id)).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, job_id: &JobId) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::pipe()
            .atomic()
            .hdel(&self.data, job_id.as_str())
            .zrem(&self.inflight, job_id.as_str())
            .zrem(&self.ready, job_id.as_str())
            .query_async(&mut *conn)
            .await?;

        debug!(job_id = %job_id, "Acknowledged job");
        Ok(())
    }

    async fn requeue_with_delay(&self, delivery: &Delivery, delay: Duration) -> JobResult<u32> {
        let mut entry = delivery.entry.clone();
        entry.attempt = entry.attempt.saturating_add(1);
        entry.ready_at = Utc::now() + ChronoDuration::from_std(delay).unwrap_or_default();
        let json = entry.to_json()?;

        let mut conn = self.conn().await?;
        let _: () = redis::pipe()
            .atomic()
            .zrem(&self.inflight, entry.job_id().as_str())
            .hset(&self.data, entry.job_id().as_str(), &json)
            .zadd(&self.ready, entry.job_id().as_str(), entry.ready_at.timestamp_millis())
            .query_async(&mut *conn)
            .await?;

        debug!(
            job_id = %entry.job_id(),
            attempt = entry.attempt,
            ready_at = %entry.ready_at,
            "Requeued job with delay"
        );
        Ok(entry.attempt)
    }

    async fn recover_stale(&self, visibility_timeout: Duration) -> JobResult<u64> {
        let now = Utc::now();
        let cutoff = now - ChronoDuration::from_std(visibility_timeout).unwrap_or_default();
        let mut conn = self.conn().await?;

        let recovered: u64 = Script::new(RECOVER_SCRIPT)
            .key(&self.inflight)
            .key(&self.ready)
            .arg(cutoff.timestamp_millis())
            .arg(now.timestamp_millis())
            .invoke_async(&mut *conn)
            .await?;

        if recovered > 0 {
            JobMetrics::recovered(&self.queue_name, recovered);
            info!(count = recovered, queue = %self.queue_name, "Recovered stale in-flight jobs");
        }
        Ok(recovered)
    }

    async fn pending_count(&self) -> JobResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(&self.ready).await?)
    }

    async fn in_flight_count(&self) -> JobResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(&self.inflight).await?)
    }

    async fn health_check(&self) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}
