//! Redis job store.
//!
//! Each job is a hash with the JSON document plus its status rank and a
//! terminal flag, so the forward-only guard runs inside Redis.

use super::RedisKeys;
use crate::error::{JobError, JobResult};
use crate::store::JobStore;
use async_trait::async_trait;
use deadpool_redis::Pool;
use lumen_core::{JobId, OwnerId, ThumbnailJob};
use redis::{AsyncCommands, Script};
use tracing::{debug, warn};

const INSERT_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'doc', ARGV[1], 'rank', ARGV[2], 'terminal', ARGV[3])
redis.call('ZADD', KEYS[2], ARGV[4], ARGV[5])
return 1
";

const SAVE_SCRIPT: &str = r"
local current = redis.call('HMGET', KEYS[1], 'rank', 'terminal')
if not current[1] then
    return -1
end
if current[2] == '1' or tonumber(ARGV[2]) < tonumber(current[1]) then
    return 0
end
redis.call('HSET', KEYS[1], 'doc', ARGV[1], 'rank', ARGV[2], 'terminal', ARGV[3])
return 1
";

/// Redis-backed job store.
pub struct RedisJobStore {
    pool: Pool,
    keys: RedisKeys,
}

impl RedisJobStore {
    /// Create a store over a connection pool.
    pub fn new(pool: Pool, keys: RedisKeys) -> Self {
        Self { pool, keys }
    }

    async fn conn(&self) -> JobResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

fn terminal_flag(job: &ThumbnailJob) -> &'static str {
    if job.is_terminal() {
        "1"
    } else {
        "0"
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn insert_if_absent(&self, job: &ThumbnailJob) -> JobResult<bool> {
        let doc = serde_json::to_string(job)?;
        let mut conn = self.conn().await?;

        let inserted: i32 = Script::new(INSERT_SCRIPT)
            .key(self.keys.job(job.job_id.as_str()))
            .key(self.keys.owner_jobs(job.owner_id.as_str()))
            .arg(doc)
            .arg(job.status.rank())
            .arg(terminal_flag(job))
            .arg(job.created_at.timestamp_millis())
            .arg(job.job_id.as_str())
            .invoke_async(&mut *conn)
            .await?;

        Ok(inserted == 1)
    }

    async fn get(&self, job_id: &JobId) -> JobResult<Option<ThumbnailJob>> {
        let mut conn = self.conn().await?;
        let doc: Option<String> = conn.hget(self.keys.job(job_id.as_str()), "doc").await?;
        doc.map(|d| serde_json::from_str(&d).map_err(JobError::from))
            .transpose()
    }

    async fn save(&self, job: &ThumbnailJob) -> JobResult<()> {
        let doc = serde_json::to_string(job)?;
        let mut conn = self.conn().await?;

        let result: i32 = Script::new(SAVE_SCRIPT)
            .key(self.keys.job(job.job_id.as_str()))
            .arg(doc)
            .arg(job.status.rank())
            .arg(terminal_flag(job))
            .invoke_async(&mut *conn)
            .await?;

        match result {
            1 => {
                debug!(job_id = %job.job_id, status = %job.status, "Saved job");
                Ok(())
            }
            -1 => Err(JobError::NotFound(job.job_id.to_string())),
            _ => {
                drop(conn);
                let from = self
                    .get(&job.job_id)
                    .await?
                    .map_or_else(|| "unknown".to_string(), |j| j.status.to_string());
                warn!(job_id = %job.job_id, from = %from, to = %job.status, "Refused backwards job write");
                Err(JobError::InvalidTransition {
                    job_id: job.job_id.to_string(),
                    from,
                    to: job.status.to_string(),
                })
            }
        }
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> JobResult<Vec<ThumbnailJob>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .zrevrange(self.keys.owner_jobs(owner.as_str()), 0, -1)
            .await?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hget(self.keys.job(id), "doc");
        }
        let docs: Vec<Option<String>> = pipe.query_async(&mut *conn).await?;

        let mut jobs = Vec::with_capacity(docs.len());
        for doc in docs.into_iter().flatten() {
            jobs.push(serde_json::from_str::<ThumbnailJob>(&doc)?);
        }
        // Equal creation millis fall back to id order; re-sort on the full timestamp.
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}
