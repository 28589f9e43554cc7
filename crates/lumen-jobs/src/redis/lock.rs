//! Redis coordination store for owner locks.

use crate::error::JobResult;
use crate::lock::CoordinationStore;
use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::Script;
use std::time::Duration;

const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// `SET NX PX` for acquisition, a Lua compare-and-delete for release.
#[derive(Clone)]
pub struct RedisCoordinationStore {
    pool: Pool,
}

impl RedisCoordinationStore {
    /// Create a store over a connection pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    #[allow(clippy::cast_possible_truncation)]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> JobResult<bool> {
        let mut conn = self.pool.get().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut *conn)
            .await?;

        Ok(result.is_some())
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> JobResult<bool> {
        let mut conn = self.pool.get().await?;

        let deleted: i32 = Script::new(COMPARE_AND_DELETE_SCRIPT)
            .key(key)
            .arg(value)
            .invoke_async(&mut *conn)
            .await?;

        Ok(deleted == 1)
    }
}
