//! Per-owner distributed lock.
//!
//! A lock is a key holding a random token with a TTL. Acquisition is a
//! single set-if-absent; release deletes the key only while it still holds
//! the caller's token, so a holder whose TTL ran out can never remove the
//! lock of whoever acquired it next.

use crate::error::JobResult;
use crate::metrics::LockMetrics;
use crate::redis::RedisKeys;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lumen_core::OwnerId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared key-value store with atomic primitives.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Sets `key` to `value` with a TTL only if `key` does not exist.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> JobResult<bool>;

    /// Deletes `key` only if it currently holds `value`.
    async fn compare_and_delete(&self, key: &str, value: &str) -> JobResult<bool>;
}

/// Proof of holding an owner lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    /// Full store key of the lock.
    pub owner_key: String,
    /// Random value unique to this acquisition.
    pub token: String,
    /// When the lock lapses unless released earlier.
    pub expires_at: DateTime<Utc>,
}

impl LockToken {
    /// Returns true if the TTL has run out.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Non-blocking mutual exclusion keyed by owner.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn CoordinationStore>,
    keys: RedisKeys,
}

impl DistributedLock {
    /// Create a lock over the given store.
    pub fn new(store: Arc<dyn CoordinationStore>, keys: RedisKeys) -> Self {
        Self { store, keys }
    }

    /// Tries to take the owner's lock. Returns `None` if someone holds it.
    pub async fn acquire(&self, owner: &OwnerId, ttl: Duration) -> JobResult<Option<LockToken>> {
        let key = self.keys.owner_lock(owner.as_str());
        let token = Uuid::new_v4().to_string();

        let acquired = self.store.set_if_absent(&key, &token, ttl).await?;
        LockMetrics::acquire(acquired);

        if !acquired {
            debug!(owner_id = %owner, "Owner lock busy");
            return Ok(None);
        }

        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        debug!(owner_id = %owner, "Acquired owner lock");
        Ok(Some(LockToken {
            owner_key: key,
            token,
            expires_at: Utc::now() + ttl,
        }))
    }

    /// Releases a lock taken by [`acquire`](Self::acquire).
    ///
    /// Returns `false` if the lock had already expired or now belongs to
    /// another holder; that holder's lock is left untouched.
    pub async fn release(&self, lock: &LockToken) -> JobResult<bool> {
        let released = self
            .store
            .compare_and_delete(&lock.owner_key, &lock.token)
            .await?;
        LockMetrics::release(released);

        if !released {
            warn!(key = %lock.owner_key, "Owner lock was no longer held at release");
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCoordinationStore;

    fn lock() -> DistributedLock {
        DistributedLock::new(
            Arc::new(InMemoryCoordinationStore::new()),
            RedisKeys::new("test"),
        )
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let lock = lock();
        let owner = OwnerId::from("u1");

        let first = lock.acquire(&owner, Duration::from_secs(30)).await.unwrap();
        assert!(first.is_some());
        assert!(lock
            .acquire(&owner, Duration::from_secs(30))
            .await
            .unwrap()
            .is_none());

        let other = lock
            .acquire(&OwnerId::from("u2"), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(other.is_some());
    }

    #[tokio::test]
    async fn test_release_allows_reacquire() {
        let lock = lock();
        let owner = OwnerId::from("u1");

        let token = lock
            .acquire(&owner, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.owner_key, "test:lock:owner:u1");
        assert!(lock.release(&token).await.unwrap());
        assert!(!lock.release(&token).await.unwrap());
        assert!(lock
            .acquire(&owner, Duration::from_secs(30))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_release_after_expiry_keeps_new_holder() {
        let lock = lock();
        let owner = OwnerId::from("u1");

        let stale = lock
            .acquire(&owner, Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(stale.is_expired());

        let fresh = lock
            .acquire(&owner, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert!(!lock.release(&stale).await.unwrap());

        assert!(lock
            .acquire(&owner, Duration::from_secs(30))
            .await
            .unwrap()
            .is_none());
        assert!(lock.release(&fresh).await.unwrap());
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let lock = lock();
        let a = lock
            .acquire(&OwnerId::from("u1"), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        let b = lock
            .acquire(&OwnerId::from("u2"), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(a.token, b.token);
    }
}
