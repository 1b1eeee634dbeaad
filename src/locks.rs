//! Short-lived mutual exclusion keyed by string, used to serialize checkouts
//! per user and notification handling per order.
//!
//! A lock is held until released or until its TTL lapses, so a crashed holder
//! never blocks a key forever. Release only succeeds for the holder's token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::LockConfig;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock backend error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("lock ttl must be at least one millisecond")]
    InvalidTtl,
}

/// Proof of ownership returned by a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub key: String,
    pub token: String,
}

impl LockToken {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            token: Uuid::new_v4().to_string(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Returns `None` when another holder owns `key`.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError>;

    async fn release(&self, token: &LockToken) -> Result<(), LockError>;
}

#[derive(Debug)]
struct Held {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct InMemoryLockManager {
    held: DashMap<String, Held>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        if ttl.as_millis() == 0 {
            return Err(LockError::InvalidTtl);
        }

        let now = Instant::now();
        let lock = LockToken::new(key);
        let held = Held {
            token: lock.token.clone(),
            expires_at: now + ttl,
        };

        match self.held.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().expires_at > now {
                    return Ok(None);
                }
                existing.insert(held);
            }
            Entry::Vacant(slot) => {
                slot.insert(held);
            }
        }
        Ok(Some(lock))
    }

    async fn release(&self, token: &LockToken) -> Result<(), LockError> {
        self.held
            .remove_if(&token.key, |_, held| held.token == token.token);
        Ok(())
    }
}

pub struct RedisLockManager {
    client: Arc<redis::Client>,
    prefix: String,
}

impl RedisLockManager {
    pub fn new(client: Arc<redis::Client>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}:lock:{}", self.prefix, key)
    }
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let ttl_ms = ttl.as_millis() as u64;
        if ttl_ms == 0 {
            return Err(LockError::InvalidTtl);
        }

        let lock = LockToken::new(key);
        let mut conn = self.client.get_async_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.redis_key(key))
            .arg(&lock.token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| lock))
    }

    async fn release(&self, token: &LockToken) -> Result<(), LockError> {
        let mut conn = self.client.get_async_connection().await?;
        let _: i64 = redis::cmd("EVAL")
            .arg(RELEASE_SCRIPT)
            .arg(1)
            .arg(self.redis_key(&token.key))
            .arg(&token.token)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

pub struct LockFactory;

impl LockFactory {
    pub fn create(
        config: &LockConfig,
        redis: Arc<redis::Client>,
        prefix: &str,
    ) -> Arc<dyn LockManager> {
        match config.backend.as_str() {
            "redis" => Arc::new(RedisLockManager::new(redis, prefix)),
            "in-memory" => Arc::new(InMemoryLockManager::new()),
            other => {
                warn!(backend = other, "Unknown lock backend, using in-memory locks");
                Arc::new(InMemoryLockManager::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn second_holder_is_refused_until_release() {
        let locks = InMemoryLockManager::new();

        let first = locks.try_acquire("checkout:user:1", TTL).await.unwrap();
        let first = first.expect("first acquire succeeds");
        assert!(locks.try_acquire("checkout:user:1", TTL).await.unwrap().is_none());
        assert!(locks.try_acquire("checkout:user:2", TTL).await.unwrap().is_some());

        locks.release(&first).await.unwrap();
        assert!(locks.try_acquire("checkout:user:1", TTL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_token_does_not_release_new_holder() {
        let locks = InMemoryLockManager::new();

        let stale = locks
            .try_acquire("webhook:order:A", Duration::from_millis(5))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let current = locks.try_acquire("webhook:order:A", TTL).await.unwrap();
        assert!(current.is_some());

        locks.release(&stale).await.unwrap();
        assert!(locks.try_acquire("webhook:order:A", TTL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let locks = InMemoryLockManager::new();
        assert_matches!(
            locks.try_acquire("k", Duration::ZERO).await,
            Err(LockError::InvalidTtl)
        );
    }
}
