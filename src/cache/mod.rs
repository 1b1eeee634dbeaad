//! Key/value cache with expiry, with an in-process and a Redis backend.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::CacheConfig;

pub mod best_effort;

pub use best_effort::BestEffortCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache miss")]
    Miss,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Invalid TTL")]
    InvalidTtl,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns [`CacheError::Miss`] when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<String, CacheError>;
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local cache. Expired entries are evicted lazily on read.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<String, CacheError> {
        let hit = self.store.get(key).map(|entry| {
            (entry.expires_at > Instant::now()).then(|| entry.value.clone())
        });
        match hit {
            Some(Some(value)) => Ok(value),
            Some(None) => {
                self.store.remove(key);
                Err(CacheError::Miss)
            }
            None => Err(CacheError::Miss),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        self.store.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct RedisCache {
    client: Arc<redis::Client>,
}

impl RedisCache {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<String, CacheError> {
        let mut conn = self.client.get_async_connection().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        value.ok_or(CacheError::Miss)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let millis = ttl.as_millis();
        if millis == 0 {
            return Err(CacheError::InvalidTtl);
        }
        let mut conn = self.client.get_async_connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis as u64)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.client.get_async_connection().await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

pub struct CacheFactory;

impl CacheFactory {
    /// Picks the backend named in configuration. Redis falls back to the
    /// in-process cache when the server cannot be reached at startup.
    pub async fn create(
        config: &CacheConfig,
        redis_client: Arc<redis::Client>,
    ) -> Arc<dyn CacheBackend> {
        if config.backend.eq_ignore_ascii_case("redis") {
            match redis_client.get_async_connection().await {
                Ok(_) => {
                    info!("Using Redis product cache");
                    return Arc::new(RedisCache::new(redis_client));
                }
                Err(err) => {
                    warn!("Redis unavailable, falling back to in-memory cache: {}", err);
                }
            }
        }
        Arc::new(InMemoryCache::new())
    }
}
