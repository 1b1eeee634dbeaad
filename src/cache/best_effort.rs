use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CacheBackend, CacheError};

/// Cache wrapper whose operations cannot fail. Every problem, including
/// undecodable entries, is logged and reported as a miss.
#[derive(Clone)]
pub struct BestEffortCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl BestEffortCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key, "cache hit");
                    Some(value)
                }
                Err(err) => {
                    warn!(key, error = %err, "discarding undecodable cache entry");
                    None
                }
            },
            Err(CacheError::Miss) => {
                debug!(key, "cache miss");
                None
            }
            Err(err) => {
                warn!(key, error = %err, "cache read failed");
                None
            }
        }
    }

    pub async fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "cache value not serializable");
                return;
            }
        };
        if let Err(err) = self.backend.set_with_expiry(key, &raw, self.ttl).await {
            warn!(key, error = %err, "cache write failed");
        }
    }
}
