//! Cache-aside read and invalidation protocol.
//!
//! # Read path
//! ```text
//! get(key) ── hit ──▶ return cached value (store untouched)
//!    └─ miss ─▶ loader() ── Some(v) ──▶ set(key, v, ttl) ▶ return v
//!                  └─ None ──▶ return None (nothing cached)
//! ```
//!
//! # Write path
//! The caller commits the store mutation first, then calls
//! [`CacheAside::invalidate`] with the entity key, the full collection key and
//! the prefixes of every filtered family that could contain the entity.
//!
//! Cache faults never fail a request: reads fall through to the loader and
//! writes/deletes are logged and skipped. TTL bounds the resulting staleness.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::store::KvCache;
use crate::observability::metrics;

#[derive(Clone)]
pub struct CacheAside {
    cache: Arc<dyn KvCache>,
    service: &'static str,
}

impl CacheAside {
    pub fn new(cache: Arc<dyn KvCache>, service: &'static str) -> Self {
        Self { cache, service }
    }

    /// Return the cached value for `key`, or load, cache and return it.
    pub async fn get_or_populate<T, E, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(hit) = self.lookup::<T>(key).await {
            return Ok(Some(hit));
        }

        let Some(value) = loader().await? else {
            return Ok(None);
        };

        match serde_json::to_string(&value) {
            Ok(encoded) => {
                if let Err(e) = self.cache.set(key, encoded, ttl).await {
                    tracing::warn!(service = self.service, key = %key, error = %e, "Cache write failed");
                }
            }
            Err(e) => tracing::warn!(service = self.service, key = %key, error = %e, "Cache value not serializable"),
        }
        Ok(Some(value))
    }

    /// Delete `keys`, then every key under each of `prefixes`.
    pub async fn invalidate(&self, keys: &[String], prefixes: &[String]) {
        for key in keys {
            match self.cache.delete(key).await {
                Ok(()) => {
                    tracing::debug!(service = self.service, key = %key, "Cache key invalidated");
                    metrics::record_cache_invalidation(self.service, "key", 1);
                }
                Err(e) => tracing::warn!(service = self.service, key = %key, error = %e, "Cache delete failed"),
            }
        }

        for prefix in prefixes {
            match self.cache.delete_prefix(prefix).await {
                Ok(removed) => {
                    tracing::debug!(service = self.service, prefix = %prefix, removed, "Cache family invalidated");
                    metrics::record_cache_invalidation(self.service, "prefix", removed);
                }
                Err(e) => tracing::warn!(service = self.service, prefix = %prefix, error = %e, "Cache prefix delete failed"),
            }
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    metrics::record_cache_lookup(self.service, "hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(service = self.service, key = %key, error = %e, "Discarding undecodable cache entry");
                    metrics::record_cache_lookup(self.service, "error");
                    None
                }
            },
            Ok(None) => {
                metrics::record_cache_lookup(self.service, "miss");
                None
            }
            Err(e) => {
                tracing::warn!(service = self.service, key = %key, error = %e, "Cache read failed, loading from store");
                metrics::record_cache_lookup(self.service, "error");
                None
            }
        }
    }
}
