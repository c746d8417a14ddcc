//! Key-value cache interface.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// String-valued cache with per-entry TTL.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every key starting with `prefix`; returns how many went.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;
}
