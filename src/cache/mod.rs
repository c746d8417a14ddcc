//! Cache subsystem.
//!
//! # Data Flow
//! ```text
//! service read  → aside.rs get_or_populate → store.rs KvCache (memory.rs | redis.rs)
//! service write → store mutation → aside.rs invalidate (keys, then prefixes)
//! ```
//!
//! # Design Decisions
//! - Values are JSON strings so both backends share one representation
//! - Key layout lives in keys.rs; filtered families are prefix-addressable
//! - No single-flight: concurrent misses may each load and overwrite

pub mod aside;
pub mod keys;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod store;

use std::sync::Arc;

pub use aside::CacheAside;
pub use memory::MemoryCache;
pub use store::{CacheError, KvCache};

use crate::config::{CacheBackend, CacheConfig};

/// Build the configured cache backend.
pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn KvCache>, CacheError> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        #[cfg(feature = "redis")]
        CacheBackend::Redis => Ok(Arc::new(self::redis::RedisCache::connect(&config.redis_url).await?)),
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => {
            tracing::warn!(
                url = %config.redis_url,
                "Redis cache requested but the `redis` feature is disabled; using in-memory cache"
            );
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}
