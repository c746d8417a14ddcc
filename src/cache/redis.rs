//! Redis cache backend.
//!
//! Prefix deletion walks the keyspace with `SCAN MATCH prefix*` and deletes
//! the matches in batches, so it never blocks the server the way `KEYS` does.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use crate::cache::store::{CacheError, KvCache, Result};

const DELETE_BATCH: usize = 500;

pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        tracing::info!(url = %url, "Connected to Redis cache");
        Ok(Self { conn })
    }
}

fn backend(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

/// Escape glob metacharacters so the prefix matches literally.
fn match_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, secs).await.map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: usize = conn.del(key).await.map_err(backend)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys: Vec<String> = {
            let mut conn = self.conn.clone();
            let mut iter: redis::AsyncIter<String> = conn.scan_match(match_pattern(prefix)).await.map_err(backend)?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut removed = 0;
        let mut conn = self.conn.clone();
        for batch in keys.chunks(DELETE_BATCH) {
            let n: usize = conn.del(batch).await.map_err(backend)?;
            removed += n;
        }
        Ok(removed)
    }
}
