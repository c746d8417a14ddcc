//! Storage subsystem.
//!
//! Each backing service owns one [`Store`]. The store knows nothing about
//! caching; services put [`crate::cache::CacheAside`] in front of it.

pub mod memory;
pub mod record;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use record::{Filter, NewRecord, Record, RecordPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A `unique` field of a new record matched an existing one.
    #[error("duplicate value for {field}")]
    Conflict { field: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Record persistence. Absent records are `Ok(None)`, not errors.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_by_id(&self, id: u64) -> Result<Option<Record>>;

    /// Records matching `filter`, ordered by id ascending.
    async fn find_all(&self, filter: &Filter) -> Result<Vec<Record>>;

    async fn create(&self, new: NewRecord) -> Result<Record>;

    async fn update(&self, id: u64, patch: RecordPatch) -> Result<Option<Record>>;

    /// Remove and return the record.
    async fn delete(&self, id: u64) -> Result<Option<Record>>;
}
