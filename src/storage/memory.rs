//! In-memory store.
//!
//! Records live in a `BTreeMap` keyed by id, which gives id-ascending
//! listing for free. Ids are assigned from a counter and never reused.
//! Uniqueness checks and the insert share one lock acquisition.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::storage::record::{Filter, NewRecord, Record, RecordPatch};
use crate::storage::{Result, Store, StoreError};

#[derive(Debug)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<u64, Record>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Record>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<Record>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn find_all(&self, filter: &Filter) -> Result<Vec<Record>> {
        Ok(self.lock().values().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn create(&self, new: NewRecord) -> Result<Record> {
        let mut records = self.lock();
        for field in &new.unique {
            let Some(value) = new.fields.get(field) else {
                continue;
            };
            if records.values().any(|r| r.field(field) == Some(value)) {
                return Err(StoreError::Conflict { field: field.clone() });
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let record = Record {
            id,
            fields: new.fields,
            data: new.data,
            created_at: now,
            updated_at: now,
        };
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: u64, patch: RecordPatch) -> Result<Option<Record>> {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&id) else {
            return Ok(None);
        };
        record.fields.extend(patch.fields);
        record.data.extend(patch.data);
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: u64) -> Result<Option<Record>> {
        Ok(self.lock().remove(&id))
    }
}
