use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::record::Record;
use super::ModelStore;

/// In-memory [`ModelStore`] keyed by canonical id string.
///
/// Assigns ascending integer ids to records created without one, and
/// keeps insertion order for `find_models` snapshots. Used by the CLI
/// server and tests; a production deployment supplies its own store.
pub struct MemoryStore {
    records: DashMap<String, Record>,
    // Insertion order for stable snapshots; DashMap iteration is not.
    order: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            order: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Pre-populate the store, e.g. before broadcasting a reset.
    pub fn seed(&self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            let _ = self.insert(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn insert(&self, mut record: Record) -> Result<Record, StoreError> {
        if record.id().is_none() {
            record.set_id(self.next_id.fetch_add(1, Ordering::Relaxed));
        }
        let key = record
            .id_key()
            .ok_or_else(|| StoreError::new("record has no usable id"))?;
        if self.records.insert(key.clone(), record.clone()).is_none() {
            self.order.lock().push(key);
        }
        Ok(record)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn create_model(&self, record: Record) -> Result<Record, StoreError> {
        self.insert(record)
    }

    async fn update_model(&self, record: Record) -> Result<Record, StoreError> {
        if record.id().is_none() {
            return Err(StoreError::new("update requires an id"));
        }
        self.insert(record)
    }

    async fn find_model(&self, record: Record) -> Result<Option<Record>, StoreError> {
        Ok(record
            .id_key()
            .and_then(|key| self.records.get(&key).map(|entry| entry.clone())))
    }

    async fn find_models(&self) -> Result<Vec<Record>, StoreError> {
        let order = self.order.lock();
        Ok(order
            .iter()
            .filter_map(|key| self.records.get(key).map(|entry| entry.clone()))
            .collect())
    }

    async fn delete_model(&self, record: Record) -> Result<Option<Record>, StoreError> {
        let Some(key) = record.id_key() else {
            return Ok(None);
        };
        let removed = self.records.remove(&key).map(|(_, record)| record);
        if removed.is_some() {
            self.order.lock().retain(|k| k != &key);
        }
        Ok(removed)
    }
}
