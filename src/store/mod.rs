pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::Record;

pub use memory::MemoryStore;

/// The authoritative persistence backend behind the hub.
///
/// Every hook has a default: identity pass-through for mutations and
/// not-found/empty for lookups, so an implementation overrides only the
/// hooks it wants to be authoritative for. Hooks validate at this
/// boundary; the protocol layer above never inspects field contents.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Persist a new record and return its canonical form, normally
    /// with a freshly assigned id.
    async fn create_model(&self, record: Record) -> Result<Record, StoreError> {
        Ok(record)
    }

    /// Persist changes to an existing record and return its canonical
    /// form.
    async fn update_model(&self, record: Record) -> Result<Record, StoreError> {
        Ok(record)
    }

    /// Look up the record identified by `record.id()`.
    async fn find_model(&self, record: Record) -> Result<Option<Record>, StoreError> {
        let _ = record;
        Ok(None)
    }

    /// The full snapshot, in a stable order.
    async fn find_models(&self) -> Result<Vec<Record>, StoreError> {
        Ok(Vec::new())
    }

    /// Delete the record identified by `record.id()`; `None` when there
    /// was nothing to delete.
    async fn delete_model(&self, record: Record) -> Result<Option<Record>, StoreError> {
        let _ = record;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PassThrough;
    impl ModelStore for PassThrough {}

    #[tokio::test]
    async fn default_hooks_pass_through_and_miss() {
        let store = PassThrough;

        let mut record = Record::new();
        record.set("name", "x");

        let created = store.create_model(record.clone()).await.unwrap();
        assert_eq!(created, record);
        assert!(created.id().is_none());

        assert!(store.find_model(record.clone()).await.unwrap().is_none());
        assert!(store.find_models().await.unwrap().is_empty());
        assert!(store.delete_model(record).await.unwrap().is_none());
    }
}
