//! Registry of blob storage handles by column family

use super::BlobStorage;
use crate::{Result, VaultError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Maps column family ids to their blob storage.
///
/// Only weak handles are kept: the column family owns its storage, and a
/// dropped column family leaves a dead entry behind so lookups can tell
/// "dropped" apart from "never registered".
#[derive(Default)]
pub struct BlobFileSet {
    storages: RwLock<HashMap<u32, Weak<dyn BlobStorage>>>,
}

impl BlobFileSet {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the storage of a column family
    pub fn register(&self, column_family_id: u32, storage: &Arc<dyn BlobStorage>) {
        self.storages
            .write()
            .insert(column_family_id, Arc::downgrade(storage));
    }

    /// Forget a column family entirely
    pub fn unregister(&self, column_family_id: u32) -> bool {
        self.storages.write().remove(&column_family_id).is_some()
    }

    /// Upgrade the storage handle of a column family.
    ///
    /// The returned handle keeps the storage alive for as long as it is held.
    pub fn blob_storage(&self, column_family_id: u32) -> Result<Arc<dyn BlobStorage>> {
        let storages = self.storages.read();
        let weak = storages.get(&column_family_id).ok_or_else(|| {
            VaultError::ColumnFamilyNotFound(format!("id {}", column_family_id))
        })?;
        weak.upgrade()
            .ok_or(VaultError::ColumnFamilyDropped(column_family_id))
    }

    /// Number of registered column families, live or dropped
    pub fn len(&self) -> usize {
        self.storages.read().len()
    }

    /// Whether no column family is registered
    pub fn is_empty(&self) -> bool {
        self.storages.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobIndex, BlobRecord, ReadOptions};

    struct NullStorage;

    impl BlobStorage for NullStorage {
        fn get<'b>(
            &self,
            _options: &ReadOptions,
            _index: &BlobIndex,
            _buffer: &'b mut Vec<u8>,
        ) -> Result<BlobRecord<'b>> {
            Err(VaultError::Corruption("empty".into()))
        }
    }

    #[test]
    fn test_lookup_live_storage() {
        let set = BlobFileSet::new();
        let storage: Arc<dyn BlobStorage> = Arc::new(NullStorage);
        set.register(1, &storage);

        assert_eq!(set.len(), 1);
        let handle = set.blob_storage(1).unwrap();
        assert!(Arc::ptr_eq(&handle, &storage));
    }

    #[test]
    fn test_unknown_column_family() {
        let set = BlobFileSet::new();
        assert!(set.is_empty());
        assert!(matches!(
            set.blob_storage(7),
            Err(VaultError::ColumnFamilyNotFound(_))
        ));
    }

    #[test]
    fn test_dropped_column_family() {
        let set = BlobFileSet::new();
        let storage: Arc<dyn BlobStorage> = Arc::new(NullStorage);
        set.register(2, &storage);

        let held = set.blob_storage(2).unwrap();
        drop(storage);
        // An upgraded handle keeps the storage alive
        assert!(set.blob_storage(2).is_ok());

        drop(held);
        assert!(matches!(
            set.blob_storage(2),
            Err(VaultError::ColumnFamilyDropped(2))
        ));

        assert!(set.unregister(2));
        assert!(matches!(
            set.blob_storage(2),
            Err(VaultError::ColumnFamilyNotFound(_))
        ));
    }
}
