//! Storage engine - top-level coordinator

use super::{BlobDbOptions, ErrorChannel, StorageConfig};
use crate::blob::{BlobFileSet, BlobFileStorage, BlobFileWriter, BlobStorage};
use crate::compaction::{CompactionEntry, CompactionJob, CompactionOutput};
use crate::filter::{FilterContext, OriginalFilter, TtlCompactionFilterFactory};
use crate::{Result, VaultError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// A column family and its blob files
pub struct ColumnFamily {
    id: u32,
    name: String,
    options: BlobDbOptions,
    storage: Arc<BlobFileStorage>,
    next_file_number: AtomicU64,
}

impl ColumnFamily {
    fn open(id: u32, name: &str, dir: PathBuf, options: BlobDbOptions) -> Result<Self> {
        let storage = BlobFileStorage::open(dir)?;
        let next_file_number = storage.file_numbers()?.last().map_or(1, |n| n + 1);

        Ok(Self {
            id,
            name: name.to_string(),
            options,
            storage: Arc::new(storage),
            next_file_number: AtomicU64::new(next_file_number),
        })
    }

    /// Column family id
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Column family name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blob options of this column family
    pub fn options(&self) -> &BlobDbOptions {
        &self.options
    }

    /// Blob storage of this column family
    pub fn storage(&self) -> &Arc<BlobFileStorage> {
        &self.storage
    }

    /// Start a new blob file
    pub fn new_blob_writer(&self) -> Result<BlobFileWriter> {
        let file_number = self.next_file_number.fetch_add(1, Ordering::SeqCst);
        self.storage.new_writer(file_number)
    }
}

/// VaultKV storage engine
pub struct StorageEngine {
    config: StorageConfig,
    column_families: RwLock<HashMap<String, Arc<ColumnFamily>>>,
    next_cf_id: AtomicU32,
    blob_file_set: Arc<BlobFileSet>,
    errors: Arc<ErrorChannel>,
}

impl StorageEngine {
    /// Create a new storage engine
    pub fn new(config: StorageConfig) -> Result<Self> {
        config.blob.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let engine = Self {
            config,
            column_families: RwLock::new(HashMap::new()),
            next_cf_id: AtomicU32::new(0),
            blob_file_set: Arc::new(BlobFileSet::new()),
            errors: Arc::new(ErrorChannel::new()),
        };

        // Load existing column families
        engine.load_column_families()?;

        Ok(engine)
    }

    /// Data directory
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Create a column family with the engine's default options
    pub fn create_column_family(&self, name: &str) -> Result<Arc<ColumnFamily>> {
        self.create_column_family_with_options(name, self.config.blob.clone())
    }

    /// Create a column family with explicit options
    pub fn create_column_family_with_options(
        &self,
        name: &str,
        options: BlobDbOptions,
    ) -> Result<Arc<ColumnFamily>> {
        options.validate()?;
        let mut column_families = self.column_families.write();

        if column_families.contains_key(name) {
            return Err(VaultError::Config(format!(
                "Column family {} already exists",
                name
            )));
        }

        let cf = self.open_column_family(name, options)?;
        column_families.insert(name.to_string(), cf.clone());

        info!("Created column family: {} (id {})", name, cf.id());

        Ok(cf)
    }

    /// Get a column family by name
    pub fn column_family(&self, name: &str) -> Option<Arc<ColumnFamily>> {
        self.column_families.read().get(name).cloned()
    }

    /// Drop a column family and delete its blob files.
    ///
    /// Compaction jobs already holding its storage keep running; later
    /// lookups see the column family as dropped.
    pub fn drop_column_family(&self, name: &str) -> Result<()> {
        let cf = self
            .column_families
            .write()
            .remove(name)
            .ok_or_else(|| VaultError::ColumnFamilyNotFound(name.to_string()))?;

        let dir = cf.storage().dir().to_path_buf();
        drop(cf);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }

        info!("Dropped column family: {}", name);

        Ok(())
    }

    /// List all column families
    pub fn list_column_families(&self) -> Vec<String> {
        let mut names: Vec<_> = self.column_families.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Registry of blob storage handles
    pub fn blob_file_set(&self) -> &Arc<BlobFileSet> {
        &self.blob_file_set
    }

    /// Background error slot shared by compaction jobs
    pub fn errors(&self) -> &Arc<ErrorChannel> {
        &self.errors
    }

    /// Build the compaction filter factory of a column family
    pub fn compaction_filter_factory(
        &self,
        cf_name: &str,
        original: OriginalFilter,
    ) -> Result<TtlCompactionFilterFactory> {
        let cf = self
            .column_family(cf_name)
            .ok_or_else(|| VaultError::ColumnFamilyNotFound(cf_name.to_string()))?;

        Ok(TtlCompactionFilterFactory::new(
            cf.name(),
            original,
            self.blob_file_set.clone(),
            self.errors.clone(),
            cf.options(),
        ))
    }

    /// Run one compaction job over a sorted run of entries, filtering them
    /// through a filter built by `factory`
    pub fn compact(
        &self,
        cf_name: &str,
        level: u32,
        factory: &TtlCompactionFilterFactory,
        entries: Vec<CompactionEntry>,
    ) -> Result<CompactionOutput> {
        let cf = self
            .column_family(cf_name)
            .ok_or_else(|| VaultError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let context = FilterContext {
            column_family_id: cf.id(),
            is_full_compaction: false,
            is_manual_compaction: true,
        };
        let filter = factory.create_compaction_filter(&context);
        if filter.is_none() {
            warn!("[{}] Compacting level {} without a filter", cf_name, level);
        }

        CompactionJob::new(level, filter, self.errors.clone()).run(entries)
    }

    /// Get engine statistics
    pub fn stats(&self) -> Result<EngineStats> {
        let column_families = self.column_families.read();
        let mut blob_files = 0;
        for cf in column_families.values() {
            blob_files += cf.storage().file_numbers()?.len();
        }

        Ok(EngineStats {
            column_family_count: column_families.len(),
            blob_file_count: blob_files,
            bg_error_reports: self.errors.report_count(),
        })
    }

    fn open_column_family(&self, name: &str, options: BlobDbOptions) -> Result<Arc<ColumnFamily>> {
        let id = self.next_cf_id.fetch_add(1, Ordering::SeqCst);
        let cf = Arc::new(ColumnFamily::open(
            id,
            name,
            self.config.data_dir.join(name),
            options,
        )?);

        let storage: Arc<dyn BlobStorage> = cf.storage().clone();
        self.blob_file_set.register(id, &storage);

        Ok(cf)
    }

    fn load_column_families(&self) -> Result<()> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.config.data_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name().to_string_lossy().to_string();

                // Skip hidden directories
                if name.starts_with('.') {
                    continue;
                }
                names.push(name);
            }
        }
        names.sort();

        for name in names {
            match self.open_column_family(&name, self.config.blob.clone()) {
                Ok(cf) => {
                    self.column_families.write().insert(name.clone(), cf);
                    info!("Loaded column family: {}", name);
                }
                Err(e) => {
                    warn!("Failed to load column family {}: {}", name, e);
                }
            }
        }

        Ok(())
    }
}

/// Storage engine statistics
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub column_family_count: usize,
    pub blob_file_count: usize,
    pub bg_error_reports: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::CompactionFilter;
    use crate::ttl::{now_secs, with_ttl};
    use crate::{Decision, SequenceNumber, ValueType};
    use tempfile::TempDir;

    struct DropRemaining;

    impl CompactionFilter for DropRemaining {
        fn name(&self) -> &str {
            "DropRemaining"
        }

        fn filter(
            &self,
            _level: u32,
            _key: &[u8],
            _sequence: SequenceNumber,
            _value_type: ValueType,
            value: &[u8],
        ) -> Decision {
            Decision::from_remove(!value.starts_with(b"remain"))
        }
    }

    fn engine(temp_dir: &TempDir, blob: BlobDbOptions) -> StorageEngine {
        StorageEngine::new(StorageConfig {
            data_dir: temp_dir.path().to_path_buf(),
            blob,
        })
        .unwrap()
    }

    #[test]
    fn test_column_family_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, BlobDbOptions::default());

        let cf = engine.create_column_family("default").unwrap();
        assert_eq!(cf.name(), "default");
        assert!(engine.create_column_family("default").is_err());

        engine.create_column_family("last_summer").unwrap();
        assert_eq!(
            engine.list_column_families(),
            vec!["default".to_string(), "last_summer".to_string()]
        );
        assert!(engine.blob_file_set().blob_storage(cf.id()).is_ok());

        engine.drop_column_family("last_summer").unwrap();
        assert!(engine.column_family("last_summer").is_none());
        assert!(engine.drop_column_family("last_summer").is_err());
        assert!(!temp_dir.path().join("last_summer").exists());
    }

    #[test]
    fn test_reopen_loads_column_families() {
        let temp_dir = TempDir::new().unwrap();
        {
            let engine = engine(&temp_dir, BlobDbOptions::default());
            let cf = engine.create_column_family("default").unwrap();
            let mut writer = cf.new_blob_writer().unwrap();
            writer.add(b"k", b"v", 0).unwrap();
            writer.finish().unwrap();
        }

        let engine = engine(&temp_dir, BlobDbOptions::default());
        assert_eq!(engine.list_column_families(), vec!["default".to_string()]);

        let cf = engine.column_family("default").unwrap();
        assert_eq!(cf.new_blob_writer().unwrap().file_number(), 2);

        let stats = engine.stats().unwrap();
        assert_eq!(stats.column_family_count, 1);
        assert_eq!(stats.blob_file_count, 2);
        assert_eq!(stats.bg_error_reports, 0);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, BlobDbOptions::default());
        let options = BlobDbOptions {
            min_blob_size: 0,
            ..Default::default()
        };
        assert!(engine
            .create_column_family_with_options("bad", options)
            .is_err());
    }

    #[test]
    fn test_compact_with_ttl() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(
            &temp_dir,
            BlobDbOptions {
                enable_ttl: true,
                ..Default::default()
            },
        );
        let cf = engine.create_column_family("default").unwrap();
        let now = now_secs();

        let mut writer = cf.new_blob_writer().unwrap();
        let expired = writer.add(b"key_0", &[b'v'; 10_240], now - 5).unwrap();
        let live = writer.add(b"key_1", &[b'v'; 10_240], 0).unwrap();
        writer.finish().unwrap();

        let entries = vec![
            CompactionEntry::blob(b"key_0".to_vec(), 2, &expired),
            CompactionEntry::new(
                b"key_1".to_vec(),
                3,
                ValueType::BlobIndex,
                with_ttl(&live.encode(), now + 3600),
            ),
            CompactionEntry::value(b"key_2".to_vec(), 4, b"remain-inline".to_vec()),
        ];

        let factory = engine
            .compaction_filter_factory("default", OriginalFilter::Filter(Arc::new(DropRemaining)))
            .unwrap();
        let output = engine.compact("default", 1, &factory, entries).unwrap();

        let keys: Vec<_> = output.entries.iter().map(|e| e.user_key.clone()).collect();
        assert_eq!(keys, vec![b"key_1".to_vec(), b"key_2".to_vec()]);
        assert_eq!(output.stats.removed, 1);
    }

    #[test]
    fn test_compact_resolves_blobs() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, BlobDbOptions::default());
        let cf = engine.create_column_family("default").unwrap();

        let mut writer = cf.new_blob_writer().unwrap();
        let remain = writer.add(b"update-another-key", b"remain2", 0).unwrap();
        let stale = writer.add(b"update-key", b"value", 0).unwrap();
        writer.finish().unwrap();

        let entries = vec![
            CompactionEntry::blob(b"update-another-key".to_vec(), 1, &remain),
            CompactionEntry::blob(b"update-key".to_vec(), 3, &stale),
        ];

        let factory = engine
            .compaction_filter_factory("default", OriginalFilter::Filter(Arc::new(DropRemaining)))
            .unwrap();
        let output = engine.compact("default", 1, &factory, entries).unwrap();

        assert_eq!(output.entries.len(), 1);
        assert_eq!(output.entries[0].user_key, b"update-another-key");
        assert_eq!(output.entries[0].value, remain.encode());
    }

    #[test]
    fn test_compact_keeps_gc_blobs() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, BlobDbOptions::default());
        let cf = engine.create_column_family("default").unwrap();

        let mut writer = cf.new_blob_writer().unwrap();
        let index = writer.add(b"bigkey", b"value", 0).unwrap();
        let meta = writer.finish().unwrap();
        cf.storage().remove_file(meta.file_number).unwrap();

        let factory = engine
            .compaction_filter_factory("default", OriginalFilter::Filter(Arc::new(DropRemaining)))
            .unwrap();
        let entries = vec![CompactionEntry::blob(b"bigkey".to_vec(), 1, &index)];
        let output = engine.compact("default", 1, &factory, entries).unwrap();

        assert_eq!(output.entries.len(), 1);
        assert_eq!(engine.errors().report_count(), 0);
    }

    #[test]
    fn test_compact_fails_on_background_error() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, BlobDbOptions::default());
        engine.create_column_family("default").unwrap();

        let entries = vec![CompactionEntry::new(
            b"broken".to_vec(),
            1,
            ValueType::BlobIndex,
            b"\x09not-an-index".to_vec(),
        )];

        let factory = engine
            .compaction_filter_factory("default", OriginalFilter::Filter(Arc::new(DropRemaining)))
            .unwrap();
        let result = engine.compact("default", 1, &factory, entries);

        assert!(matches!(result, Err(VaultError::Background(_))));
        assert_eq!(engine.errors().report_count(), 1);
    }

    #[test]
    fn test_compact_unknown_column_family() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, BlobDbOptions::default());
        let original = OriginalFilter::Filter(Arc::new(DropRemaining));
        assert!(matches!(
            engine.compaction_filter_factory("missing", original),
            Err(VaultError::ColumnFamilyNotFound(_))
        ));
    }
}
