//! Per-job construction of TTL compaction filters

use super::{
    CompactionFilter, CompactionFilterFactory, FilterContext, TtlCompactionFilter, WrappedFilter,
};
use crate::blob::BlobFileSet;
use crate::storage::{BlobDbOptions, ErrorChannel};
use crate::VaultError;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Where the user filter comes from
#[derive(Clone)]
pub enum OriginalFilter {
    /// One filter instance shared by every job
    Filter(Arc<dyn CompactionFilter>),
    /// A factory asked for a fresh filter per job
    Factory(Arc<dyn CompactionFilterFactory>),
}

impl OriginalFilter {
    /// Name of the filter or factory
    pub fn name(&self) -> &str {
        match self {
            OriginalFilter::Filter(filter) => filter.name(),
            OriginalFilter::Factory(factory) => factory.name(),
        }
    }
}

/// Builds a [`TtlCompactionFilter`] for each compaction job of a column family
pub struct TtlCompactionFilterFactory {
    name: String,
    cf_name: String,
    original: OriginalFilter,
    blob_file_set: Arc<BlobFileSet>,
    errors: Arc<ErrorChannel>,
    skip_value: bool,
    enable_ttl: bool,
}

impl TtlCompactionFilterFactory {
    /// Create a factory for column family `cf_name`
    pub fn new(
        cf_name: impl Into<String>,
        original: OriginalFilter,
        blob_file_set: Arc<BlobFileSet>,
        errors: Arc<ErrorChannel>,
        options: &BlobDbOptions,
    ) -> Self {
        let cf_name = cf_name.into();
        let name = format!("TtlCompactionFilterFactory.{}", original.name());
        debug!("[{}] Created {}", cf_name, name);

        Self {
            name,
            cf_name,
            original,
            blob_file_set,
            errors,
            skip_value: options.skip_value_in_compaction_filter,
            enable_ttl: options.enable_ttl,
        }
    }

    /// Factory name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the filter for one compaction job.
    ///
    /// Returns `None` when the job should run unfiltered: the column family
    /// has no live blob storage, or the user factory declined to produce a
    /// filter.
    pub fn create_compaction_filter(
        &self,
        context: &FilterContext,
    ) -> Option<TtlCompactionFilter> {
        let blob_storage = match self.blob_file_set.blob_storage(context.column_family_id) {
            Ok(storage) => storage,
            Err(e @ VaultError::ColumnFamilyDropped(_)) => {
                warn!("[{}] Skipping compaction filter: {}", self.cf_name, e);
                self.errors.report(e);
                return None;
            }
            Err(e) => {
                error!(
                    "[{}] No blob storage for column family {}: {}",
                    self.cf_name, context.column_family_id, e
                );
                debug_assert!(
                    false,
                    "no blob storage for column family {}",
                    context.column_family_id
                );
                return None;
            }
        };

        let original = match &self.original {
            OriginalFilter::Filter(filter) => WrappedFilter::Shared(filter.clone()),
            OriginalFilter::Factory(factory) => match factory.create_compaction_filter(context) {
                Some(filter) => WrappedFilter::Owned(filter),
                None => {
                    debug!(
                        "[{}] {} produced no filter for this job",
                        self.cf_name,
                        factory.name()
                    );
                    return None;
                }
            },
        };

        Some(TtlCompactionFilter::new(
            self.cf_name.clone(),
            self.errors.clone(),
            blob_storage,
            original,
            self.skip_value,
            self.enable_ttl,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobIndex, BlobRecord, BlobStorage, ReadOptions};
    use crate::{Decision, Result, SequenceNumber, ValueType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RemoveAll;

    impl CompactionFilter for RemoveAll {
        fn name(&self) -> &str {
            "RemoveAll"
        }

        fn filter(
            &self,
            _level: u32,
            _key: &[u8],
            _sequence: SequenceNumber,
            _value_type: ValueType,
            _value: &[u8],
        ) -> Decision {
            Decision::Remove
        }
    }

    struct CountingFactory {
        produce: bool,
        created: AtomicUsize,
    }

    impl CompactionFilterFactory for CountingFactory {
        fn name(&self) -> &str {
            "Counting"
        }

        fn create_compaction_filter(
            &self,
            context: &FilterContext,
        ) -> Option<Box<dyn CompactionFilter>> {
            assert_eq!(context.column_family_id, 1);
            self.created.fetch_add(1, Ordering::Relaxed);
            if self.produce {
                Some(Box::new(RemoveAll))
            } else {
                None
            }
        }
    }

    struct EmptyStorage;

    impl BlobStorage for EmptyStorage {
        fn get<'b>(
            &self,
            _options: &ReadOptions,
            _index: &BlobIndex,
            _buffer: &'b mut Vec<u8>,
        ) -> Result<BlobRecord<'b>> {
            Err(VaultError::Corruption("empty".into()))
        }
    }

    fn setup() -> (Arc<BlobFileSet>, Arc<dyn BlobStorage>, Arc<ErrorChannel>) {
        let set = Arc::new(BlobFileSet::new());
        let storage: Arc<dyn BlobStorage> = Arc::new(EmptyStorage);
        set.register(1, &storage);
        (set, storage, Arc::new(ErrorChannel::new()))
    }

    fn context() -> FilterContext {
        FilterContext {
            column_family_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_shared_filter() {
        let (set, _storage, errors) = setup();
        let options = BlobDbOptions {
            skip_value_in_compaction_filter: true,
            enable_ttl: true,
            ..Default::default()
        };
        let factory = TtlCompactionFilterFactory::new(
            "default",
            OriginalFilter::Filter(Arc::new(RemoveAll)),
            set,
            errors,
            &options,
        );
        assert_eq!(factory.name(), "TtlCompactionFilterFactory.RemoveAll");

        let mut filter = factory.create_compaction_filter(&context()).unwrap();
        assert_eq!(filter.name(), "TtlCompactionFilter.RemoveAll");
        assert!(filter.skip_value());
        assert!(filter.enable_ttl());
        assert_eq!(
            filter.decide(0, b"k", 1, ValueType::Value, b"v"),
            Decision::Remove
        );
    }

    #[test]
    fn test_filter_from_factory_per_job() {
        let (set, _storage, errors) = setup();
        let user_factory = Arc::new(CountingFactory {
            produce: true,
            created: AtomicUsize::new(0),
        });
        let factory = TtlCompactionFilterFactory::new(
            "default",
            OriginalFilter::Factory(user_factory.clone()),
            set,
            errors,
            &BlobDbOptions::default(),
        );
        assert_eq!(factory.name(), "TtlCompactionFilterFactory.Counting");

        let first = factory.create_compaction_filter(&context()).unwrap();
        let second = factory.create_compaction_filter(&context()).unwrap();
        assert_eq!(first.name(), "TtlCompactionFilter.RemoveAll");
        assert_eq!(second.name(), first.name());
        assert_eq!(user_factory.created.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_factory_without_filter() {
        let (set, _storage, errors) = setup();
        let factory = TtlCompactionFilterFactory::new(
            "default",
            OriginalFilter::Factory(Arc::new(CountingFactory {
                produce: false,
                created: AtomicUsize::new(0),
            })),
            set,
            errors.clone(),
            &BlobDbOptions::default(),
        );

        assert!(factory.create_compaction_filter(&context()).is_none());
        assert_eq!(errors.report_count(), 0);
    }

    #[test]
    fn test_dropped_column_family() {
        let (set, storage, errors) = setup();
        let factory = TtlCompactionFilterFactory::new(
            "default",
            OriginalFilter::Filter(Arc::new(RemoveAll)),
            set,
            errors.clone(),
            &BlobDbOptions::default(),
        );

        let filter = factory.create_compaction_filter(&context());
        assert!(filter.is_some());

        drop(filter);
        drop(storage);
        assert!(factory.create_compaction_filter(&context()).is_none());
        assert!(matches!(
            *errors.bg_error().unwrap(),
            VaultError::ColumnFamilyDropped(1)
        ));
    }

    #[test]
    fn test_filter_keeps_storage_alive() {
        let (set, storage, errors) = setup();
        let factory = TtlCompactionFilterFactory::new(
            "default",
            OriginalFilter::Filter(Arc::new(RemoveAll)),
            set.clone(),
            errors,
            &BlobDbOptions::default(),
        );

        let filter = factory.create_compaction_filter(&context()).unwrap();
        drop(storage);
        assert!(set.blob_storage(1).is_ok());

        drop(filter);
        assert!(set.blob_storage(1).is_err());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "no blob storage"))]
    fn test_unknown_column_family() {
        let (set, _storage, errors) = setup();
        let factory = TtlCompactionFilterFactory::new(
            "other",
            OriginalFilter::Filter(Arc::new(RemoveAll)),
            set,
            errors,
            &BlobDbOptions::default(),
        );

        let context = FilterContext {
            column_family_id: 42,
            ..Default::default()
        };
        assert!(factory.create_compaction_filter(&context).is_none());
    }
}
