//! TTL-aware compaction filter over blob-separated values

use super::WrappedFilter;
use crate::blob::{BlobIndex, BlobStorage, ReadOptions};
use crate::storage::ErrorChannel;
use crate::ttl;
use crate::{Decision, ParsedInternalKey, SequenceNumber, ValueType, VaultError};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Compaction filter for one compaction job of a blob-separated column family.
///
/// Behavior by record kind:
/// - Merge operands skip TTL handling and go to the wrapped filter's
///   merge-operand path.
/// - Inline values are handed to the wrapped filter as they are.
/// - Blob indexes either expire by TTL (`enable_ttl`), in which case the
///   wrapped filter is never consulted, or are resolved through blob storage
///   so the wrapped filter sees the real value.
///
/// With `skip_value` the wrapped filter is always shown an empty value.
///
/// Failures never escape [`decide`](Self::decide): the entry is kept and the
/// error goes to the engine's [`ErrorChannel`], failing the job later.
pub struct TtlCompactionFilter {
    name: String,
    cf_name: String,
    errors: Arc<ErrorChannel>,
    blob_storage: Arc<dyn BlobStorage>,
    original: WrappedFilter,
    skip_value: bool,
    enable_ttl: bool,
    read_options: ReadOptions,
    buffer: Vec<u8>,
    clock: fn() -> u64,
}

impl TtlCompactionFilter {
    /// Create a filter bound to one column family's blob storage
    pub fn new(
        cf_name: impl Into<String>,
        errors: Arc<ErrorChannel>,
        blob_storage: Arc<dyn BlobStorage>,
        original: WrappedFilter,
        skip_value: bool,
        enable_ttl: bool,
    ) -> Self {
        let cf_name = cf_name.into();
        let name = format!("TtlCompactionFilter.{}", original.name());

        debug!(
            "[{}] Created {} (skip_value={}, enable_ttl={})",
            cf_name, name, skip_value, enable_ttl
        );

        Self {
            name,
            cf_name,
            errors,
            blob_storage,
            original,
            skip_value,
            enable_ttl,
            read_options: ReadOptions::default(),
            buffer: Vec::new(),
            clock: ttl::now_secs,
        }
    }

    /// Replace the wall clock used for expiration checks
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Filter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column family this filter serves
    pub fn column_family(&self) -> &str {
        &self.cf_name
    }

    /// Whether the wrapped filter is shown empty values
    pub fn skip_value(&self) -> bool {
        self.skip_value
    }

    /// Whether blob indexes expire by TTL
    pub fn enable_ttl(&self) -> bool {
        self.enable_ttl
    }

    /// Decide the fate of one compaction entry.
    ///
    /// For `BlobIndex` entries `key` is the internal key; the wrapped filter
    /// always receives the user key.
    pub fn decide(
        &mut self,
        level: u32,
        key: &[u8],
        sequence: SequenceNumber,
        value_type: ValueType,
        value: &[u8],
    ) -> Decision {
        trace!(
            "[{}] Filtering {} entry at level {}, seq {}",
            self.cf_name,
            value_type,
            level,
            sequence
        );

        let user_key = if value_type == ValueType::BlobIndex {
            match ParsedInternalKey::parse(key) {
                Ok(ikey) => ikey.user_key,
                Err(e) => {
                    error!(
                        "[{}] Unable to parse internal key {}: {}",
                        self.cf_name,
                        hex::encode_upper(key),
                        e
                    );
                    self.errors.report(e);
                    return Decision::Keep;
                }
            }
        } else {
            key
        };

        match value_type {
            ValueType::MergeOperand => {
                let operand = if self.skip_value { &[][..] } else { value };
                Decision::from_remove(self.original.filter_merge_operand(level, user_key, operand))
            }
            ValueType::Value => {
                let value = if self.skip_value { &[][..] } else { value };
                self.original.filter(level, user_key, sequence, value_type, value)
            }
            ValueType::BlobIndex if self.enable_ttl => self.expire_blob_index(value),
            ValueType::BlobIndex if self.skip_value => {
                self.original.filter(level, user_key, sequence, value_type, &[])
            }
            ValueType::BlobIndex => self.filter_blob_value(level, user_key, sequence, value),
        }
    }

    /// TTL is authoritative for blob indexes: expired entries are removed,
    /// everything else is kept.
    fn expire_blob_index(&self, value: &[u8]) -> Decision {
        let (index, trailer) = match BlobIndex::decode_with_trailer(value) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(
                    "[{}] Unable to decode blob index {}: {}",
                    self.cf_name,
                    hex::encode_upper(value),
                    e
                );
                self.errors.report(e);
                return Decision::Keep;
            }
        };

        let expiration = index.effective_expiration(trailer);
        let now = (self.clock)();

        if ttl::is_expired(expiration, now) {
            debug!(
                "[{}] Removing expired blob {}@{}: expiration {} < now {}",
                self.cf_name, index.file_number, index.offset, expiration, now
            );
            return Decision::Remove;
        }

        trace!(
            "[{}] Keeping blob {}@{}: embedded expiration {}, trailer {}",
            self.cf_name,
            index.file_number,
            index.offset,
            index.expiration,
            trailer
        );
        Decision::Keep
    }

    /// Resolve the blob index and let the wrapped filter judge the real value
    fn filter_blob_value(
        &mut self,
        level: u32,
        user_key: &[u8],
        sequence: SequenceNumber,
        value: &[u8],
    ) -> Decision {
        let index = match BlobIndex::decode(value) {
            Ok(index) => index,
            Err(e) => {
                error!(
                    "[{}] Unable to decode blob index {}: {}",
                    self.cf_name,
                    hex::encode_upper(value),
                    e
                );
                self.errors.report(e);
                return Decision::Keep;
            }
        };

        let decision = match self
            .blob_storage
            .get(&self.read_options, &index, &mut self.buffer)
        {
            Ok(record) => {
                self.original
                    .filter(level, user_key, sequence, ValueType::Value, record.value)
            }
            Err(e) if e.is_corruption() => {
                // Either the blob file was garbage collected under us or it is
                // really corrupt; there is no telling the two apart here.
                debug!(
                    "[{}] Blob {}@{} unavailable, keeping entry: {}",
                    self.cf_name, index.file_number, index.offset, e
                );
                return Decision::Keep;
            }
            Err(e) => {
                error!(
                    "[{}] Unable to read blob {}@{}: {}",
                    self.cf_name, index.file_number, index.offset, e
                );
                self.errors.report(e);
                return Decision::Keep;
            }
        };

        self.keep_blob_index_value(decision)
    }

    /// The entry stays a blob index on disk, so its value cannot be rewritten
    fn keep_blob_index_value(&self, decision: Decision) -> Decision {
        match decision {
            Decision::ChangeValue(_) => {
                error!(
                    "[{}] {} asked to change the value of a blob index entry",
                    self.cf_name,
                    self.original.name()
                );
                self.errors.report(VaultError::NotSupported(
                    "changing the value of an entry stored as a blob index".into(),
                ));
                Decision::Keep
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for TtlCompactionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCompactionFilter")
            .field("name", &self.name)
            .field("cf_name", &self.cf_name)
            .field("skip_value", &self.skip_value)
            .field("enable_ttl", &self.enable_ttl)
            .finish()
    }
}
