//! Compaction filtering
//!
//! A [`CompactionFilter`] is user logic consulted for every entry a
//! compaction visits. [`TtlCompactionFilter`] wraps such a filter, resolving
//! blob indexes and enforcing TTL expiration before (or instead of)
//! delegating to it. [`TtlCompactionFilterFactory`] builds one per job.

mod factory;
mod ttl_filter;

pub use factory::{OriginalFilter, TtlCompactionFilterFactory};
pub use ttl_filter::TtlCompactionFilter;

use crate::{Decision, SequenceNumber, ValueType};
use std::ops::Deref;
use std::sync::Arc;

/// Information about the compaction job a filter is created for
#[derive(Debug, Clone, Default)]
pub struct FilterContext {
    /// Column family being compacted
    pub column_family_id: u32,
    /// Whether the job covers every file of the column family
    pub is_full_compaction: bool,
    /// Whether the job was requested manually
    pub is_manual_compaction: bool,
}

/// User-supplied filtering logic
///
/// Instances may be shared by concurrent compaction jobs.
pub trait CompactionFilter: Send + Sync {
    /// Filter name, used in logs
    fn name(&self) -> &str;

    /// Decide the fate of a value entry. `value_type` is `Value` or
    /// `BlobIndex`; merge operands go to [`Self::filter_merge_operand`].
    fn filter(
        &self,
        level: u32,
        key: &[u8],
        sequence: SequenceNumber,
        value_type: ValueType,
        value: &[u8],
    ) -> Decision;

    /// Whether a merge operand should be removed. Operands cannot be
    /// rewritten.
    fn filter_merge_operand(&self, _level: u32, _key: &[u8], _operand: &[u8]) -> bool {
        false
    }
}

/// Creates a user filter per compaction job
pub trait CompactionFilterFactory: Send + Sync {
    /// Factory name, used in logs
    fn name(&self) -> &str;

    /// Create a filter for the job described by `context`, or `None` to skip
    /// filtering for that job
    fn create_compaction_filter(&self, context: &FilterContext)
        -> Option<Box<dyn CompactionFilter>>;
}

/// The user filter a [`TtlCompactionFilter`] delegates to
pub enum WrappedFilter {
    /// Long-lived filter shared across jobs
    Shared(Arc<dyn CompactionFilter>),
    /// Filter created for, and dropped with, a single job
    Owned(Box<dyn CompactionFilter>),
}

impl Deref for WrappedFilter {
    type Target = dyn CompactionFilter;

    fn deref(&self) -> &Self::Target {
        match self {
            WrappedFilter::Shared(filter) => filter.as_ref(),
            WrappedFilter::Owned(filter) => filter.as_ref(),
        }
    }
}

impl std::fmt::Debug for WrappedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            WrappedFilter::Shared(_) => "Shared",
            WrappedFilter::Owned(_) => "Owned",
        };
        f.debug_tuple(kind).field(&self.name()).finish()
    }
}
