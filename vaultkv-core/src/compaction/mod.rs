//! Compaction of a sorted run of entries through a compaction filter

use crate::blob::BlobIndex;
use crate::filter::TtlCompactionFilter;
use crate::storage::ErrorChannel;
use crate::{internal_key, Decision, Result, SequenceNumber, ValueType, VaultError};
use std::sync::Arc;
use tracing::{debug, info};

/// One entry of a compaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionEntry {
    pub user_key: Vec<u8>,
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
    pub value: Vec<u8>,
}

impl CompactionEntry {
    pub fn new(
        user_key: Vec<u8>,
        sequence: SequenceNumber,
        value_type: ValueType,
        value: Vec<u8>,
    ) -> Self {
        Self {
            user_key,
            sequence,
            value_type,
            value,
        }
    }

    /// An inline value
    pub fn value(user_key: Vec<u8>, sequence: SequenceNumber, value: Vec<u8>) -> Self {
        Self::new(user_key, sequence, ValueType::Value, value)
    }

    /// A merge operand
    pub fn merge(user_key: Vec<u8>, sequence: SequenceNumber, operand: Vec<u8>) -> Self {
        Self::new(user_key, sequence, ValueType::MergeOperand, operand)
    }

    /// A reference to a value stored in a blob file
    pub fn blob(user_key: Vec<u8>, sequence: SequenceNumber, index: &BlobIndex) -> Self {
        Self::new(user_key, sequence, ValueType::BlobIndex, index.encode())
    }
}

/// Counters of a finished compaction job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub input_entries: u64,
    pub kept: u64,
    pub removed: u64,
    pub changed: u64,
}

/// Result of a compaction job
#[derive(Debug, Clone)]
pub struct CompactionOutput {
    pub level: u32,
    pub entries: Vec<CompactionEntry>,
    pub stats: CompactionStats,
}

/// A single compaction job.
///
/// Input must be ordered by user key ascending and, within a key, by
/// sequence number descending.
pub struct CompactionJob {
    level: u32,
    filter: Option<TtlCompactionFilter>,
    errors: Arc<ErrorChannel>,
}

impl CompactionJob {
    /// Create a job; without a filter every entry is kept
    pub fn new(level: u32, filter: Option<TtlCompactionFilter>, errors: Arc<ErrorChannel>) -> Self {
        Self {
            level,
            filter,
            errors,
        }
    }

    /// Filter the entries and collect the survivors.
    ///
    /// Fails if the input is out of order or if a background error was
    /// reported while the job ran.
    pub fn run(mut self, entries: Vec<CompactionEntry>) -> Result<CompactionOutput> {
        check_order(&entries)?;

        let mut stats = CompactionStats {
            input_entries: entries.len() as u64,
            ..Default::default()
        };
        let mut output = Vec::with_capacity(entries.len());
        let mut key_buf = Vec::new();

        for mut entry in entries {
            let decision = match self.filter.as_mut() {
                Some(filter) => {
                    let key: &[u8] = if entry.value_type == ValueType::BlobIndex {
                        key_buf = internal_key(&entry.user_key, entry.sequence, entry.value_type);
                        &key_buf
                    } else {
                        &entry.user_key
                    };
                    filter.decide(
                        self.level,
                        key,
                        entry.sequence,
                        entry.value_type,
                        &entry.value,
                    )
                }
                None => Decision::Keep,
            };

            match decision {
                Decision::Keep => {
                    stats.kept += 1;
                    output.push(entry);
                }
                Decision::Remove => {
                    debug!(
                        "Compaction dropped {} entry at seq {}",
                        entry.value_type, entry.sequence
                    );
                    stats.removed += 1;
                }
                Decision::ChangeValue(value) => {
                    stats.changed += 1;
                    entry.value = value;
                    output.push(entry);
                }
            }
        }

        self.errors.check()?;

        info!(
            "Compaction at L{} done: {} in, {} kept, {} removed, {} changed",
            self.level, stats.input_entries, stats.kept, stats.removed, stats.changed
        );

        Ok(CompactionOutput {
            level: self.level,
            entries: output,
            stats,
        })
    }
}

fn check_order(entries: &[CompactionEntry]) -> Result<()> {
    for pair in entries.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let ordered = match prev.user_key.cmp(&next.user_key) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => prev.sequence > next.sequence,
            std::cmp::Ordering::Greater => false,
        };
        if !ordered {
            return Err(VaultError::Compaction(format!(
                "Entries out of order at seq {} -> {}",
                prev.sequence, next.sequence
            )));
        }
    }
    Ok(())
}
