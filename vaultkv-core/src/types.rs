//! Core types for VaultKV

use crate::{Result, VaultError};
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence number assigned to every write
pub type SequenceNumber = u64;

/// Largest sequence number that fits in an internal key trailer
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Size of the packed (sequence, type) trailer of an internal key
pub const INTERNAL_KEY_TRAILER_SIZE: usize = 8;

/// Kind of record stored under a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    /// Inline value
    Value = 0x1,
    /// Pending merge operand, not yet a final value
    MergeOperand = 0x2,
    /// Reference into a blob file
    BlobIndex = 0x11,
}

impl TryFrom<u8> for ValueType {
    type Error = VaultError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x1 => Ok(ValueType::Value),
            0x2 => Ok(ValueType::MergeOperand),
            0x11 => Ok(ValueType::BlobIndex),
            _ => Err(VaultError::InvalidFormat(format!(
                "Invalid value type: {:#x}",
                value
            ))),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Value => "value",
            ValueType::MergeOperand => "merge",
            ValueType::BlobIndex => "blob-index",
        };
        f.write_str(name)
    }
}

/// Outcome of filtering a single compaction entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Keep the entry unchanged
    Keep,
    /// Drop the entry from the compaction output
    Remove,
    /// Rewrite the entry with a new value
    ChangeValue(Vec<u8>),
}

impl Decision {
    /// Map a boolean "should remove" answer onto a decision
    pub fn from_remove(remove: bool) -> Self {
        if remove {
            Decision::Remove
        } else {
            Decision::Keep
        }
    }
}

/// A user key together with its sequence number and value type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    /// Parse an internal key: `user_key | fixed64_le(sequence << 8 | type)`
    pub fn parse(internal_key: &'a [u8]) -> Result<Self> {
        if internal_key.len() < INTERNAL_KEY_TRAILER_SIZE {
            return Err(VaultError::InvalidFormat(format!(
                "Internal key too short: {} bytes",
                internal_key.len()
            )));
        }

        let split = internal_key.len() - INTERNAL_KEY_TRAILER_SIZE;
        let (user_key, trailer) = internal_key.split_at(split);
        let mut packed = [0u8; INTERNAL_KEY_TRAILER_SIZE];
        packed.copy_from_slice(trailer);
        let packed = u64::from_le_bytes(packed);

        Ok(Self {
            user_key,
            sequence: packed >> 8,
            value_type: ValueType::try_from((packed & 0xff) as u8)?,
        })
    }
}

/// Append the internal key for `user_key` to `dst`
pub fn append_internal_key<B: BufMut>(
    dst: &mut B,
    user_key: &[u8],
    sequence: SequenceNumber,
    value_type: ValueType,
) {
    debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
    dst.put_slice(user_key);
    dst.put_u64_le((sequence << 8) | value_type as u64);
}

/// Build an owned internal key
pub fn internal_key(user_key: &[u8], sequence: SequenceNumber, value_type: ValueType) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_key.len() + INTERNAL_KEY_TRAILER_SIZE);
    append_internal_key(&mut key, user_key, sequence, value_type);
    key
}
