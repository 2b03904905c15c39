//! Blob record format

use crate::coding::{get_length_prefixed_slice, put_length_prefixed_slice, varint_length};
use crate::{Result, VaultError};
use bytes::{Buf, BufMut};

/// Size of the checksum header
const HEADER_SIZE: usize = 4;

/// A key/value pair stored in a blob file
///
/// Format:
/// - 4 bytes: CRC32 of the body (little-endian)
/// - varint64 + N bytes: key
/// - varint64 + N bytes: value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRecord<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> BlobRecord<'a> {
    /// Create a record
    pub fn new(key: &'a [u8], value: &'a [u8]) -> Self {
        Self { key, value }
    }

    /// Encoded length in bytes, header included
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE
            + varint_length(self.key.len() as u64)
            + self.key.len()
            + varint_length(self.value.len() as u64)
            + self.value.len()
    }

    /// Append the encoded record to `dst`
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        let start = dst.len();
        dst.put_u32_le(0);
        put_length_prefixed_slice(dst, self.key);
        put_length_prefixed_slice(dst, self.value);

        let checksum = crc32fast::hash(&dst[start + HEADER_SIZE..]);
        dst[start..start + HEADER_SIZE].copy_from_slice(&checksum.to_le_bytes());
    }

    /// Decode a record occupying exactly `data`
    pub fn decode(data: &'a [u8], verify_checksum: bool) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(VaultError::Corruption(format!(
                "Blob record too short: {} bytes",
                data.len()
            )));
        }

        let mut header = &data[..HEADER_SIZE];
        let expected = header.get_u32_le();
        let body = &data[HEADER_SIZE..];

        if verify_checksum {
            let actual = crc32fast::hash(body);
            if expected != actual {
                return Err(VaultError::ChecksumMismatch { expected, actual });
            }
        }

        let mut input = body;
        let key = get_length_prefixed_slice(&mut input)
            .ok_or_else(|| VaultError::Corruption("Blob record key truncated".into()))?;
        let value = get_length_prefixed_slice(&mut input)
            .ok_or_else(|| VaultError::Corruption("Blob record value truncated".into()))?;
        if !input.is_empty() {
            return Err(VaultError::Corruption(format!(
                "Blob record has {} trailing bytes",
                input.len()
            )));
        }

        Ok(Self { key, value })
    }
}
