//! Blob index: the indirection record stored in place of a separated value

use crate::coding::{get_varint64, put_varint64, varint_length};
use crate::ttl::parse_trailing_timestamp;
use crate::{Result, VaultError};
use bytes::BufMut;

/// Leading tag of an encoded blob index
pub const BLOB_RECORD_TAG: u8 = 0x01;

/// Location and expiration of a value stored in a blob file
///
/// Format:
/// - 1 byte: tag (`BLOB_RECORD_TAG`)
/// - varint64: blob file number
/// - varint64: record offset in the file
/// - varint64: record size
/// - varint64: expiration (seconds since epoch, 0 = none)
///
/// Anything after the encoded index is not part of it. Writers may append a
/// TTL trailer there to re-stamp the entry without rewriting the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlobIndex {
    pub file_number: u64,
    pub offset: u64,
    pub size: u64,
    pub expiration: u64,
}

impl BlobIndex {
    /// Create a blob index without expiration
    pub fn new(file_number: u64, offset: u64, size: u64) -> Self {
        Self {
            file_number,
            offset,
            size,
            expiration: 0,
        }
    }

    /// Set the embedded expiration
    pub fn with_expiration(mut self, expiration: u64) -> Self {
        self.expiration = expiration;
        self
    }

    /// Encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        1 + varint_length(self.file_number)
            + varint_length(self.offset)
            + varint_length(self.size)
            + varint_length(self.expiration)
    }

    /// Append the encoded index to `dst`
    pub fn encode_to<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(BLOB_RECORD_TAG);
        put_varint64(dst, self.file_number);
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
        put_varint64(dst, self.expiration);
    }

    /// Encode into a new buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut buf);
        buf
    }

    /// Decode an index from the front of `input`, advancing it past the
    /// consumed bytes. On error `input` is left where decoding stopped.
    pub fn decode_from(input: &mut &[u8]) -> Result<Self> {
        let (&tag, rest) = input
            .split_first()
            .ok_or_else(|| VaultError::InvalidFormat("Empty blob index".into()))?;
        if tag != BLOB_RECORD_TAG {
            return Err(VaultError::InvalidFormat(format!(
                "Unexpected blob index tag: {:#x}",
                tag
            )));
        }
        *input = rest;

        let mut field = |name: &str| {
            get_varint64(input).ok_or_else(|| {
                VaultError::InvalidFormat(format!("Blob index truncated at {}", name))
            })
        };

        Ok(Self {
            file_number: field("file number")?,
            offset: field("offset")?,
            size: field("size")?,
            expiration: field("expiration")?,
        })
    }

    /// Decode an index, ignoring any bytes that follow it
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut input = payload;
        Self::decode_from(&mut input)
    }

    /// Decode an index and the TTL trailer appended after it.
    ///
    /// The trailer is read from the bytes following the index; when fewer
    /// than 8 bytes follow, no trailer is present and it reads as 0.
    pub fn decode_with_trailer(payload: &[u8]) -> Result<(Self, u64)> {
        let mut input = payload;
        let index = Self::decode_from(&mut input)?;
        Ok((index, parse_trailing_timestamp(input)))
    }

    /// Expiration honoring both the embedded field and an appended trailer.
    /// The later of the two wins.
    pub fn effective_expiration(&self, trailer: u64) -> u64 {
        self.expiration.max(trailer)
    }
}
