//! TTL trailer codec
//!
//! A TTL payload carries its absolute expiration time, in seconds since the
//! Unix epoch, as the final 8 bytes in big-endian order. An expiration of 0
//! means the payload never expires.
//!
//! Decoding never fails: a payload too short to hold a trailer is treated as
//! having no expiration.

use crate::config::TTL_TRAILER_SIZE;
use crate::{Result, VaultError};
use bytes::BufMut;
use chrono::Utc;

/// Expiration value meaning "never expires"
pub const NO_EXPIRATION: u64 = 0;

/// Encode a timestamp as 8 big-endian bytes
pub fn encode_timestamp(timestamp: u64) -> [u8; TTL_TRAILER_SIZE] {
    timestamp.to_be_bytes()
}

/// Decode the first 8 bytes of `bytes` as a big-endian timestamp.
///
/// Returns 0 when fewer than 8 bytes are available.
pub fn decode_timestamp(bytes: &[u8]) -> u64 {
    match bytes.get(..TTL_TRAILER_SIZE) {
        Some(head) => {
            let mut buf = [0u8; TTL_TRAILER_SIZE];
            buf.copy_from_slice(head);
            u64::from_be_bytes(buf)
        }
        None => NO_EXPIRATION,
    }
}

/// Parse the expiration stored in the last 8 bytes of `payload`
pub fn parse_trailing_timestamp(payload: &[u8]) -> u64 {
    if payload.len() < TTL_TRAILER_SIZE {
        return NO_EXPIRATION;
    }
    decode_timestamp(&payload[payload.len() - TTL_TRAILER_SIZE..])
}

/// Append an expiration trailer to `dst`
pub fn append_timestamp<B: BufMut>(dst: &mut B, timestamp: u64) {
    dst.put_u64(timestamp);
}

/// Copy `value` and append an expiration trailer
pub fn with_ttl(value: &[u8], expire_at: u64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(value.len() + TTL_TRAILER_SIZE);
    payload.extend_from_slice(value);
    append_timestamp(&mut payload, expire_at);
    payload
}

/// Current wall-clock time in seconds since the Unix epoch
pub fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Whether `expiration` lies strictly before `now`. Zero never expires.
pub fn is_expired(expiration: u64, now: u64) -> bool {
    expiration != NO_EXPIRATION && expiration < now
}

/// Parse a hex string (either case) back into bytes
pub fn from_hex(input: &str) -> Result<Vec<u8>> {
    hex::decode(input.trim())
        .map_err(|e| VaultError::InvalidFormat(format!("Invalid hex payload: {}", e)))
}
