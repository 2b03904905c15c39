//! VaultKV Core - TTL-aware compaction filtering for blob-separated LSM storage
//!
//! Large values live in blob files; the primary index only keeps a small
//! [`BlobIndex`](blob::BlobIndex) pointing at them. During compaction every
//! entry passes through a [`TtlCompactionFilter`](filter::TtlCompactionFilter)
//! which decides whether it survives.
//!
//! # Architecture
//!
//! - **TTL codec**: 8-byte big-endian expiration trailer appended to payloads
//! - **Blob**: indirection record codec, blob file writer and storage
//! - **Filter**: the TTL decision engine and its per-job factory
//! - **Storage**: host engine owning column families and the background error slot
//! - **Compaction**: applies a filter to a sorted run of entries

pub mod blob;
pub mod coding;
pub mod compaction;
pub mod filter;
pub mod storage;
pub mod ttl;

mod error;
mod types;

pub use error::{Result, VaultError};
pub use types::*;

/// VaultKV version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Size of the expiration trailer appended to TTL payloads
    pub const TTL_TRAILER_SIZE: usize = 8;

    /// Values at least this large are separated into blob files (4KB)
    pub const DEFAULT_MIN_BLOB_SIZE: u64 = 4 * 1024;

    /// File extension for blob files
    pub const BLOB_FILE_EXTENSION: &str = "blob";
}
