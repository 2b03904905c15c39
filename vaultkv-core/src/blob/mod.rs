//! Blob storage for separated values
//!
//! Values above `min_blob_size` are written to append-only blob files and the
//! primary index keeps a [`BlobIndex`] in their place. This module provides:
//! - The blob index codec
//! - The blob record format with CRC32 protection
//! - A file-backed [`BlobStorage`] and the writer producing its files
//! - The per-column-family registry of storage handles

mod file;
mod file_set;
mod index;
mod record;

pub use file::{blob_file_path, BlobFileMeta, BlobFileStorage, BlobFileWriter};
pub use file_set::BlobFileSet;
pub use index::{BlobIndex, BLOB_RECORD_TAG};
pub use record::BlobRecord;

use crate::Result;

/// Options for reading blob records
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Verify the record checksum on read
    pub verify_checksums: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
        }
    }
}

/// Read access to the blob files of one column family.
///
/// Implementations report a record that cannot be located or fails
/// verification as a corruption error (see [`crate::VaultError::is_corruption`]);
/// callers treat that as "value unavailable" since the file may have been
/// reclaimed concurrently. Any other error is a real failure.
pub trait BlobStorage: Send + Sync {
    /// Fetch the record `index` points at. The record borrows from `buffer`,
    /// which callers may reuse across calls.
    fn get<'b>(
        &self,
        options: &ReadOptions,
        index: &BlobIndex,
        buffer: &'b mut Vec<u8>,
    ) -> Result<BlobRecord<'b>>;
}
