//! Storage engine - hosts column families, their blob storage and the
//! background error slot

mod engine;
mod error_channel;

pub use engine::{ColumnFamily, EngineStats, StorageEngine};
pub use error_channel::ErrorChannel;

use crate::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Blob separation and compaction filter options of a column family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobDbOptions {
    /// Values at least this large are stored in blob files
    pub min_blob_size: u64,
    /// Show the wrapped compaction filter empty values only
    pub skip_value_in_compaction_filter: bool,
    /// Expire blob index entries by TTL during compaction
    pub enable_ttl: bool,
}

impl Default for BlobDbOptions {
    fn default() -> Self {
        Self {
            min_blob_size: crate::config::DEFAULT_MIN_BLOB_SIZE,
            skip_value_in_compaction_filter: false,
            enable_ttl: false,
        }
    }
}

impl BlobDbOptions {
    /// Check the options for consistency
    pub fn validate(&self) -> Result<()> {
        if self.min_blob_size == 0 {
            return Err(VaultError::Config("min_blob_size must be positive".into()));
        }
        Ok(())
    }

    /// Whether a value of `len` bytes goes to a blob file
    pub fn is_blob(&self, len: usize) -> bool {
        len as u64 >= self.min_blob_size
    }
}

/// Storage engine configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Data directory
    pub data_dir: PathBuf,
    /// Options applied to column families created without explicit options
    pub blob: BlobDbOptions,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            blob: BlobDbOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = BlobDbOptions::default();
        assert!(options.validate().is_ok());
        assert!(!options.enable_ttl);
        assert!(!options.skip_value_in_compaction_filter);
        assert!(options.is_blob(4096));
        assert!(!options.is_blob(4095));
    }

    #[test]
    fn test_options_validation() {
        let options = BlobDbOptions {
            min_blob_size: 0,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_options_from_json() {
        let options: BlobDbOptions = serde_json::from_str(r#"{"enable_ttl": true}"#).unwrap();
        assert!(options.enable_ttl);
        assert_eq!(options.min_blob_size, crate::config::DEFAULT_MIN_BLOB_SIZE);

        let json = serde_json::to_string(&options).unwrap();
        let parsed: BlobDbOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, options);
    }
}
