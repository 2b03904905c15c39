//! Error types for VaultKV

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for VaultKV operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// VaultKV error types
#[derive(Error, Debug)]
pub enum VaultError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Operation not supported
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Column family was dropped while still referenced
    #[error("Column family {0} has been dropped")]
    ColumnFamilyDropped(u32),

    /// Compaction error
    #[error("Compaction error: {0}")]
    Compaction(String),

    /// Error recorded by a background job
    #[error("Background error: {0}")]
    Background(Arc<VaultError>),
}

impl VaultError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::Io(_))
    }

    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            VaultError::Corruption(_) | VaultError::ChecksumMismatch { .. }
        )
    }

    /// Check if error is an unsupported-operation report
    pub fn is_not_supported(&self) -> bool {
        matches!(self, VaultError::NotSupported(_))
    }
}
