//! Background error slot shared by compaction jobs

use crate::{Result, VaultError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Engine-wide background error slot.
///
/// Compaction filters cannot fail an entry, so they report problems here
/// and keep going. The first reported error is retained until cleared; the
/// compaction job checks the slot when it finishes.
#[derive(Debug, Default)]
pub struct ErrorChannel {
    slot: Mutex<Option<Arc<VaultError>>>,
    reports: AtomicU64,
}

impl ErrorChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a background error
    pub fn report(&self, err: VaultError) {
        debug!("Background error reported: {}", err);
        self.reports.fetch_add(1, Ordering::Relaxed);

        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(Arc::new(err));
        }
    }

    /// The retained background error, if any
    pub fn bg_error(&self) -> Option<Arc<VaultError>> {
        self.slot.lock().clone()
    }

    /// Fail with the retained background error, if any
    pub fn check(&self) -> Result<()> {
        match self.bg_error() {
            Some(err) => Err(VaultError::Background(err)),
            None => Ok(()),
        }
    }

    /// Total number of reports since creation
    pub fn report_count(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    /// Clear the retained error, returning it
    pub fn clear(&self) -> Option<Arc<VaultError>> {
        self.slot.lock().take()
    }
}
