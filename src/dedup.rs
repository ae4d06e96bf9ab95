//! Retirement of processed devices.
//!
//! BlueZ suppresses repeat reports for a device it already knows, so every
//! handled device is removed from the adapter's table after its event has been
//! routed. Removal is best effort: a device that is already gone is an expected
//! race, and no removal failure ever reaches the caller.

use crate::scanner::{DevicePath, Discovery, DiscoveryError};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Counts from one retirement cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetireSummary {
    pub removed: usize,
    /// Handles the subsystem no longer knew about
    pub already_gone: usize,
    /// Handles whose removal failed for another reason
    pub failed: usize,
}

/// Set of device handles awaiting removal in the current cycle.
#[derive(Debug, Default)]
pub struct DedupTracker {
    pending: HashSet<DevicePath>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `path` for removal at the end of the cycle.
    pub fn track(&mut self, path: DevicePath) {
        self.pending.insert(path);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Queue `handles` and retire everything pending.
    pub async fn retire(
        &mut self,
        discovery: &dyn Discovery,
        handles: impl IntoIterator<Item = DevicePath>,
    ) -> RetireSummary {
        self.pending.extend(handles);
        self.retire_pending(discovery).await
    }

    /// Request removal of every pending handle. The pending set is empty afterwards;
    /// failed handles are not retried.
    pub async fn retire_pending(&mut self, discovery: &dyn Discovery) -> RetireSummary {
        let mut summary = RetireSummary::default();

        for path in self.pending.drain() {
            match discovery.remove_device(&path).await {
                Ok(()) => summary.removed += 1,
                Err(DiscoveryError::NotFound(_)) => {
                    debug!(%path, "device already removed");
                    summary.already_gone += 1;
                }
                Err(e) => {
                    warn!(%path, error = %e, "failed to remove device");
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}
