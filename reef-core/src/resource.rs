//! Memory accounting for transient buffers.
//!
//! Parsers hold short-lived key and value buffers while delivering events.
//! A [`MemoryTracker`] charges those bytes against a shared counter so the
//! reader layer can bound how much memory concurrent consumers pin at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cheaply cloneable accounting handle. All clones share one counter.
///
/// The default handle is untracked: charges and releases are no-ops.
#[derive(Clone, Debug, Default)]
pub struct MemoryTracker {
    consumed: Option<Arc<AtomicU64>>,
}

impl MemoryTracker {
    /// A tracker with a fresh counter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            consumed: Some(Arc::new(AtomicU64::new(0))),
        }
    }

    /// A no-op handle for consumers that do not bound their memory.
    #[must_use]
    pub fn untracked() -> Self {
        Self { consumed: None }
    }

    pub fn charge(&self, bytes: u64) {
        if let Some(consumed) = &self.consumed {
            consumed.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    pub fn release(&self, bytes: u64) {
        if let Some(consumed) = &self.consumed {
            consumed.fetch_sub(bytes, Ordering::Relaxed);
        }
    }

    /// Bytes currently charged across all clones of this handle.
    #[must_use]
    pub fn consumed_bytes(&self) -> u64 {
        self.consumed
            .as_ref()
            .map_or(0, |consumed| consumed.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_and_release() {
        let tracker = MemoryTracker::new();
        let clone = tracker.clone();
        tracker.charge(128);
        clone.charge(64);
        assert_eq!(tracker.consumed_bytes(), 192);
        clone.release(128);
        assert_eq!(clone.consumed_bytes(), 64);
        tracker.release(64);
        assert_eq!(tracker.consumed_bytes(), 0);
    }

    #[test]
    fn test_untracked_is_noop() {
        let tracker = MemoryTracker::untracked();
        tracker.charge(1024);
        assert_eq!(tracker.consumed_bytes(), 0);
    }
}
