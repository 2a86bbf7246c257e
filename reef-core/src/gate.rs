//! Gate primitive for background services.
//!
//! A gate admits new operations until it is closed. Closing waits for every
//! operation that already entered to finish, so a closed gate guarantees that
//! no guarded work is still in flight.

use crate::{ReefError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<GateInner>,
}

#[derive(Default)]
struct GateInner {
    entered: AtomicU64,
    closed: AtomicBool,
    drained: Notify,
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the gate. The returned guard keeps the gate open until dropped.
    ///
    /// # Errors
    /// Returns [`ReefError::GateClosed`] once `close()` has begun.
    pub fn enter(&self) -> Result<GateGuard> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ReefError::GateClosed);
        }
        self.inner.entered.fetch_add(1, Ordering::AcqRel);
        // close() may have started between the check and the increment
        if self.inner.closed.load(Ordering::Acquire) {
            if self.inner.entered.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.inner.drained.notify_waiters();
            }
            return Err(ReefError::GateClosed);
        }
        Ok(GateGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn entered(&self) -> u64 {
        self.inner.entered.load(Ordering::Acquire)
    }

    /// Close the gate and wait until every outstanding guard has dropped.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        loop {
            if self.inner.entered.load(Ordering::Acquire) == 0 {
                return;
            }
            let drained = self.inner.drained.notified();
            if self.inner.entered.load(Ordering::Acquire) == 0 {
                return;
            }
            drained.await;
        }
    }
}

pub struct GateGuard {
    inner: Arc<GateInner>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        if self.inner.entered.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_enter_and_close_empty() {
        let gate = Gate::new();
        assert!(!gate.is_closed());
        gate.close().await;
        assert!(gate.is_closed());
        assert!(gate.enter().is_err());
    }

    #[tokio::test]
    async fn test_close_waits_for_guards() {
        let gate = Gate::new();
        let guard = gate.enter().unwrap();
        assert_eq!(gate.entered(), 1);

        let closer = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.close().await })
        };

        // The close must not resolve while the guard is alive.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closer.is_finished());

        drop(guard);
        closer.await.unwrap();
        assert_eq!(gate.entered(), 0);
    }

    #[tokio::test]
    async fn test_enter_after_close_fails() {
        let gate = Gate::new();
        gate.close().await;
        assert!(matches!(gate.enter(), Err(ReefError::GateClosed)));
    }
}
