//! Per-shard hint managers as the space watchdog sees them.
//!
//! A shard manager owns one endpoint manager per peer it buffers hints for.
//! Hints for an endpoint live in their own sub-directory of the shard's
//! hints root:
//!
//! ```text
//! <hints root>/<shard>/<endpoint address>/<hint file>*
//! ```
//!
//! The watchdog only needs the narrow [`ShardManager`] surface; the full
//! write and replay paths live behind it.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;

/// The watchdog-facing surface of one shard's hint manager.
pub trait ShardManager: Send + Sync {
    /// Root directory holding one sub-directory per endpoint.
    fn hints_dir(&self) -> PathBuf;

    /// Number of endpoint managers currently registered.
    fn ep_managers_count(&self) -> usize;

    /// File-update exclusion primitive of the endpoint's manager, if one
    /// exists. Held by the watchdog while it scans the endpoint's directory
    /// so files are not rotated under the scan.
    fn file_update_mutex(&self, endpoint: &str) -> Option<Arc<AsyncMutex<()>>>;

    fn clear_eps_with_pending_hints(&self);

    fn add_ep_with_pending_hints(&self, endpoint: &str);

    /// Forbid new hints on endpoints with pending hints; allow the rest.
    fn forbid_hints_for_eps_with_pending_hints(&self);

    /// Allow new hints on every endpoint.
    fn allow_hints(&self);

    /// Forbid new hints on every endpoint.
    fn forbid_hints(&self);
}

/// One endpoint's hint state: whether new hints may be written, and the
/// exclusion primitive serializing file rotation against watchdog scans.
pub struct EndpointManager {
    allow_hints: AtomicBool,
    file_update_mutex: Arc<AsyncMutex<()>>,
}

impl EndpointManager {
    fn new() -> Self {
        Self {
            allow_hints: AtomicBool::new(true),
            file_update_mutex: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Whether the watchdog currently permits new hints for this endpoint.
    #[must_use]
    pub fn can_hint(&self) -> bool {
        self.allow_hints.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn file_update_mutex(&self) -> Arc<AsyncMutex<()>> {
        Arc::clone(&self.file_update_mutex)
    }

    fn set_allow(&self, allow: bool) {
        self.allow_hints.store(allow, Ordering::Release);
    }
}

/// In-memory shard manager implementation backing the watchdog.
pub struct HintsShardManager {
    hints_dir: PathBuf,
    endpoints: RwLock<HashMap<String, Arc<EndpointManager>>>,
    pending: Mutex<HashSet<String>>,
}

impl HintsShardManager {
    #[must_use]
    pub fn new(hints_dir: PathBuf) -> Self {
        Self {
            hints_dir,
            endpoints: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Register (or fetch) the manager for `endpoint`.
    pub fn add_endpoint(&self, endpoint: &str) -> Arc<EndpointManager> {
        let mut endpoints = lock_write(&self.endpoints);
        Arc::clone(
            endpoints
                .entry(endpoint.to_owned())
                .or_insert_with(|| Arc::new(EndpointManager::new())),
        )
    }

    #[must_use]
    pub fn endpoint(&self, endpoint: &str) -> Option<Arc<EndpointManager>> {
        lock_read(&self.endpoints).get(endpoint).cloned()
    }
}

impl ShardManager for HintsShardManager {
    fn hints_dir(&self) -> PathBuf {
        self.hints_dir.clone()
    }

    fn ep_managers_count(&self) -> usize {
        lock_read(&self.endpoints).len()
    }

    fn file_update_mutex(&self, endpoint: &str) -> Option<Arc<AsyncMutex<()>>> {
        lock_read(&self.endpoints)
            .get(endpoint)
            .map(|ep| ep.file_update_mutex())
    }

    fn clear_eps_with_pending_hints(&self) {
        lock_mutex(&self.pending).clear();
    }

    fn add_ep_with_pending_hints(&self, endpoint: &str) {
        lock_mutex(&self.pending).insert(endpoint.to_owned());
    }

    fn forbid_hints_for_eps_with_pending_hints(&self) {
        let pending = lock_mutex(&self.pending);
        for (name, ep) in lock_read(&self.endpoints).iter() {
            ep.set_allow(!pending.contains(name));
        }
    }

    fn allow_hints(&self) {
        for ep in lock_read(&self.endpoints).values() {
            ep.set_allow(true);
        }
    }

    fn forbid_hints(&self) {
        for ep in lock_read(&self.endpoints).values() {
            ep.set_allow(false);
        }
    }
}

fn lock_read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_mutex<T>(lock: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_verbs() {
        let manager = HintsShardManager::new(PathBuf::from("/tmp/hints"));
        let ep1 = manager.add_endpoint("10.0.0.1");
        let ep2 = manager.add_endpoint("10.0.0.2");
        assert_eq!(manager.ep_managers_count(), 2);
        assert!(ep1.can_hint() && ep2.can_hint());

        manager.add_ep_with_pending_hints("10.0.0.1");
        manager.forbid_hints_for_eps_with_pending_hints();
        assert!(!ep1.can_hint());
        assert!(ep2.can_hint());

        manager.clear_eps_with_pending_hints();
        manager.forbid_hints_for_eps_with_pending_hints();
        assert!(ep1.can_hint() && ep2.can_hint());

        manager.forbid_hints();
        assert!(!ep1.can_hint() && !ep2.can_hint());
        manager.allow_hints();
        assert!(ep1.can_hint() && ep2.can_hint());
    }

    #[test]
    fn test_add_endpoint_is_idempotent() {
        let manager = HintsShardManager::new(PathBuf::from("/tmp/hints"));
        let first = manager.add_endpoint("peer");
        let second = manager.add_endpoint("peer");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.ep_managers_count(), 1);
        assert!(manager.file_update_mutex("peer").is_some());
        assert!(manager.file_update_mutex("stranger").is_none());
    }
}
