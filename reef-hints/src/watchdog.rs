//! Space watchdog bounding the disk footprint of hint logs.
//!
//! Once per period the watchdog sums the size of every hint file under every
//! endpoint directory of every registered shard manager, then either allows
//! hinting everywhere or forbids it on the endpoints that already have hints
//! backed up. A scan failure forbids hinting everywhere until the next tick.
//!
//! Ticks never overlap: each tick runs under a gate, the next timer is armed
//! only after the tick completes, and `stop()` closes the gate so an in-flight
//! tick finishes before shutdown resolves.

use crate::manager::ShardManager;
use reef_core::{Gate, ReefError, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Disk-space policy for hint storage.
#[derive(Debug, Clone)]
pub struct SpaceWatchdogConfig {
    /// Upper bound for the total size of hint files on this shard.
    pub max_shard_disk_space: u64,
    /// Size of one hint segment; one segment per endpoint manager is
    /// reserved out of the quota.
    pub hint_segment_size: u64,
    /// Scan period. Each tick re-arms this long after it completes.
    pub period: Duration,
}

impl Default for SpaceWatchdogConfig {
    fn default() -> Self {
        Self {
            max_shard_disk_space: 10 * 1024 * 1024 * 1024,
            hint_segment_size: 32 * 1024 * 1024,
            period: Duration::from_secs(1),
        }
    }
}

/// Periodic scanner toggling the per-endpoint "may hint" flags.
pub struct SpaceWatchdog {
    config: SpaceWatchdogConfig,
    shard_managers: Arc<Vec<Arc<dyn ShardManager>>>,
    gate: Gate,
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl SpaceWatchdog {
    #[must_use]
    pub fn new(config: SpaceWatchdogConfig, shard_managers: Vec<Arc<dyn ShardManager>>) -> Self {
        Self {
            config,
            shard_managers: Arc::new(shard_managers),
            gate: Gate::new(),
            stop_tx: None,
            handle: None,
        }
    }

    /// Start the scan loop. The first tick runs immediately.
    ///
    /// # Errors
    /// Fails if the watchdog is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(ReefError::Config("space watchdog already started".into()));
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let gate = self.gate.clone();
        let config = self.config.clone();
        let managers = Arc::clone(&self.shard_managers);
        self.stop_tx = Some(stop_tx);
        self.handle = Some(tokio::spawn(async move {
            loop {
                match gate.enter() {
                    Ok(_tick_guard) => tick(&config, &managers).await,
                    Err(_) => break,
                }
                tokio::select! {
                    () = tokio::time::sleep(config.period) => {}
                    _ = stop_rx.changed() => break,
                }
            }
        }));
        Ok(())
    }

    /// Close the gate, let an in-flight tick finish, then cancel the timer.
    pub async fn stop(&mut self) {
        self.gate.close().await;
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// One watchdog tick over every registered shard manager.
pub(crate) async fn tick(config: &SpaceWatchdogConfig, managers: &[Arc<dyn ShardManager>]) {
    match scan_all(managers).await {
        Ok(total_size) => {
            let reserved = managers
                .iter()
                .map(|manager| manager.ep_managers_count() as u64)
                .sum::<u64>()
                * config.hint_segment_size;
            // one segment per endpoint manager stays reserved out of the quota
            let adjusted_quota = config.max_shard_disk_space.saturating_sub(reserved);
            let can_hint = total_size < adjusted_quota;
            trace!(
                target: "reef::watchdog",
                total_size,
                adjusted_quota,
                can_hint,
                "tick complete"
            );
            if can_hint {
                for manager in managers {
                    manager.allow_hints();
                }
            } else {
                for manager in managers {
                    manager.forbid_hints_for_eps_with_pending_hints();
                }
            }
        }
        Err(error) => {
            warn!(
                target: "reef::watchdog",
                error = %error,
                "hints directory scan failed, forbidding hints on all shards"
            );
            for manager in managers {
                manager.forbid_hints();
            }
        }
    }
}

/// Sum hint file sizes across all shards, flagging endpoints that have more
/// than one hint file pending.
async fn scan_all(managers: &[Arc<dyn ShardManager>]) -> Result<u64> {
    let mut total_size = 0u64;
    for manager in managers {
        manager.clear_eps_with_pending_hints();
        for entry in std::fs::read_dir(manager.hints_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let endpoint = entry.file_name().to_string_lossy().into_owned();
            // Take the endpoint's file-update lock when a manager exists so
            // files are not rotated mid-scan; an unmanaged directory has no
            // writer to race with.
            if let Some(mutex) = manager.file_update_mutex(&endpoint) {
                let _update_lock = mutex.lock().await;
                total_size += scan_one_ep_dir(&entry.path(), manager.as_ref(), &endpoint)?;
            } else {
                total_size += scan_one_ep_dir(&entry.path(), manager.as_ref(), &endpoint)?;
            }
        }
    }
    Ok(total_size)
}

fn scan_one_ep_dir(path: &Path, manager: &dyn ShardManager, endpoint: &str) -> Result<u64> {
    let mut files_count = 0u64;
    let mut size = 0u64;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        // the second hint file in a directory marks the endpoint as backed up
        if files_count == 1 {
            manager.add_ep_with_pending_hints(endpoint);
        }
        files_count += 1;
        size += entry.metadata()?.len();
    }
    Ok(size)
}
