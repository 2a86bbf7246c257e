//! Shard-wide resource control for the hint subsystem.
//!
//! Owns the shard-manager registry and the space watchdog, and bounds the
//! memory pinned by in-flight hint sends with a semaphore: each send charges
//! roughly the serialized size of its mutation, clamped between a minimum
//! per-hint budget and the whole shard budget so one oversized hint can still
//! go out alone.

use crate::manager::ShardManager;
use crate::watchdog::{SpaceWatchdog, SpaceWatchdogConfig};
use reef_core::{ReefError, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Limits for the hint subsystem of one shard.
#[derive(Debug, Clone)]
pub struct ResourceManagerConfig {
    /// Ceiling on memory pinned by concurrent hint sends.
    pub max_send_in_flight_memory: u64,
    /// Floor for the per-send memory charge.
    pub min_send_hint_budget: u64,
    pub watchdog: SpaceWatchdogConfig,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            max_send_in_flight_memory: 10 * 1024 * 1024,
            min_send_hint_budget: 10 * 1024,
            watchdog: SpaceWatchdogConfig::default(),
        }
    }
}

/// Registry plus lifecycle for the watchdog and the send limiter.
///
/// Shard managers must be registered before `start()`.
pub struct ResourceManager {
    config: ResourceManagerConfig,
    send_limiter: Arc<Semaphore>,
    shard_managers: Vec<Arc<dyn ShardManager>>,
    watchdog: Option<SpaceWatchdog>,
}

impl ResourceManager {
    #[must_use]
    pub fn new(config: ResourceManagerConfig) -> Self {
        let permits = usize::try_from(config.max_send_in_flight_memory)
            .unwrap_or(usize::MAX)
            .min(Semaphore::MAX_PERMITS);
        Self {
            send_limiter: Arc::new(Semaphore::new(permits)),
            config,
            shard_managers: Vec::new(),
            watchdog: None,
        }
    }

    /// Register a shard manager with the watchdog registry.
    ///
    /// # Errors
    /// Fails after `start()`; the watchdog iterates the registry without
    /// locking and must see a frozen set.
    pub fn register_manager(&mut self, manager: Arc<dyn ShardManager>) -> Result<()> {
        if self.watchdog.is_some() {
            return Err(ReefError::Config(
                "shard managers must be registered before start".into(),
            ));
        }
        self.shard_managers.push(manager);
        Ok(())
    }

    /// Start the space watchdog over the registered managers.
    ///
    /// # Errors
    /// Fails if already started.
    pub fn start(&mut self) -> Result<()> {
        if self.watchdog.is_some() {
            return Err(ReefError::Config("resource manager already started".into()));
        }
        let mut watchdog = SpaceWatchdog::new(
            self.config.watchdog.clone(),
            self.shard_managers.clone(),
        );
        watchdog.start()?;
        self.watchdog = Some(watchdog);
        Ok(())
    }

    /// Stop the watchdog and fail all future send-unit acquisitions.
    pub async fn stop(&mut self) {
        if let Some(mut watchdog) = self.watchdog.take() {
            watchdog.stop().await;
        }
        self.send_limiter.close();
    }

    /// Acquire memory units for sending one hint of `buf_size` serialized
    /// bytes. The charge approximates the mutation's memory footprint by its
    /// serialized size, clamped to `[min_send_hint_budget,
    /// max_send_in_flight_memory]`. The permit releases on drop.
    ///
    /// # Errors
    /// Fails with [`ReefError::GateClosed`] once the manager is stopped.
    pub async fn get_send_units_for(&self, buf_size: u64) -> Result<OwnedSemaphorePermit> {
        let budget = buf_size
            .max(self.config.min_send_hint_budget)
            .min(self.config.max_send_in_flight_memory);
        trace!(
            target: "reef::hints",
            budget,
            available = self.send_limiter.available_permits(),
            "acquiring send units"
        );
        let units = u32::try_from(budget).unwrap_or(u32::MAX);
        Arc::clone(&self.send_limiter)
            .acquire_many_owned(units)
            .await
            .map_err(|_| ReefError::GateClosed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::manager::HintsShardManager;
    use std::path::PathBuf;

    fn test_config() -> ResourceManagerConfig {
        ResourceManagerConfig {
            max_send_in_flight_memory: 100,
            min_send_hint_budget: 10,
            watchdog: SpaceWatchdogConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_send_units_clamped_to_minimum() {
        let manager = ResourceManager::new(test_config());
        let before = manager.send_limiter.available_permits();
        let permit = manager.get_send_units_for(3).await.unwrap();
        assert_eq!(before - manager.send_limiter.available_permits(), 10);
        drop(permit);
        assert_eq!(manager.send_limiter.available_permits(), before);
    }

    #[tokio::test]
    async fn test_send_units_clamped_to_shard_budget() {
        let manager = ResourceManager::new(test_config());
        let permit = manager.get_send_units_for(1_000_000).await.unwrap();
        assert_eq!(manager.send_limiter.available_permits(), 0);
        drop(permit);
    }

    #[tokio::test]
    async fn test_register_after_start_rejected() {
        let mut manager = ResourceManager::new(test_config());
        let shard: Arc<dyn ShardManager> =
            Arc::new(HintsShardManager::new(PathBuf::from("/nonexistent")));
        manager.register_manager(Arc::clone(&shard)).unwrap();
        manager.start().unwrap();
        assert!(manager.register_manager(shard).is_err());
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_stop_fails_pending_acquisitions() {
        let mut manager = ResourceManager::new(test_config());
        manager.stop().await;
        assert!(matches!(
            manager.get_send_units_for(1).await,
            Err(ReefError::GateClosed)
        ));
    }
}
