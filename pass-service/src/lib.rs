//! # Device Pass Service
//!
//! This service provides:
//! - A device registry with soul-bound (non-transferable) ownership
//! - Time-boxed viewer access passes with an O(1) access index
//! - An append-only event log of every state change
//! - A REST API over all of the above
//!
//! ## Architecture
//!
//! The [`ledger::Ledger`] owns all state behind one lock. The
//! [`registry::DeviceRegistry`] and [`access::AccessPassManager`] share it and
//! apply each operation as a single serialised state transition. Time comes
//! from an injected [`clock::Clock`].

pub mod access;
pub mod api;
pub mod clock;
pub mod ledger;
pub mod registry;
pub mod seed;
pub mod snapshot;

use std::sync::Arc;
use tracing::error;

use shared::{config::ServiceConfig, error::LedgerResult};

use crate::clock::Clock;
use crate::ledger::Ledger;

/// Application state shared across handlers
pub struct AppState {
    /// Configuration
    pub config: ServiceConfig,
    /// Ledger store
    pub ledger: Arc<Ledger>,
    /// Device registry
    pub registry: registry::DeviceRegistry,
    /// Access pass manager
    pub passes: access::AccessPassManager,
    /// Snapshot persistence, when enabled
    pub snapshots: Option<snapshot::SnapshotStore>,
}

impl AppState {
    /// Wire the components over one ledger and clock
    pub fn new(
        config: ServiceConfig,
        ledger: Arc<Ledger>,
        clock: Arc<dyn Clock>,
        snapshots: Option<snapshot::SnapshotStore>,
    ) -> Self {
        let registry = registry::DeviceRegistry::new(
            Arc::clone(&ledger),
            Arc::clone(&clock),
            config.ledger.id_mode,
        );
        let passes = access::AccessPassManager::new(Arc::clone(&ledger), clock);

        Self {
            config,
            ledger,
            registry,
            passes,
            snapshots,
        }
    }

    /// Write the current ledger to the snapshot store, if one is configured
    pub async fn persist(&self) -> LedgerResult<()> {
        let Some(ref store) = self.snapshots else {
            return Ok(());
        };

        let snapshot = self.ledger.snapshot();
        store.save(&snapshot).await.map_err(|e| {
            error!(error = %e, path = ?store.path(), "Failed to persist ledger snapshot");
            e
        })
    }
}
