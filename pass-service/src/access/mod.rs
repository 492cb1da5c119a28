//! # Access Pass Manager
//!
//! Grants, revokes and evaluates time-boxed viewer passes.
//!
//! ## Rules
//!
//! - Only the device owner grants or revokes.
//! - A grant appends a pass to the device history and overwrites the access
//!   index for (device, viewer): the last grant wins.
//! - A revoke removes the index entry and nothing else. Pass records are
//!   never mutated or deleted, so history always shows what was granted.
//! - `has_access` is true for the owner, otherwise iff the indexed expiry is
//!   still in the future.
//!
//! Expired and revoked are indistinguishable through `has_access`; they
//! differ only in whether an unexpired pass is still visible in history.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared::{
    constants::MAX_PASS_DURATION_SECS,
    error::{LedgerError, LedgerResult},
    types::{AccessPass, DeviceId, EventKind, Identity, PassView},
};

use crate::clock::Clock;
use crate::ledger::Ledger;
use crate::registry::ensure_owner;

/// Access Pass Manager over the shared ledger
pub struct AccessPassManager {
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
}

impl AccessPassManager {
    pub fn new(ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> Self {
        info!("Initializing access pass manager");
        Self { ledger, clock }
    }

    /// Grant `viewer` access to a device for `duration_secs`
    ///
    /// # Errors
    /// - `DeviceNotFound` for an unknown device
    /// - `Authorization` unless `caller` owns the device
    /// - `Validation` for the zero viewer, a self-grant, or a duration
    ///   outside `(0, 365 days]`
    ///
    /// Nothing is written when any check fails.
    pub fn grant(
        &self,
        device_id: &DeviceId,
        viewer: &Identity,
        duration_secs: u64,
        caller: &Identity,
    ) -> LedgerResult<AccessPass> {
        let mut state = self.ledger.write();
        let owner = state.require_device(device_id)?.owner.clone();
        ensure_owner(&owner, caller, device_id)?;

        if viewer.is_zero() {
            return Err(LedgerError::Validation("viewer must not be the zero identity".into()));
        }
        if viewer == caller {
            return Err(LedgerError::Validation("cannot grant a pass to yourself".into()));
        }
        if duration_secs == 0 || duration_secs > MAX_PASS_DURATION_SECS {
            warn!(device_id = %device_id, duration_secs, "Rejected pass duration");
            return Err(LedgerError::Validation(format!(
                "duration must be between 1 and {} seconds, got {}",
                MAX_PASS_DURATION_SECS, duration_secs
            )));
        }

        let granted_at = self.clock.now();
        // bounded by MAX_PASS_DURATION_SECS above
        let expires_at = granted_at + Duration::seconds(duration_secs as i64);

        let pass = AccessPass {
            pass_id: Uuid::new_v4(),
            device_id: device_id.clone(),
            viewer: viewer.clone(),
            granted_at,
            expires_at,
            is_active: true,
        };

        state.append_pass(pass.clone());
        state.set_expiry(device_id, viewer, expires_at);
        state.record(
            caller,
            device_id,
            granted_at,
            EventKind::AccessGranted {
                viewer: viewer.clone(),
                expires_at,
            },
        );

        info!(
            device_id = %device_id,
            viewer = %viewer,
            expires_at = %expires_at,
            "Access granted"
        );
        Ok(pass)
    }

    /// Revoke `viewer`'s access. Idempotent; history is kept.
    pub fn revoke(&self, device_id: &DeviceId, viewer: &Identity, caller: &Identity) -> LedgerResult<()> {
        let mut state = self.ledger.write();
        let owner = state.require_device(device_id)?.owner.clone();
        ensure_owner(&owner, caller, device_id)?;

        let now = self.clock.now();
        let previous = state.clear_expiry(device_id, viewer);
        state.record(
            caller,
            device_id,
            now,
            EventKind::AccessRevoked {
                viewer: viewer.clone(),
            },
        );

        info!(
            device_id = %device_id,
            viewer = %viewer,
            had_pass = previous.is_some(),
            "Access revoked"
        );
        Ok(())
    }

    /// Whether `viewer` may read the device right now
    pub fn has_access(&self, device_id: &DeviceId, viewer: &Identity) -> bool {
        let now = self.clock.now();
        let state = self.ledger.read();

        let Some(device) = state.device(device_id) else {
            debug!(device_id = %device_id, "Access check on unknown device");
            return false;
        };
        if &device.owner == viewer {
            return true;
        }

        state
            .expiry(device_id, viewer)
            .map(|expires_at| expires_at > now)
            .unwrap_or(false)
    }

    /// Effective expiry as unix seconds, 0 if never granted or revoked
    pub fn expiration_of(&self, device_id: &DeviceId, viewer: &Identity) -> i64 {
        self.ledger
            .read()
            .expiry(device_id, viewer)
            .map(|expires_at| expires_at.timestamp())
            .unwrap_or(0)
    }

    /// Full pass history of a device, oldest first
    pub fn list_passes(&self, device_id: &DeviceId) -> LedgerResult<Vec<PassView>> {
        let now = self.clock.now();
        let state = self.ledger.read();
        state.require_device(device_id)?;

        Ok(state
            .passes_of(device_id)
            .iter()
            .cloned()
            .map(|pass| PassView::at(pass, now))
            .collect())
    }

    /// Every pass ever granted to `viewer`, by device registration order
    pub fn list_passes_for_viewer(&self, viewer: &Identity) -> Vec<PassView> {
        let now = self.clock.now();
        let state = self.ledger.read();

        state
            .devices_in_order()
            .flat_map(|device| state.passes_of(&device.device_id).iter())
            .filter(|pass| &pass.viewer == viewer)
            .cloned()
            .map(|pass| PassView::at(pass, now))
            .collect()
    }
}
