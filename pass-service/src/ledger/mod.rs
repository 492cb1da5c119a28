//! # Ledger Store
//!
//! The authoritative record of devices, access passes, the access index and
//! the event log. All of it sits behind one `RwLock`:
//!
//! - mutations take the write lock and apply every change (records, indices,
//!   event) before releasing it, so writes are serialised;
//! - reads take the read lock and therefore never observe a half-applied
//!   grant or registration.
//!
//! The registry and the pass manager share one `Arc<Ledger>` and do their
//! checks and writes inside a single `write()` section.

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use shared::{
    constants::MAX_EVENT_PAGE,
    error::{LedgerError, LedgerResult},
    types::{AccessPass, Device, DeviceId, EventKind, Identity, LedgerEvent},
};

/// In-memory ledger state
#[derive(Debug, Default)]
pub struct LedgerState {
    /// Device records by id
    devices: HashMap<DeviceId, Device>,

    /// Device ids in registration order (enumeration by index)
    order: Vec<DeviceId>,

    /// Device ids per owner, in registration order
    by_owner: HashMap<Identity, Vec<DeviceId>>,

    /// Append-only pass history per device
    passes: HashMap<DeviceId, Vec<AccessPass>>,

    /// (device, viewer) -> expiry of the latest non-revoked grant
    access_index: HashMap<DeviceId, HashMap<Identity, DateTime<Utc>>>,

    /// Append-only audit trail
    events: Vec<LedgerEvent>,

    /// Last number handed out in sequential id mode
    last_device_number: u64,
}

impl LedgerState {
    // =========================================================================
    // DEVICES
    // =========================================================================

    pub fn device(&self, device_id: &DeviceId) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn device_mut(&mut self, device_id: &DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(device_id)
    }

    /// Look up a device or fail with `DeviceNotFound`
    pub fn require_device(&self, device_id: &DeviceId) -> LedgerResult<&Device> {
        self.device(device_id)
            .ok_or_else(|| LedgerError::DeviceNotFound(device_id.to_string()))
    }

    pub fn contains_device(&self, device_id: &DeviceId) -> bool {
        self.devices.contains_key(device_id)
    }

    /// Insert a new device and index it under its owner
    pub fn insert_device(&mut self, device: Device) -> LedgerResult<()> {
        if self.devices.contains_key(&device.device_id) {
            return Err(LedgerError::Collision(device.device_id.to_string()));
        }

        self.order.push(device.device_id.clone());
        self.by_owner
            .entry(device.owner.clone())
            .or_default()
            .push(device.device_id.clone());
        self.devices.insert(device.device_id.clone(), device);
        Ok(())
    }

    pub fn device_count(&self) -> u64 {
        self.order.len() as u64
    }

    pub fn device_at(&self, index: u64) -> Option<&Device> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.order.get(i))
            .and_then(|id| self.devices.get(id))
    }

    pub fn devices_of(&self, owner: &Identity) -> Vec<Device> {
        self.by_owner
            .get(owner)
            .map(|ids| ids.iter().filter_map(|id| self.devices.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    /// Devices in registration order
    pub fn devices_in_order(&self) -> impl Iterator<Item = &Device> {
        self.order.iter().filter_map(|id| self.devices.get(id))
    }

    /// Reserve the next number for sequential device ids
    pub fn next_device_number(&mut self) -> u64 {
        self.last_device_number += 1;
        self.last_device_number
    }

    // =========================================================================
    // PASSES & ACCESS INDEX
    // =========================================================================

    pub fn append_pass(&mut self, pass: AccessPass) {
        self.passes.entry(pass.device_id.clone()).or_default().push(pass);
    }

    pub fn passes_of(&self, device_id: &DeviceId) -> &[AccessPass] {
        self.passes.get(device_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn expiry(&self, device_id: &DeviceId, viewer: &Identity) -> Option<DateTime<Utc>> {
        self.access_index
            .get(device_id)
            .and_then(|viewers| viewers.get(viewer))
            .copied()
    }

    /// Overwrite the effective expiry for (device, viewer)
    pub fn set_expiry(&mut self, device_id: &DeviceId, viewer: &Identity, expires_at: DateTime<Utc>) {
        self.access_index
            .entry(device_id.clone())
            .or_default()
            .insert(viewer.clone(), expires_at);
    }

    /// Drop the effective expiry for (device, viewer), returning the old value
    pub fn clear_expiry(&mut self, device_id: &DeviceId, viewer: &Identity) -> Option<DateTime<Utc>> {
        let viewers = self.access_index.get_mut(device_id)?;
        let previous = viewers.remove(viewer);
        if viewers.is_empty() {
            self.access_index.remove(device_id);
        }
        previous
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Append an event with the next sequence number
    pub fn record(
        &mut self,
        actor: &Identity,
        device_id: &DeviceId,
        timestamp: DateTime<Utc>,
        kind: EventKind,
    ) -> &LedgerEvent {
        let sequence = self.events.len() as u64 + 1;
        debug!(sequence, event = kind.name(), device_id = %device_id, "Recording ledger event");
        self.events.push(LedgerEvent {
            sequence,
            actor: actor.clone(),
            device_id: device_id.clone(),
            timestamp,
            kind,
        });
        &self.events[self.events.len() - 1]
    }

    pub fn last_sequence(&self) -> u64 {
        self.events.len() as u64
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// Shared handle over the ledger state
#[derive(Debug, Default)]
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        info!("Initializing empty ledger");
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write()
    }

    /// Events with `sequence > after`, oldest first, at most `limit`
    pub fn events_after(&self, after: u64, limit: usize) -> Vec<LedgerEvent> {
        let limit = limit.clamp(1, MAX_EVENT_PAGE);
        let state = self.read();
        // sequence n lives at index n - 1
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(state.events.len());
        state.events[start..].iter().take(limit).cloned().collect()
    }

    pub fn last_sequence(&self) -> u64 {
        self.read().last_sequence()
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Capture a consistent copy of the whole ledger
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.read();

        let devices: Vec<Device> = state.devices_in_order().cloned().collect();
        let passes = devices
            .iter()
            .flat_map(|d| state.passes_of(&d.device_id).iter().cloned())
            .collect();
        let mut access_index: Vec<AccessIndexEntry> = state
            .access_index
            .iter()
            .flat_map(|(device_id, viewers)| {
                viewers.iter().map(move |(viewer, expires_at)| AccessIndexEntry {
                    device_id: device_id.clone(),
                    viewer: viewer.clone(),
                    expires_at: *expires_at,
                })
            })
            .collect();
        access_index.sort_by(|a, b| (&a.device_id, &a.viewer).cmp(&(&b.device_id, &b.viewer)));

        LedgerSnapshot {
            devices,
            passes,
            access_index,
            events: state.events.clone(),
            last_device_number: state.last_device_number,
        }
    }

    /// Rebuild a ledger from a snapshot, checking it is self-consistent
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> LedgerResult<Self> {
        let mut state = LedgerState {
            last_device_number: snapshot.last_device_number,
            ..Default::default()
        };

        for device in snapshot.devices {
            state.insert_device(device).map_err(|e| {
                LedgerError::Serialization(format!("snapshot has duplicate device: {}", e))
            })?;
        }

        for pass in snapshot.passes {
            if !state.contains_device(&pass.device_id) {
                return Err(LedgerError::Serialization(format!(
                    "snapshot pass {} references unknown device {}",
                    pass.pass_id, pass.device_id
                )));
            }
            state.append_pass(pass);
        }

        for entry in snapshot.access_index {
            if !state.contains_device(&entry.device_id) {
                return Err(LedgerError::Serialization(format!(
                    "snapshot access entry references unknown device {}",
                    entry.device_id
                )));
            }
            state.set_expiry(&entry.device_id, &entry.viewer, entry.expires_at);
        }

        for (position, event) in snapshot.events.iter().enumerate() {
            if event.sequence != position as u64 + 1 {
                return Err(LedgerError::Serialization(format!(
                    "snapshot event sequence {} out of order at position {}",
                    event.sequence, position
                )));
            }
        }
        state.events = snapshot.events;

        info!(
            devices = state.device_count(),
            events = state.last_sequence(),
            "Ledger restored from snapshot"
        );

        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

/// Serializable form of the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub devices: Vec<Device>,
    pub passes: Vec<AccessPass>,
    pub access_index: Vec<AccessIndexEntry>,
    pub events: Vec<LedgerEvent>,
    pub last_device_number: u64,
}

/// One access index entry in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessIndexEntry {
    pub device_id: DeviceId,
    pub viewer: Identity,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}
