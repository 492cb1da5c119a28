//! # Device Registry
//!
//! Registers devices and applies owner-only mutations to them.
//!
//! ## Ownership
//!
//! The registering identity becomes the owner and stays the owner: there is
//! no transfer operation, and every mutator checks the caller against it.
//!
//! ## Device ids
//!
//! - `hashed`: `0x` + SHA-256(did, owner, registration second). Registering
//!   the same DID twice from the same owner within one second collides.
//! - `sequential`: decimal counter starting at 1.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use shared::{
    config::DeviceIdMode,
    constants::DEVICE_ID_PREFIX,
    error::{LedgerError, LedgerResult},
    types::{Device, DeviceId, DeviceRegistrationRequest, EventKind, Identity},
};

use crate::clock::Clock;
use crate::ledger::Ledger;

/// Device Registry over the shared ledger
pub struct DeviceRegistry {
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    id_mode: DeviceIdMode,
}

impl DeviceRegistry {
    pub fn new(ledger: Arc<Ledger>, clock: Arc<dyn Clock>, id_mode: DeviceIdMode) -> Self {
        info!(id_mode = %id_mode, "Initializing device registry");
        Self {
            ledger,
            clock,
            id_mode,
        }
    }

    /// Register a new device owned by `owner`
    ///
    /// # Errors
    /// - `Validation` if the DID or name is empty, or the owner is the zero identity
    /// - `Collision` if the derived id already exists
    pub fn register(
        &self,
        request: &DeviceRegistrationRequest,
        owner: &Identity,
    ) -> LedgerResult<DeviceId> {
        let did = request.did.trim();
        let name = request.name.trim();
        if did.is_empty() {
            return Err(LedgerError::Validation("DID is required".into()));
        }
        if name.is_empty() {
            return Err(LedgerError::Validation("device name is required".into()));
        }
        if owner.is_zero() {
            return Err(LedgerError::Validation("owner must not be the zero identity".into()));
        }

        let mut state = self.ledger.write();
        let now = self.clock.now();

        let device_id = match self.id_mode {
            DeviceIdMode::Hashed => hashed_device_id(did, owner, now.timestamp()),
            DeviceIdMode::Sequential => DeviceId::new(state.next_device_number().to_string()),
        };

        if state.contains_device(&device_id) {
            warn!(device_id = %device_id, did = %did, "Device id collision");
            return Err(LedgerError::Collision(device_id.to_string()));
        }

        let device = Device {
            device_id: device_id.clone(),
            did: did.to_string(),
            name: name.to_string(),
            device_type: request.device_type.trim().to_string(),
            manufacturer: request.manufacturer.trim().to_string(),
            model: request.model.trim().to_string(),
            serial_number: request.serial_number.trim().to_string(),
            location: request.location.trim().to_string(),
            public_key: request.public_key.trim().to_string(),
            owner: owner.clone(),
            registered_at: now,
            is_active: true,
        };
        state.insert_device(device)?;
        state.record(
            owner,
            &device_id,
            now,
            EventKind::DeviceRegistered {
                did: did.to_string(),
                owner: owner.clone(),
            },
        );

        info!(device_id = %device_id, did = %did, owner = %owner, "Device registered");
        Ok(device_id)
    }

    /// Rename/relocate a device. Owner only.
    pub fn update(
        &self,
        device_id: &DeviceId,
        new_name: &str,
        new_location: &str,
        caller: &Identity,
    ) -> LedgerResult<()> {
        let mut state = self.ledger.write();
        let owner = state.require_device(device_id)?.owner.clone();

        let name = new_name.trim();
        if name.is_empty() {
            return Err(LedgerError::NameRequired);
        }
        ensure_owner(&owner, caller, device_id)?;

        let now = self.clock.now();
        let location = new_location.trim();
        if let Some(device) = state.device_mut(device_id) {
            device.name = name.to_string();
            device.location = location.to_string();
        }
        state.record(
            caller,
            device_id,
            now,
            EventKind::DeviceUpdated {
                name: name.to_string(),
                location: location.to_string(),
            },
        );

        info!(device_id = %device_id, name = %name, "Device updated");
        Ok(())
    }

    /// Flip the device's active flag. Owner only. Returns the new flag.
    pub fn toggle_active(&self, device_id: &DeviceId, caller: &Identity) -> LedgerResult<bool> {
        let mut state = self.ledger.write();
        let owner = state.require_device(device_id)?.owner.clone();
        ensure_owner(&owner, caller, device_id)?;

        let now = self.clock.now();
        let is_active = match state.device_mut(device_id) {
            Some(device) => {
                device.is_active = !device.is_active;
                device.is_active
            }
            None => return Err(LedgerError::DeviceNotFound(device_id.to_string())),
        };
        state.record(caller, device_id, now, EventKind::DeviceStatusChanged { is_active });

        info!(device_id = %device_id, is_active, "Device status changed");
        Ok(is_active)
    }

    pub fn get(&self, device_id: &DeviceId) -> LedgerResult<Device> {
        debug!(device_id = %device_id, "Device lookup");
        self.ledger.read().require_device(device_id).cloned()
    }

    /// Devices owned by `owner`, in registration order
    pub fn list_by_owner(&self, owner: &Identity) -> Vec<Device> {
        self.ledger.read().devices_of(owner)
    }

    pub fn count(&self) -> u64 {
        self.ledger.read().device_count()
    }

    /// The `index`-th registered device
    pub fn get_by_index(&self, index: u64) -> LedgerResult<Device> {
        let state = self.ledger.read();
        state
            .device_at(index)
            .cloned()
            .ok_or(LedgerError::IndexOutOfRange {
                index,
                count: state.device_count(),
            })
    }
}

/// Fail with `Authorization` unless `caller` owns the device
pub(crate) fn ensure_owner(owner: &Identity, caller: &Identity, device_id: &DeviceId) -> LedgerResult<()> {
    if owner != caller {
        warn!(device_id = %device_id, caller = %caller, "Rejected non-owner call");
        return Err(LedgerError::Authorization(format!(
            "{} is not the owner of device {}",
            caller, device_id
        )));
    }
    Ok(())
}

/// Derive a hashed device id from its registration facts
pub fn hashed_device_id(did: &str, owner: &Identity, registered_at_secs: i64) -> DeviceId {
    let mut hasher = Sha256::new();
    hasher.update(did.as_bytes());
    hasher.update([0u8]);
    hasher.update(owner.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(registered_at_secs.to_be_bytes());
    DeviceId::new(format!("{}{}", DEVICE_ID_PREFIX, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const OWNER: &str = "0x00000000000000000000000000000000000000a1";
    const OTHER: &str = "0x00000000000000000000000000000000000000c3";

    fn registry(mode: DeviceIdMode) -> (DeviceRegistry, Arc<ManualClock>, Arc<Ledger>) {
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let ledger = Arc::new(Ledger::new());
        let registry = DeviceRegistry::new(Arc::clone(&ledger), clock.clone(), mode);
        (registry, clock, ledger)
    }

    fn request(did: &str, name: &str) -> DeviceRegistrationRequest {
        DeviceRegistrationRequest {
            did: did.into(),
            name: name.into(),
            device_type: "sensor".into(),
            manufacturer: "Acme".into(),
            model: "T-100".into(),
            serial_number: "SN-001".into(),
            location: "Lab".into(),
            public_key: "ed25519:abcd".into(),
        }
    }

    fn owner() -> Identity {
        Identity::parse(OWNER).unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let (registry, _, ledger) = registry(DeviceIdMode::Hashed);
        let id = registry.register(&request("did:iot:1", "Thermostat"), &owner()).unwrap();

        assert!(id.as_str().starts_with("0x"));
        assert_eq!(id.as_str().len(), 2 + 64);

        let device = registry.get(&id).unwrap();
        assert_eq!(device.owner, owner());
        assert_eq!(device.name, "Thermostat");
        assert_eq!(device.registered_at.timestamp(), 1_700_000_000);
        assert!(device.is_active);

        assert_eq!(registry.count(), 1);
        assert_eq!(registry.list_by_owner(&owner()), vec![device]);
        assert_eq!(ledger.last_sequence(), 1);
    }

    #[test]
    fn test_register_requires_did_and_name() {
        let (registry, _, ledger) = registry(DeviceIdMode::Hashed);

        let err = registry.register(&request("", "Thermostat"), &owner()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = registry.register(&request("did:iot:1", "   "), &owner()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        assert_eq!(registry.count(), 0);
        assert_eq!(ledger.last_sequence(), 0);
    }

    #[test]
    fn test_hashed_id_collides_within_same_second() {
        let (registry, clock, _) = registry(DeviceIdMode::Hashed);
        let first = registry.register(&request("did:iot:1", "A"), &owner()).unwrap();

        let err = registry.register(&request("did:iot:1", "B"), &owner()).unwrap_err();
        assert_eq!(err, LedgerError::Collision(first.to_string()));

        clock.advance_secs(1);
        let second = registry.register(&request("did:iot:1", "B"), &owner()).unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_sequential_ids() {
        let (registry, _, _) = registry(DeviceIdMode::Sequential);
        let a = registry.register(&request("did:iot:1", "A"), &owner()).unwrap();
        let b = registry.register(&request("did:iot:1", "B"), &owner()).unwrap();
        assert_eq!(a.as_str(), "1");
        assert_eq!(b.as_str(), "2");
    }

    #[test]
    fn test_update_checks_in_order() {
        let (registry, _, _) = registry(DeviceIdMode::Sequential);
        let id = registry.register(&request("did:iot:1", "A"), &owner()).unwrap();
        let other = Identity::parse(OTHER).unwrap();

        let err = registry.update(&DeviceId::new("404"), "X", "Y", &owner()).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let err = registry.update(&id, "", "Y", &owner()).unwrap_err();
        assert_eq!(err, LedgerError::NameRequired);

        let err = registry.update(&id, "X", "Y", &other).unwrap_err();
        assert_eq!(err.code(), "AUTHORIZATION_ERROR");
        assert_eq!(registry.get(&id).unwrap().name, "A");

        registry.update(&id, "Hallway sensor", "Hallway", &owner()).unwrap();
        let device = registry.get(&id).unwrap();
        assert_eq!(device.name, "Hallway sensor");
        assert_eq!(device.location, "Hallway");
        assert_eq!(device.owner, owner());
    }

    #[test]
    fn test_toggle_active() {
        let (registry, _, ledger) = registry(DeviceIdMode::Sequential);
        let id = registry.register(&request("did:iot:1", "A"), &owner()).unwrap();
        let other = Identity::parse(OTHER).unwrap();

        assert_eq!(
            registry.toggle_active(&id, &other).unwrap_err().code(),
            "AUTHORIZATION_ERROR"
        );
        assert!(!registry.toggle_active(&id, &owner()).unwrap());
        assert!(registry.toggle_active(&id, &owner()).unwrap());

        let events = ledger.events_after(0, 10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].kind, EventKind::DeviceStatusChanged { is_active: false });
    }

    #[test]
    fn test_get_by_index() {
        let (registry, _, _) = registry(DeviceIdMode::Sequential);
        let a = registry.register(&request("did:iot:1", "A"), &owner()).unwrap();
        let b = registry.register(&request("did:iot:2", "B"), &owner()).unwrap();

        assert_eq!(registry.get_by_index(0).unwrap().device_id, a);
        assert_eq!(registry.get_by_index(1).unwrap().device_id, b);
        assert_eq!(
            registry.get_by_index(2).unwrap_err(),
            LedgerError::IndexOutOfRange { index: 2, count: 2 }
        );
    }

    #[test]
    fn test_hashed_device_id_is_deterministic() {
        let a = hashed_device_id("did:iot:1", &owner(), 42);
        let b = hashed_device_id("did:iot:1", &owner(), 42);
        let c = hashed_device_id("did:iot:1", &owner(), 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
