//! # Sample Data
//!
//! Populates an empty ledger with a few demo devices so a fresh service has
//! something to browse. Skipped when any device already exists.

use tracing::info;

use shared::{
    constants::SAMPLE_PASS_DURATION_SECS,
    error::LedgerResult,
    types::{DeviceId, DeviceRegistrationRequest, Identity},
};

use crate::access::AccessPassManager;
use crate::registry::DeviceRegistry;

/// Owner of every demo device
pub const SAMPLE_OWNER: &str = "0x5a4d1e0000000000000000000000000000000001";

/// Viewer holding the demo pass
pub const SAMPLE_VIEWER: &str = "0x5a4d1e0000000000000000000000000000000002";

/// What the seeder created
#[derive(Debug, Clone, Default)]
pub struct SeedSummary {
    pub devices: Vec<DeviceId>,
    pub passes: usize,
}

fn sample_devices() -> Vec<DeviceRegistrationRequest> {
    vec![
        DeviceRegistrationRequest {
            did: "did:iot:sample:temp-001".into(),
            name: "Greenhouse temperature sensor".into(),
            device_type: "sensor".into(),
            manufacturer: "Thermo Devices".into(),
            model: "TD-220".into(),
            serial_number: "TD220-000981".into(),
            location: "Greenhouse A".into(),
            public_key: "0x04a1f3c2".into(),
        },
        DeviceRegistrationRequest {
            did: "did:iot:sample:cam-001".into(),
            name: "Loading dock camera".into(),
            device_type: "camera".into(),
            manufacturer: "Optic Works".into(),
            model: "OW-4K".into(),
            serial_number: "OW4K-117".into(),
            location: "Warehouse dock 3".into(),
            public_key: "0x04b7e912".into(),
        },
        DeviceRegistrationRequest {
            did: "did:iot:sample:air-001".into(),
            name: "Office air quality monitor".into(),
            device_type: "monitor".into(),
            manufacturer: "AirSense".into(),
            model: "AS-Q5".into(),
            serial_number: "ASQ5-5521".into(),
            location: "Floor 2".into(),
            public_key: "0x04c03d77".into(),
        },
    ]
}

/// Register the demo devices and a one-day pass on the first of them
pub fn seed_sample_data(
    registry: &DeviceRegistry,
    passes: &AccessPassManager,
) -> LedgerResult<SeedSummary> {
    if registry.count() > 0 {
        info!(devices = registry.count(), "Ledger not empty, skipping sample data");
        return Ok(SeedSummary::default());
    }

    let owner = Identity::parse(SAMPLE_OWNER)?;
    let viewer = Identity::parse(SAMPLE_VIEWER)?;

    let mut summary = SeedSummary::default();
    for request in sample_devices() {
        summary.devices.push(registry.register(&request, &owner)?);
    }

    if let Some(first) = summary.devices.first() {
        passes.grant(first, &viewer, SAMPLE_PASS_DURATION_SECS, &owner)?;
        summary.passes += 1;
    }

    info!(
        devices = summary.devices.len(),
        passes = summary.passes,
        "Sample data seeded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::Ledger;
    use shared::config::DeviceIdMode;
    use std::sync::Arc;

    #[test]
    fn test_seed_once() {
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let ledger = Arc::new(Ledger::new());
        let registry = DeviceRegistry::new(Arc::clone(&ledger), clock.clone(), DeviceIdMode::Hashed);
        let passes = AccessPassManager::new(Arc::clone(&ledger), clock);

        let summary = seed_sample_data(&registry, &passes).unwrap();
        assert_eq!(summary.devices.len(), 3);
        assert_eq!(summary.passes, 1);

        let viewer = Identity::parse(SAMPLE_VIEWER).unwrap();
        assert!(passes.has_access(&summary.devices[0], &viewer));
        assert!(!passes.has_access(&summary.devices[1], &viewer));

        let again = seed_sample_data(&registry, &passes).unwrap();
        assert!(again.devices.is_empty());
        assert_eq!(registry.count(), 3);
    }
}
