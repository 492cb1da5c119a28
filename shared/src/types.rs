//! # Shared Data Types for the Device Pass Ledger
//!
//! Ledger records (devices, access passes, events) and the request/response
//! shapes of the REST API. Timestamps travel as unix seconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::{IDENTITY_BYTES, IDENTITY_PREFIX};
use crate::error::{LedgerError, LedgerResult};

// =============================================================================
// IDENTITIES
// =============================================================================

/// An account identity (`0x` followed by 40 hex digits, stored lowercase)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Parse and normalise an identity
    pub fn parse(input: &str) -> LedgerResult<Self> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix(IDENTITY_PREFIX)
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| {
                LedgerError::Validation(format!("identity '{}' must start with 0x", input))
            })?;

        let bytes = hex::decode(digits)
            .map_err(|e| LedgerError::Validation(format!("identity '{}': {}", input, e)))?;
        if bytes.len() != IDENTITY_BYTES {
            return Err(LedgerError::Validation(format!(
                "identity '{}' must be {} bytes",
                input, IDENTITY_BYTES
            )));
        }

        Ok(Self(format!("{}{}", IDENTITY_PREFIX, hex::encode(bytes))))
    }

    /// The null identity, which can never hold a pass
    pub fn zero() -> Self {
        Self(format!("{}{}", IDENTITY_PREFIX, "0".repeat(IDENTITY_BYTES * 2)))
    }

    pub fn is_zero(&self) -> bool {
        self.0[IDENTITY_PREFIX.len()..].bytes().all(|b| b == b'0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identity {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identity::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque device identifier assigned at registration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// =============================================================================
// DEVICE
// =============================================================================

/// A registered device. The owner is bound at registration and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: DeviceId,
    pub did: String,
    pub name: String,
    pub device_type: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub location: String,
    pub public_key: String,
    pub owner: Identity,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub registered_at: DateTime<Utc>,
    pub is_active: bool,
}

// =============================================================================
// ACCESS PASS
// =============================================================================

/// One grant in a device's append-only pass history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPass {
    pub pass_id: Uuid,
    pub device_id: DeviceId,
    pub viewer: Identity,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub granted_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    /// Set at grant time. Revocation acts on the access index, not on this.
    pub is_active: bool,
}

impl AccessPass {
    /// Whether the pass had run out at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// A pass as returned to readers, with expiry evaluated at read time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassView {
    #[serde(flatten)]
    pub pass: AccessPass,
    pub is_expired: bool,
}

impl PassView {
    pub fn at(pass: AccessPass, now: DateTime<Utc>) -> Self {
        let is_expired = pass.is_expired_at(now);
        Self { pass, is_expired }
    }
}

// =============================================================================
// LEDGER EVENTS
// =============================================================================

/// An append-only audit fact, uniquely ordered by `sequence`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub sequence: u64,
    pub actor: Identity,
    pub device_id: DeviceId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// What happened in a ledger event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum EventKind {
    DeviceRegistered {
        did: String,
        owner: Identity,
    },
    DeviceUpdated {
        name: String,
        location: String,
    },
    DeviceStatusChanged {
        #[serde(rename = "isActive")]
        is_active: bool,
    },
    AccessGranted {
        viewer: Identity,
        #[serde(rename = "expiresAt", with = "chrono::serde::ts_seconds")]
        expires_at: DateTime<Utc>,
    },
    AccessRevoked {
        viewer: Identity,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::DeviceRegistered { .. } => "DeviceRegistered",
            EventKind::DeviceUpdated { .. } => "DeviceUpdated",
            EventKind::DeviceStatusChanged { .. } => "DeviceStatusChanged",
            EventKind::AccessGranted { .. } => "AccessGranted",
            EventKind::AccessRevoked { .. } => "AccessRevoked",
        }
    }
}

// =============================================================================
// API REQUEST/RESPONSE TYPES
// =============================================================================

/// Request to register a new device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistrationRequest {
    pub did: String,
    pub name: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub public_key: String,
}

/// Response from device registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistrationResponse {
    pub device_id: DeviceId,
}

/// Request to rename/relocate a device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdateRequest {
    pub name: String,
    #[serde(default)]
    pub location: String,
}

/// Response from toggling a device's active flag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusResponse {
    pub device_id: DeviceId,
    pub is_active: bool,
}

/// Number of registered devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCountResponse {
    pub count: u64,
}

/// Request to grant a viewer a pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessRequest {
    pub device_id: DeviceId,
    pub viewer: String,
    /// Pass duration in seconds
    pub duration: u64,
}

/// Response from a grant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessResponse {
    /// Unix seconds
    pub expires_at: i64,
}

/// Request naming a (device, viewer) pair, used by check and revoke
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTargetRequest {
    pub device_id: DeviceId,
    pub viewer: String,
}

/// Current access of a viewer to a device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheckResponse {
    pub has_access: bool,
    /// Unix seconds, 0 when no pass is on record
    pub expires_at: i64,
}

/// Acknowledgement for operations without a payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Error body returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_identity_normalises_case() {
        let id = Identity::parse("0xABCDEFabcdef0123456789abcdef012345678901").unwrap();
        assert_eq!(id.as_str(), "0xabcdefabcdef0123456789abcdef012345678901");
        assert_eq!(id, "0xabcdefABCDEF0123456789abcdef012345678901".parse().unwrap());
    }

    #[test]
    fn test_identity_rejects_bad_input() {
        assert!(Identity::parse("").is_err());
        assert!(Identity::parse("abcdefabcdef0123456789abcdef012345678901").is_err());
        assert!(Identity::parse("0x1234").is_err());
        assert!(Identity::parse("0xzzcdefabcdef0123456789abcdef012345678901").is_err());
    }

    #[test]
    fn test_zero_identity() {
        let zero = Identity::zero();
        assert!(zero.is_zero());
        assert_eq!(Identity::parse(zero.as_str()).unwrap(), zero);
        assert!(!Identity::parse("0x0000000000000000000000000000000000000001")
            .unwrap()
            .is_zero());
    }

    #[test]
    fn test_pass_view_marks_expiry_at_read_time() {
        let granted = Utc.timestamp_opt(1_000, 0).unwrap();
        let pass = AccessPass {
            pass_id: Uuid::new_v4(),
            device_id: DeviceId::new("1"),
            viewer: Identity::parse("0x00000000000000000000000000000000000000b0").unwrap(),
            granted_at: granted,
            expires_at: granted + chrono::Duration::seconds(60),
            is_active: true,
        };

        assert!(!PassView::at(pass.clone(), granted).is_expired);
        assert!(!PassView::at(pass.clone(), pass.expires_at).is_expired);
        assert!(PassView::at(pass.clone(), pass.expires_at + chrono::Duration::seconds(1)).is_expired);
    }

    #[test]
    fn test_event_wire_format() {
        let event = LedgerEvent {
            sequence: 7,
            actor: Identity::parse("0x00000000000000000000000000000000000000a0").unwrap(),
            device_id: DeviceId::new("0xfeed"),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            kind: EventKind::AccessRevoked {
                viewer: Identity::parse("0x00000000000000000000000000000000000000b0").unwrap(),
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "AccessRevoked");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["timestamp"], 1_700_000_000);
        assert_eq!(json["deviceId"], "0xfeed");

        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_registration_request_defaults_optional_fields() {
        let req: DeviceRegistrationRequest =
            serde_json::from_str(r#"{"did":"did:iot:1","name":"Thermostat"}"#).unwrap();
        assert_eq!(req.did, "did:iot:1");
        assert!(req.serial_number.is_empty());
    }
}
