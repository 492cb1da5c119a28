//! # Error Types for the Device Pass Ledger
//!
//! Every ledger operation fails synchronously with one of these variants.
//! Nothing is retried internally: each operation is a single deterministic
//! state transition, so a failure is always returned to the caller.

use thiserror::Error;

/// Main error type for the ledger and its façade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // =========================================================================
    // INPUT ERRORS
    // =========================================================================

    /// Malformed, missing or out-of-range input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Device name was empty on update
    #[error("Device name is required")]
    NameRequired,

    // =========================================================================
    // AUTHORIZATION ERRORS
    // =========================================================================

    /// Caller is not the identity required for the operation
    #[error("Unauthorized: {0}")]
    Authorization(String),

    // =========================================================================
    // LOOKUP ERRORS
    // =========================================================================

    /// Unknown device id
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Generated device id already exists
    #[error("Device id collision: {0}")]
    Collision(String),

    /// Enumeration index past the end of the registry
    #[error("Index {index} out of range (count {count})")]
    IndexOutOfRange { index: u64, count: u64 },

    // =========================================================================
    // INFRASTRUCTURE ERRORS
    // =========================================================================

    /// Failed to read/write the ledger snapshot
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using LedgerError
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// ERROR CONVERSIONS
// =============================================================================

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

// =============================================================================
// ERROR CODES & CATEGORIES
// =============================================================================

impl LedgerError {
    /// Stable machine-readable code returned to API callers
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::NameRequired => "NAME_REQUIRED",
            LedgerError::Authorization(_) => "AUTHORIZATION_ERROR",
            LedgerError::DeviceNotFound(_) => "NOT_FOUND",
            LedgerError::Collision(_) => "COLLISION_ERROR",
            LedgerError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            LedgerError::Storage(_)
            | LedgerError::Serialization(_)
            | LedgerError::Configuration(_)
            | LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) | LedgerError::NameRequired => "input",
            LedgerError::Authorization(_) => "auth",
            LedgerError::DeviceNotFound(_)
            | LedgerError::Collision(_)
            | LedgerError::IndexOutOfRange { .. } => "lookup",
            LedgerError::Storage(_) | LedgerError::Serialization(_) => "storage",
            LedgerError::Configuration(_) => "config",
            LedgerError::Internal(_) => "internal",
        }
    }

    /// Whether the error was caused by the caller rather than the service
    pub fn is_client_error(&self) -> bool {
        !matches!(self.code(), "INTERNAL_ERROR")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(LedgerError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(LedgerError::NameRequired.code(), "NAME_REQUIRED");
        assert_eq!(LedgerError::Authorization("x".into()).code(), "AUTHORIZATION_ERROR");
        assert_eq!(LedgerError::DeviceNotFound("0x1".into()).code(), "NOT_FOUND");
        assert_eq!(LedgerError::Collision("0x1".into()).code(), "COLLISION_ERROR");
        assert_eq!(
            LedgerError::IndexOutOfRange { index: 3, count: 3 }.code(),
            "INDEX_OUT_OF_RANGE"
        );
        assert_eq!(LedgerError::Storage("disk".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(LedgerError::NameRequired.category(), "input");
        assert_eq!(LedgerError::Authorization("x".into()).category(), "auth");
        assert_eq!(LedgerError::Collision("x".into()).category(), "lookup");
    }

    #[test]
    fn test_client_errors() {
        assert!(LedgerError::Validation("bad".into()).is_client_error());
        assert!(LedgerError::IndexOutOfRange { index: 1, count: 0 }.is_client_error());
        assert!(!LedgerError::Internal("boom".into()).is_client_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: LedgerError = io.into();
        assert_eq!(err.category(), "storage");
    }
}
