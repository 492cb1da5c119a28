//! # Constants for the Device Pass Ledger

// =============================================================================
// ACCESS PASS LIMITS
// =============================================================================

/// Longest pass a device owner may grant (365 days in seconds)
pub const MAX_PASS_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Duration of the demo pass created by sample-data seeding (1 day)
pub const SAMPLE_PASS_DURATION_SECS: u64 = 24 * 60 * 60;

// =============================================================================
// IDENTITIES
// =============================================================================

/// Number of bytes in an account identity
pub const IDENTITY_BYTES: usize = 20;

/// Textual prefix of an account identity
pub const IDENTITY_PREFIX: &str = "0x";

/// Prefix of hashed device ids
pub const DEVICE_ID_PREFIX: &str = "0x";

// =============================================================================
// EVENT LOG
// =============================================================================

/// Default page size for event queries
pub const DEFAULT_EVENT_PAGE: usize = 100;

/// Largest page of events returned by one query
pub const MAX_EVENT_PAGE: usize = 1000;

// =============================================================================
// API CONFIGURATION
// =============================================================================

/// Default service port
pub const PASS_SERVICE_PORT: u16 = 8080;

/// API version prefix
pub const API_VERSION: &str = "v1";

/// Header carrying the acting identity on mutating requests
pub const CALLER_HEADER: &str = "x-caller-identity";

// =============================================================================
// STORAGE
// =============================================================================

/// Directory under the home directory used when persistence is enabled
/// without an explicit snapshot path
pub const DEFAULT_STORAGE_DIR: &str = ".pass-service";

/// File name of the ledger snapshot
pub const SNAPSHOT_FILE_NAME: &str = "ledger.json";

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

pub const ENV_SERVICE_HOST: &str = "PASS_SERVICE_HOST";
pub const ENV_SERVICE_PORT: &str = "PASS_SERVICE_PORT";
pub const ENV_ENABLE_CORS: &str = "PASS_ENABLE_CORS";
pub const ENV_DEVICE_ID_MODE: &str = "PASS_DEVICE_ID_MODE";
pub const ENV_SEED_SAMPLE_DATA: &str = "PASS_SEED_SAMPLE_DATA";
pub const ENV_PERSIST: &str = "PASS_PERSIST";
pub const ENV_SNAPSHOT_PATH: &str = "PASS_SNAPSHOT_PATH";
pub const ENV_LOG_LEVEL: &str = "PASS_LOG_LEVEL";
pub const ENV_SERVICE_URL: &str = "PASS_SERVICE_URL";
pub const ENV_CALLER: &str = "PASS_CALLER";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Parse a boolean flag the way environment variables are usually written
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_duration_is_one_year() {
        assert_eq!(MAX_PASS_DURATION_SECS, 31_536_000);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 1 "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
