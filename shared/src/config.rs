//! # Configuration for the Device Pass Ledger
//!
//! Configuration is loaded from environment variables on top of defaults,
//! then validated before the service starts.

use crate::constants::*;
use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;

// =============================================================================
// DEVICE ID MODE
// =============================================================================

/// How the registry derives new device ids
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceIdMode {
    /// SHA-256 over did, owner and registration second
    #[default]
    Hashed,
    /// Monotonic counter starting at 1
    Sequential,
}

impl DeviceIdMode {
    /// Parse a mode name, rejecting unknown values
    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "hashed" | "hash" => Ok(DeviceIdMode::Hashed),
            "sequential" | "counter" => Ok(DeviceIdMode::Sequential),
            other => Err(LedgerError::Configuration(format!(
                "unknown device id mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DeviceIdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceIdMode::Hashed => write!(f, "hashed"),
            DeviceIdMode::Sequential => write!(f, "sequential"),
        }
    }
}

// =============================================================================
// SERVICE CONFIGURATION
// =============================================================================

/// Configuration for the pass service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API server configuration
    pub api: ApiConfig,

    /// Ledger behaviour
    pub ledger: LedgerConfig,

    /// Snapshot persistence
    pub storage: StorageConfig,

    /// Logging
    pub log: LogConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> LedgerResult<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var(ENV_SERVICE_HOST) {
            config.api.host = host;
        }

        if let Ok(port) = env::var(ENV_SERVICE_PORT) {
            config.api.port = port.trim().parse().map_err(|_| {
                LedgerError::Configuration(format!("{} is not a valid port: {}", ENV_SERVICE_PORT, port))
            })?;
        }

        if let Ok(cors) = env::var(ENV_ENABLE_CORS) {
            config.api.enable_cors = require_flag(ENV_ENABLE_CORS, &cors)?;
        }

        if let Ok(mode) = env::var(ENV_DEVICE_ID_MODE) {
            config.ledger.id_mode = DeviceIdMode::parse(&mode)?;
        }

        if let Ok(seed) = env::var(ENV_SEED_SAMPLE_DATA) {
            config.ledger.seed_sample_data = require_flag(ENV_SEED_SAMPLE_DATA, &seed)?;
        }

        if let Ok(persist) = env::var(ENV_PERSIST) {
            config.storage.persist = require_flag(ENV_PERSIST, &persist)?;
        }

        if let Ok(path) = env::var(ENV_SNAPSHOT_PATH) {
            config.storage.snapshot_path = Some(PathBuf::from(path));
            config.storage.persist = true;
        }

        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            config.log.level = level;
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> LedgerResult<()> {
        if self.api.host.trim().is_empty() {
            return Err(LedgerError::Configuration("API host must not be empty".into()));
        }

        self.storage.validate()?;
        self.log.validate()?;

        Ok(())
    }
}

fn require_flag(name: &str, value: &str) -> LedgerResult<bool> {
    parse_flag(value).ok_or_else(|| {
        LedgerError::Configuration(format!("{} must be a boolean, got '{}'", name, value))
    })
}

// =============================================================================
// API CONFIGURATION
// =============================================================================

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable permissive CORS for browser frontends
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: PASS_SERVICE_PORT,
            enable_cors: true,
        }
    }
}

impl ApiConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// LEDGER CONFIGURATION
// =============================================================================

/// Ledger behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Device id derivation
    pub id_mode: DeviceIdMode,

    /// Populate demo devices when the ledger starts empty
    pub seed_sample_data: bool,
}

// =============================================================================
// STORAGE CONFIGURATION
// =============================================================================

/// Snapshot persistence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Persist the ledger to disk after every change
    pub persist: bool,

    /// Snapshot file (defaults to ~/.pass-service/ledger.json)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Validate storage configuration
    pub fn validate(&self) -> LedgerResult<()> {
        if let Some(ref path) = self.snapshot_path {
            if path.as_os_str().is_empty() {
                return Err(LedgerError::Configuration("snapshot path is empty".into()));
            }
            if path.is_dir() {
                return Err(LedgerError::Configuration(format!(
                    "snapshot path {} is a directory",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Resolve the snapshot file, if persistence is enabled
    pub fn effective_path(&self, home: Option<PathBuf>) -> Option<PathBuf> {
        if !self.persist {
            return None;
        }

        if let Some(ref path) = self.snapshot_path {
            return Some(path.clone());
        }

        let dir = home
            .map(|home| home.join(DEFAULT_STORAGE_DIR))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
        Some(dir.join(SNAPSHOT_FILE_NAME))
    }
}

// =============================================================================
// LOG CONFIGURATION
// =============================================================================

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Max level: trace, debug, info, warn or error
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

impl LogConfig {
    pub fn validate(&self) -> LedgerResult<()> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(LedgerError::Configuration(format!("unknown log level '{}'", other))),
        }
    }
}

// =============================================================================
// CLIENT CONFIGURATION
// =============================================================================

/// Configuration for the command-line client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the pass service
    pub service_url: String,

    /// Identity the client acts as on mutating calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_url: format!("http://localhost:{}", PASS_SERVICE_PORT),
            caller: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.ledger.id_mode, DeviceIdMode::Hashed);
        assert!(!config.ledger.seed_sample_data);
        assert!(!config.storage.persist);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_bind_addr() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_device_id_mode_parse() {
        assert_eq!(DeviceIdMode::parse("SEQUENTIAL").unwrap(), DeviceIdMode::Sequential);
        assert_eq!(DeviceIdMode::parse("hashed").unwrap(), DeviceIdMode::Hashed);
        assert!(DeviceIdMode::parse("random").is_err());
    }

    #[test]
    fn test_effective_snapshot_path() {
        let mut storage = StorageConfig::default();
        assert!(storage.effective_path(Some(PathBuf::from("/home/op"))).is_none());

        storage.persist = true;
        assert_eq!(
            storage.effective_path(Some(PathBuf::from("/home/op"))),
            Some(PathBuf::from("/home/op/.pass-service/ledger.json"))
        );

        storage.snapshot_path = Some(PathBuf::from("/var/lib/pass/ledger.json"));
        assert_eq!(
            storage.effective_path(None),
            Some(PathBuf::from("/var/lib/pass/ledger.json"))
        );
    }

    #[test]
    fn test_log_level_validation() {
        let mut log = LogConfig::default();
        assert!(log.validate().is_ok());
        log.level = "loud".into();
        assert!(log.validate().is_err());
    }
}
