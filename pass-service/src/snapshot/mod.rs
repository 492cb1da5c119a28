//! # Snapshot Storage
//!
//! Optional JSON persistence of the whole ledger. The service loads the
//! snapshot at start-up and rewrites it after every successful mutation.
//! Writes go to a temporary file that is then renamed over the old one,
//! so a crash mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use shared::error::{LedgerError, LedgerResult};

use crate::ledger::LedgerSnapshot;

/// File-backed store for ledger snapshots
pub struct SnapshotStore {
    /// Path to the snapshot file
    path: PathBuf,

    /// Serialises writers so renames never interleave
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!(path = ?path, "Initializing snapshot storage");
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or `None` if no file exists yet
    pub async fn load(&self) -> LedgerResult<Option<LedgerSnapshot>> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!(path = ?self.path, "No snapshot found");
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| LedgerError::Storage(format!("{}: {}", self.path.display(), e)))?;

        let snapshot: LedgerSnapshot = serde_json::from_str(&json)?;

        info!(
            path = ?self.path,
            devices = snapshot.devices.len(),
            events = snapshot.events.len(),
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    /// Write the snapshot atomically
    pub async fn save(&self, snapshot: &LedgerSnapshot) -> LedgerResult<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| LedgerError::Storage(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| LedgerError::Storage(format!("{}: {}", self.path.display(), e)))?;

        debug!(path = ?self.path, events = snapshot.events.len(), "Snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::Ledger;
    use crate::registry::DeviceRegistry;
    use shared::config::DeviceIdMode;
    use shared::types::{DeviceRegistrationRequest, Identity};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_snapshot() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("ledger.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested").join("ledger.json"));

        let ledger = Arc::new(Ledger::new());
        let registry = DeviceRegistry::new(
            Arc::clone(&ledger),
            Arc::new(ManualClock::at_unix(1_700_000_000)),
            DeviceIdMode::Sequential,
        );
        registry
            .register(
                &DeviceRegistrationRequest {
                    did: "did:iot:1".into(),
                    name: "Meter".into(),
                    ..Default::default()
                },
                &Identity::parse("0x00000000000000000000000000000000000000a1").unwrap(),
            )
            .unwrap();

        let snapshot = ledger.snapshot();
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = SnapshotStore::new(path);
        let err = store.load().await.unwrap_err();
        assert_eq!(err.category(), "storage");
    }
}
