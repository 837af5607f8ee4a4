//! Backup store - durable device-state snapshots and rollback.
//!
//! One pretty-printed JSON file per snapshot, named by a sortable
//! timestamp. The store tracks a "last known good" pointer that advances
//! only when a snapshot was actually written; restore goes back through the
//! gateway's full-state capability. A companion append-only JSONL log
//! records every snapshot for audit and rollback-by-reference.

use crate::gateway::{DeviceGateway, SharedGateway};
use crate::monitor::RollbackHandler;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dslboost_shared::error::BypassError;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

const BACKUP_FILE_PREFIX: &str = "modem_state_";
const BACKUP_FILE_SUFFIX: &str = ".json";
const HISTORY_LOG_FILENAME: &str = "backup_history.jsonl";

/// Audit record appended for every created snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupLogEntry {
    pub timestamp_utc: DateTime<Utc>,
    /// What prompted the snapshot ("startup", a profile name, "manual", ...)
    pub context: String,
    pub backup_file: String,
}

pub struct BackupStore {
    backup_dir: PathBuf,
    gateway: SharedGateway,
    last_known_good: RwLock<Option<String>>,
    /// Keeps names unique when several snapshots land in the same second.
    sequence: AtomicU64,
}

impl BackupStore {
    /// Open (or create) the backup directory. An existing newest snapshot
    /// becomes the initial known-good pointer so rollback survives a
    /// daemon restart.
    pub fn new(backup_dir: impl Into<PathBuf>, gateway: SharedGateway) -> Result<Self, BypassError> {
        let backup_dir = backup_dir.into();
        std::fs::create_dir_all(&backup_dir)?;

        let latest = list_dir(&backup_dir)?.into_iter().last();
        if let Some(file) = &latest {
            info!(file = %file, "resuming with existing snapshot as known good");
        }

        Ok(Self {
            backup_dir,
            gateway,
            last_known_good: RwLock::new(latest),
            sequence: AtomicU64::new(0),
        })
    }

    /// Pull the full device state and persist it. The known-good pointer
    /// advances only after the file is on disk.
    pub async fn create_snapshot(&self, context: &str) -> Result<String, BypassError> {
        let state = {
            let mut gateway = self.gateway.lock().await;
            gateway
                .get_full_state()
                .await
                .map_err(|e| BypassError::Gateway(e.to_string()))?
        };

        let bytes = serde_json::to_vec_pretty(&state)?;
        let file_name = self.next_backup_name();
        let path = self.backup_dir.join(&file_name);
        std::fs::write(&path, &bytes)?;

        *self.last_known_good.write().await = Some(file_name.clone());
        info!(file = %file_name, context, "configuration snapshot saved");

        // The audit log is best effort; a log failure must not unwind the
        // snapshot or the pointer.
        if let Err(e) = self.append_log(context, &file_name) {
            warn!(error = %e, "could not append backup history entry");
        }

        Ok(file_name)
    }

    /// Push a named snapshot back to the device. `false` means the file is
    /// missing or the device rejected the state; a corrupt file is an error.
    pub async fn restore(&self, file_name: &str) -> Result<bool, BypassError> {
        let path = self.backup_dir.join(file_name);
        if !path.exists() {
            warn!(file = %file_name, "backup file not found");
            return Ok(false);
        }

        let bytes = std::fs::read(&path)?;
        let state: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| BypassError::Backup(format!("corrupt backup {file_name}: {e}")))?;

        let result = {
            let mut gateway = self.gateway.lock().await;
            gateway.set_full_state(state).await
        };
        match result {
            Ok(()) => {
                info!(file = %file_name, "device state restored");
                Ok(true)
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "device rejected restored state");
                Ok(false)
            }
        }
    }

    /// Restore the tracked known-good snapshot.
    pub async fn restore_latest_known_good(&self) -> Result<bool, BypassError> {
        let target = self.last_known_good.read().await.clone();
        match target {
            Some(file_name) => self.restore(&file_name).await,
            None => Err(BypassError::NoKnownGoodBackup),
        }
    }

    /// Snapshot file names, oldest first. Names are sortable by creation.
    pub fn list(&self) -> Result<Vec<String>, BypassError> {
        list_dir(&self.backup_dir)
    }

    /// Most recent snapshot on disk.
    pub fn latest(&self) -> Result<Option<String>, BypassError> {
        Ok(self.list()?.into_iter().last())
    }

    pub async fn last_known_good(&self) -> Option<String> {
        self.last_known_good.read().await.clone()
    }

    /// Delete all but the `keep` most recent snapshots. The known-good
    /// target is never deleted. Returns how many files were removed.
    pub async fn prune(&self, keep: usize) -> Result<usize, BypassError> {
        let mut names = self.list()?;
        names.reverse(); // newest first
        let known_good = self.last_known_good.read().await.clone();

        let mut removed = 0;
        for name in names.into_iter().skip(keep) {
            if Some(&name) == known_good.as_ref() {
                continue;
            }
            std::fs::remove_file(self.backup_dir.join(&name))?;
            removed += 1;
        }
        if removed > 0 {
            info!(removed, keep, "pruned old snapshots");
        }
        Ok(removed)
    }

    /// All audit log entries, oldest first.
    pub fn log_entries(&self) -> Result<Vec<BackupLogEntry>, BypassError> {
        let path = self.backup_dir.join(HISTORY_LOG_FILENAME);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(entry) = serde_json::from_str::<BackupLogEntry>(&line) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn append_log(&self, context: &str, backup_file: &str) -> std::io::Result<()> {
        let entry = BackupLogEntry {
            timestamp_utc: Utc::now(),
            context: context.to_string(),
            backup_file: backup_file.to_string(),
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.backup_dir.join(HISTORY_LOG_FILENAME))?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        Ok(())
    }

    fn next_backup_name(&self) -> String {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{BACKUP_FILE_PREFIX}{stamp}-{seq:04}{BACKUP_FILE_SUFFIX}")
    }
}

fn list_dir(dir: &std::path::Path) -> Result<Vec<String>, BypassError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.starts_with(BACKUP_FILE_PREFIX) && name.ends_with(BACKUP_FILE_SUFFIX) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Monitor-side corrective action: restore the last known-good snapshot.
/// Goes through the store, which takes the shared gateway lock, so a
/// rollback never races an in-progress apply call.
pub struct RollbackToKnownGood {
    store: Arc<BackupStore>,
}

impl RollbackToKnownGood {
    pub fn new(store: Arc<BackupStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RollbackHandler for RollbackToKnownGood {
    async fn rollback(&self, reason: &str) -> bool {
        warn!(reason, "CRITICAL: automatic rollback triggered");
        match self.store.restore_latest_known_good().await {
            Ok(true) => true,
            Ok(false) => {
                error!("device rejected the known-good state");
                false
            }
            Err(e) => {
                error!(error = %e, "rollback could not run");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::shared;
    use crate::gateway::simulated::SimulatedModem;
    use dslboost_shared::params::{ParameterSet, PARAM_SNR_MARGIN};
    use tempfile::TempDir;

    fn store() -> (BackupStore, SimulatedModem, TempDir) {
        let dir = TempDir::new().unwrap();
        let modem = SimulatedModem::with_seed(99);
        let store = BackupStore::new(dir.path(), shared(modem.clone())).unwrap();
        (store, modem, dir)
    }

    #[tokio::test]
    async fn test_snapshot_restore_round_trip_byte_for_byte() {
        let (store, modem, dir) = store();

        let file_name = store.create_snapshot("test").await.unwrap();
        let saved_bytes = std::fs::read(dir.path().join(&file_name)).unwrap();

        // Wreck the plant, then restore the snapshot.
        let wreck = ParameterSet::new().with(PARAM_SNR_MARGIN, 24.0);
        {
            let gateway = shared(modem.clone());
            let mut gw = gateway.lock().await;
            gw.apply_parameters(&wreck).await.unwrap();
        }
        assert!((modem.snr_margin_db() - 24.0).abs() < 1e-9);

        assert!(store.restore(&file_name).await.unwrap());
        assert!((modem.snr_margin_db() - 12.0).abs() < 1e-9);

        // The state the device reports now serializes to exactly the bytes
        // that were written at snapshot time.
        let gateway = shared(modem);
        let state = gateway.lock().await.get_full_state().await.unwrap();
        assert_eq!(serde_json::to_vec_pretty(&state).unwrap(), saved_bytes);
    }

    #[tokio::test]
    async fn test_pointer_advances_only_on_creation() {
        let (store, _modem, _dir) = store();
        assert_eq!(store.last_known_good().await, None);

        let first = store.create_snapshot("one").await.unwrap();
        assert_eq!(store.last_known_good().await, Some(first));

        let second = store.create_snapshot("two").await.unwrap();
        assert_eq!(store.last_known_good().await, Some(second));
    }

    #[tokio::test]
    async fn test_restore_latest_known_good_without_backups() {
        let (store, _modem, _dir) = store();
        let err = store.restore_latest_known_good().await.unwrap_err();
        assert!(matches!(err, BypassError::NoKnownGoodBackup));
    }

    #[tokio::test]
    async fn test_restore_missing_file_returns_false() {
        let (store, _modem, _dir) = store();
        let restored = store.restore("modem_state_19700101-000000-0000.json").await;
        assert!(!restored.unwrap());
    }

    #[tokio::test]
    async fn test_restore_corrupt_file_is_an_error() {
        let (store, _modem, dir) = store();
        let name = "modem_state_20200101-000000-0000.json";
        std::fs::write(dir.path().join(name), b"{ not json").unwrap();

        let err = store.restore(name).await.unwrap_err();
        assert!(matches!(err, BypassError::Backup(_)));
    }

    #[tokio::test]
    async fn test_rejected_state_returns_false() {
        let (store, _modem, dir) = store();
        // Valid JSON the simulated device cannot load.
        let name = "modem_state_20200101-000000-0000.json";
        std::fs::write(dir.path().join(name), br#"{"wrong_shape": 1}"#).unwrap();

        assert!(!store.restore(name).await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_keeps_most_recent() {
        let (store, _modem, _dir) = store();
        for i in 0..5 {
            store.create_snapshot(&format!("ctx-{i}")).await.unwrap();
        }

        let removed = store.prune(2).await.unwrap();
        assert_eq!(removed, 3);

        let remaining = store.list().unwrap();
        assert_eq!(remaining.len(), 2);
        // The newest two survive, including the known-good pointer target.
        let known_good = store.last_known_good().await.unwrap();
        assert!(remaining.contains(&known_good));
    }

    #[tokio::test]
    async fn test_prune_never_deletes_known_good() {
        let (store, _modem, _dir) = store();
        store.create_snapshot("only").await.unwrap();

        let removed = store.prune(0).await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_log_records_every_snapshot() {
        let (store, _modem, _dir) = store();
        store.create_snapshot("startup").await.unwrap();
        store.create_snapshot("max_speed").await.unwrap();

        let entries = store.log_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].context, "startup");
        assert_eq!(entries[1].context, "max_speed");
        assert!(entries[1].backup_file.starts_with("modem_state_"));
    }

    #[tokio::test]
    async fn test_existing_snapshot_becomes_known_good_on_open() {
        let dir = TempDir::new().unwrap();
        let modem = SimulatedModem::with_seed(1);

        let first = BackupStore::new(dir.path(), shared(modem.clone())).unwrap();
        let file_name = first.create_snapshot("before-restart").await.unwrap();
        drop(first);

        let reopened = BackupStore::new(dir.path(), shared(modem)).unwrap();
        assert_eq!(reopened.last_known_good().await, Some(file_name));
    }

    #[tokio::test]
    async fn test_rollback_handler_restores_known_good() {
        let (store, modem, _dir) = store();
        let store = Arc::new(store);
        store.create_snapshot("good").await.unwrap();

        let wreck = ParameterSet::new().with(PARAM_SNR_MARGIN, 3.0);
        {
            let gateway = shared(modem.clone());
            gateway.lock().await.apply_parameters(&wreck).await.unwrap();
        }

        let handler = RollbackToKnownGood::new(Arc::clone(&store));
        assert!(handler.rollback("Line is down!").await);
        assert!((modem.snr_margin_db() - 12.0).abs() < 1e-9);
    }
}
