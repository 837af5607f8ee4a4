//! Configuration management for dslboostd.
//!
//! Loads settings from /etc/dslboost/config.toml or uses defaults. Every
//! field has a serde default so a partial file is fine; a broken file falls
//! back to defaults with a warning rather than stopping the daemon.

use dslboost_shared::profile::{OptimizationProfile, ProfileTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/dslboost/config.toml";

/// Which gateway backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModemBackend {
    /// In-memory plant model, no network traffic
    Simulated,
    /// Real Keenetic router over HTTP
    Keenetic,
}

/// Modem connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    #[serde(default = "default_backend")]
    pub backend: ModemBackend,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_backend() -> ModemBackend {
    ModemBackend::Simulated
}

fn default_host() -> String {
    "192.168.1.1".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_protocol() -> String {
    "http".to_string()
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: default_host(),
            username: default_username(),
            password: String::new(),
            protocol: default_protocol(),
        }
    }
}

/// Background monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Seconds between samples
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Samples retained in the history ring
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_interval() -> u64 {
    3
}

fn default_history_capacity() -> usize {
    100
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            history_capacity: default_history_capacity(),
        }
    }
}

/// Backup store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub directory: String,

    /// Snapshots kept by scheduled pruning
    #[serde(default = "default_backup_keep")]
    pub keep: usize,

    /// Take a snapshot at daemon startup
    #[serde(default = "default_true")]
    pub auto_backup_on_start: bool,
}

fn default_backup_dir() -> String {
    "/var/lib/dslboost/backups".to_string()
}

fn default_backup_keep() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: default_backup_dir(),
            keep: default_backup_keep(),
            auto_backup_on_start: default_true(),
        }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub modem: ModemConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    /// Optimization profiles; empty means "use the built-in set"
    #[serde(default)]
    pub profiles: BTreeMap<String, OptimizationProfile>,
}

impl DaemonConfig {
    /// Load from the standard path, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<DaemonConfig>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "configuration loaded");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
        }
    }

    /// The profile rule table handed to the planner, immutable afterwards.
    pub fn profile_table(&self) -> ProfileTable {
        if self.profiles.is_empty() {
            return ProfileTable::builtin();
        }
        let mut table = ProfileTable::new();
        for (name, profile) in &self.profiles {
            table.insert(name, profile.clone());
        }
        table
    }
}
