//! JSON-RPC 2.0 types for dslboostd communication.
//!
//! Line-delimited over the daemon's Unix socket; one request, one response.

use serde::{Deserialize, Serialize};

/// RPC methods supported by dslboostd
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RpcMethod {
    /// Daemon health + latest line status
    Status,
    /// Run the five-phase bypass sequence for a profile
    Optimize,
    /// Recent history samples
    History,
    /// Alert log
    Alerts,
    /// Aggregate performance numbers
    Analytics,
    /// Downstream rate trend classification
    Trend,
    /// Extrapolated future rate
    Predict,
    /// Create a backup snapshot now
    BackupCreate,
    /// List backup snapshots
    BackupList,
    /// Restore a named snapshot, or the last known good one
    BackupRestore,
    /// Delete all but the most recent N snapshots
    BackupPrune,
}

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: RpcMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    pub id: String,
}

impl RpcRequest {
    pub fn new(method: RpcMethod, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method,
            params,
            id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: String,
}

impl RpcResponse {
    pub fn success(id: String, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: String, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(RpcError { code, message }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// Parameters for the optimize method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeParams {
    pub profile: String,
}

/// Parameters for the history method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

/// Parameters for the predict method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictParams {
    pub horizon_secs: u64,
}

/// Parameters for the backup_restore method
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreParams {
    /// Snapshot file name; omitted means "last known good"
    #[serde(default)]
    pub file: Option<String>,
}

/// Parameters for the backup_prune method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneParams {
    pub keep: usize,
}

/// Daemon status payload for the status method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub monitor_running: bool,
    pub history_len: usize,
    pub alert_count: usize,
    /// Latest sampled line status, if any
    pub latest: Option<crate::status::StatusSnapshot>,
}
