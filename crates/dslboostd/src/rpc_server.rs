//! RPC server - Unix socket server for daemon-client communication.
//!
//! Line-delimited JSON-RPC 2.0. Every connection gets its own task; the
//! shared state is the monitor, the orchestrator and the backup store.

use crate::backup::BackupStore;
use crate::monitor::PerformanceMonitor;
use crate::orchestrator::BypassOrchestrator;
use anyhow::{Context, Result};
use dslboost_shared::error::BypassError;
use dslboost_shared::rpc::{
    DaemonStatus, HistoryParams, OptimizeParams, PredictParams, PruneParams, RestoreParams,
    RpcMethod, RpcRequest, RpcResponse,
};
use dslboost_shared::SOCKET_PATH;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};

/// Daemon state shared across connections
pub struct DaemonState {
    pub version: String,
    pub start_time: Instant,
    pub monitor: Arc<PerformanceMonitor>,
    pub orchestrator: Arc<BypassOrchestrator>,
    pub backup: Arc<BackupStore>,
}

/// Start the RPC server on the standard socket path.
pub async fn start_server(state: Arc<DaemonState>) -> Result<()> {
    start_server_on(state, SOCKET_PATH).await
}

pub async fn start_server_on(state: Arc<DaemonState>, socket_path: &str) -> Result<()> {
    let socket_dir = Path::new(socket_path)
        .parent()
        .context("socket path has no parent directory")?;
    tokio::fs::create_dir_all(socket_dir)
        .await
        .context("failed to create socket directory")?;

    // Remove a stale socket from a previous run
    let _ = tokio::fs::remove_file(socket_path).await;

    let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;
    info!(path = socket_path, "RPC server listening");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o660))?;
    }

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        error!(error = %e, "connection handler error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<DaemonState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .context("failed to read from socket")?;
        if bytes_read == 0 {
            break;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "invalid request JSON");
                continue;
            }
        };

        let response = handle_request(request, &state).await;
        let response_json = serde_json::to_string(&response)? + "\n";
        writer
            .write_all(response_json.as_bytes())
            .await
            .context("failed to write response")?;
    }

    Ok(())
}

fn bypass_error_response(id: String, e: &BypassError) -> RpcResponse {
    RpcResponse::error(id, e.code(), e.to_string())
}

async fn handle_request(request: RpcRequest, state: &DaemonState) -> RpcResponse {
    let id = request.id.clone();

    macro_rules! parse_params {
        ($ty:ty) => {
            match request
                .params
                .clone()
                .map(serde_json::from_value::<$ty>)
                .transpose()
            {
                Ok(params) => params,
                Err(e) => {
                    return RpcResponse::error(id, -32602, format!("invalid params: {e}"));
                }
            }
        };
    }

    match request.method {
        RpcMethod::Status => {
            let status = DaemonStatus {
                version: state.version.clone(),
                uptime_secs: state.start_time.elapsed().as_secs(),
                monitor_running: state.monitor.is_running().await,
                history_len: state.monitor.history_len().await,
                alert_count: state.monitor.alert_count().await,
                latest: state.monitor.history(1).await.into_iter().next(),
            };
            RpcResponse::success(id, serde_json::json!(status))
        }

        RpcMethod::Optimize => {
            let Some(params) = parse_params!(OptimizeParams) else {
                return RpcResponse::error(id, -32602, "missing optimize params".to_string());
            };
            match state.orchestrator.execute(&params.profile).await {
                Ok(outcome) => RpcResponse::success(id, serde_json::json!(outcome)),
                Err(e) => bypass_error_response(id, &e),
            }
        }

        RpcMethod::History => {
            let params = parse_params!(HistoryParams).unwrap_or(HistoryParams { limit: 20 });
            let samples = state.monitor.history(params.limit).await;
            RpcResponse::success(id, serde_json::json!(samples))
        }

        RpcMethod::Alerts => {
            let alerts = state.monitor.alerts().await;
            RpcResponse::success(id, serde_json::json!(alerts))
        }

        RpcMethod::Analytics => {
            let summary = state.monitor.performance_summary().await;
            RpcResponse::success(id, serde_json::json!(summary))
        }

        RpcMethod::Trend => {
            let report = state.monitor.trend_analysis().await;
            RpcResponse::success(id, serde_json::json!(report))
        }

        RpcMethod::Predict => {
            let Some(params) = parse_params!(PredictParams) else {
                return RpcResponse::error(id, -32602, "missing predict params".to_string());
            };
            let prediction = state.monitor.predict_ahead(params.horizon_secs).await;
            RpcResponse::success(id, serde_json::json!(prediction))
        }

        RpcMethod::BackupCreate => match state.backup.create_snapshot("manual").await {
            Ok(file) => RpcResponse::success(id, serde_json::json!({ "backup_file": file })),
            Err(e) => bypass_error_response(id, &e),
        },

        RpcMethod::BackupList => match state.backup.list() {
            Ok(files) => {
                let known_good = state.backup.last_known_good().await;
                RpcResponse::success(
                    id,
                    serde_json::json!({ "backups": files, "last_known_good": known_good }),
                )
            }
            Err(e) => bypass_error_response(id, &e),
        },

        RpcMethod::BackupRestore => {
            let params = parse_params!(RestoreParams).unwrap_or_default();
            let result = match params.file {
                Some(file) => state.backup.restore(&file).await,
                None => state.backup.restore_latest_known_good().await,
            };
            match result {
                Ok(restored) => RpcResponse::success(id, serde_json::json!({ "restored": restored })),
                Err(e) => bypass_error_response(id, &e),
            }
        }

        RpcMethod::BackupPrune => {
            let Some(params) = parse_params!(PruneParams) else {
                return RpcResponse::error(id, -32602, "missing prune params".to_string());
            };
            match state.backup.prune(params.keep).await {
                Ok(removed) => RpcResponse::success(id, serde_json::json!({ "removed": removed })),
                Err(e) => bypass_error_response(id, &e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::shared;
    use crate::gateway::simulated::SimulatedModem;
    use crate::governor::SafetyGovernor;
    use crate::orchestrator::BypassOrchestrator;
    use crate::planner::ParameterPlanner;
    use dslboost_shared::profile::ProfileTable;
    use tempfile::TempDir;

    async fn daemon_state() -> (Arc<DaemonState>, TempDir) {
        let dir = TempDir::new().unwrap();
        let modem = SimulatedModem::with_seed(5);
        let gateway = shared(modem.clone());
        let metrics = modem.metrics_handle();

        let monitor = Arc::new(PerformanceMonitor::new(Arc::clone(&gateway), 100));
        let orchestrator = Arc::new(BypassOrchestrator::new(
            Arc::clone(&gateway),
            ParameterPlanner::new(ProfileTable::builtin()),
            SafetyGovernor::standard(metrics),
        ));
        let backup = Arc::new(BackupStore::new(dir.path(), gateway).unwrap());

        (
            Arc::new(DaemonState {
                version: "test".to_string(),
                start_time: Instant::now(),
                monitor,
                orchestrator,
                backup,
            }),
            dir,
        )
    }

    #[tokio::test]
    async fn test_status_request() {
        let (state, _dir) = daemon_state().await;
        let req = RpcRequest::new(RpcMethod::Status, None);
        let resp = handle_request(req, &state).await;

        assert!(resp.error.is_none());
        let status: DaemonStatus = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(status.version, "test");
        assert!(!status.monitor_running);
    }

    #[tokio::test]
    async fn test_optimize_request_runs_sequence() {
        let (state, _dir) = daemon_state().await;
        let params = serde_json::to_value(OptimizeParams {
            profile: "max_speed".to_string(),
        })
        .unwrap();
        let req = RpcRequest::new(RpcMethod::Optimize, Some(params));
        let resp = handle_request(req, &state).await;
        assert!(resp.error.is_none(), "unexpected error: {:?}", resp.error);
    }

    #[tokio::test]
    async fn test_optimize_unknown_profile_maps_error_code() {
        let (state, _dir) = daemon_state().await;
        let params = serde_json::to_value(OptimizeParams {
            profile: "warp_drive".to_string(),
        })
        .unwrap();
        let req = RpcRequest::new(RpcMethod::Optimize, Some(params));
        let resp = handle_request(req, &state).await;

        let error = resp.error.unwrap();
        assert_eq!(
            error.code,
            BypassError::ProfileNotFound("warp_drive".to_string()).code()
        );
    }

    #[tokio::test]
    async fn test_backup_create_then_list() {
        let (state, _dir) = daemon_state().await;

        let resp = handle_request(RpcRequest::new(RpcMethod::BackupCreate, None), &state).await;
        assert!(resp.error.is_none());

        let resp = handle_request(RpcRequest::new(RpcMethod::BackupList, None), &state).await;
        let result = resp.result.unwrap();
        assert_eq!(result["backups"].as_array().unwrap().len(), 1);
        assert!(result["last_known_good"].is_string());
    }

    #[tokio::test]
    async fn test_restore_without_backups_reports_error() {
        let (state, _dir) = daemon_state().await;
        let resp = handle_request(RpcRequest::new(RpcMethod::BackupRestore, None), &state).await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, BypassError::NoKnownGoodBackup.code());
    }

    #[tokio::test]
    async fn test_predict_requires_params() {
        let (state, _dir) = daemon_state().await;
        let resp = handle_request(RpcRequest::new(RpcMethod::Predict, None), &state).await;
        assert_eq!(resp.error.unwrap().code, -32602);
    }
}
