//! DSL Boost daemon - closed-loop line parameter control.
//!
//! Samples the device in the background, serves the ctl over a Unix
//! socket, and rolls back to the last known-good snapshot when the monitor
//! detects trouble.

use anyhow::Result;
use dslboostd::backup::{BackupStore, RollbackToKnownGood};
use dslboostd::config::{DaemonConfig, ModemBackend};
use dslboostd::gateway::{self, DeviceGateway, SharedGateway};
use dslboostd::governor::SafetyGovernor;
use dslboostd::monitor::PerformanceMonitor;
use dslboostd::orchestrator::BypassOrchestrator;
use dslboostd::planner::ParameterPlanner;
use dslboostd::rpc_server::{self, DaemonState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};

fn build_gateway(config: &DaemonConfig) -> SharedGateway {
    match config.modem.backend {
        ModemBackend::Simulated => {
            info!("using simulated modem backend");
            gateway::shared(gateway::simulated::SimulatedModem::new())
        }
        ModemBackend::Keenetic => {
            info!(host = %config.modem.host, "using Keenetic modem backend");
            gateway::shared(gateway::keenetic::KeeneticClient::new(
                &config.modem.host,
                &config.modem.username,
                &config.modem.password,
                &config.modem.protocol,
            ))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("dslboostd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = DaemonConfig::load();
    let gateway = build_gateway(&config);
    let metrics = gateway.lock().await.metrics();

    let backup = Arc::new(BackupStore::new(&config.backup.directory, Arc::clone(&gateway))?);
    if config.backup.auto_backup_on_start {
        match backup.create_snapshot("startup").await {
            Ok(file) => info!(file = %file, "startup snapshot created"),
            Err(e) => warn!(error = %e, "startup snapshot failed, continuing without it"),
        }
    }

    let monitor = Arc::new(PerformanceMonitor::new(
        Arc::clone(&gateway),
        config.monitoring.history_capacity,
    ));
    monitor
        .set_rollback_handler(Arc::new(RollbackToKnownGood::new(Arc::clone(&backup))))
        .await;
    monitor
        .start(Duration::from_secs(config.monitoring.interval_secs))
        .await;

    let orchestrator = Arc::new(BypassOrchestrator::new(
        Arc::clone(&gateway),
        ParameterPlanner::new(config.profile_table()),
        SafetyGovernor::standard(metrics),
    ));

    let state = Arc::new(DaemonState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        start_time: Instant::now(),
        monitor: Arc::clone(&monitor),
        orchestrator,
        backup,
    });

    info!("dslboostd ready");

    tokio::select! {
        result = rpc_server::start_server(state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    monitor.stop().await;
    info!("shutdown complete");

    Ok(())
}
