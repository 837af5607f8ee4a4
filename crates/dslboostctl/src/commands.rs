//! Command handlers - fetch from the daemon, render for the terminal.

use crate::client::DaemonClient;
use anyhow::Result;
use dslboost_shared::alert::{Alert, AlertSeverity};
use dslboost_shared::rpc::{
    DaemonStatus, HistoryParams, OptimizeParams, PredictParams, PruneParams, RestoreParams,
    RpcMethod,
};
use dslboost_shared::status::StatusSnapshot;
use dslboost_shared::trend::{PerformanceSummary, Prediction, TrendReport};
use owo_colors::OwoColorize;

fn print_snapshot(snap: &StatusSnapshot) {
    let status = if snap.line_status.is_up() {
        format!("{}", "Up".green())
    } else {
        format!("{}", "Down".red())
    };
    println!("  {:<22}: {}", "line status", status);
    println!(
        "  {:<22}: {:.2} Mbps",
        "downstream rate",
        snap.downstream_mbps()
    );
    println!("  {:<22}: {:.2} Mbps", "upstream rate", snap.upstream_mbps());
    println!("  {:<22}: {:.1} dB", "snr margin", snap.snr_margin_db);
    println!("  {:<22}: {:.1} dB", "attenuation", snap.attenuation_db);
    println!("  {:<22}: {}", "crc errors", snap.crc_error_count);
}

pub async fn status(client: &mut DaemonClient) -> Result<()> {
    let result = client.call(RpcMethod::Status, None).await?;
    let status: DaemonStatus = serde_json::from_value(result)?;

    println!("{}", "dslboostd".bold());
    println!("  {:<22}: {}", "version", status.version);
    println!("  {:<22}: {}s", "uptime", status.uptime_secs);
    println!(
        "  {:<22}: {}",
        "monitor",
        if status.monitor_running {
            format!("{}", "running".green())
        } else {
            format!("{}", "stopped".red())
        }
    );
    println!("  {:<22}: {}", "history samples", status.history_len);
    println!("  {:<22}: {}", "alerts", status.alert_count);

    match &status.latest {
        Some(snap) => {
            println!("\n{}", "current line".bold());
            print_snapshot(snap);
        }
        None => println!("\nno samples collected yet"),
    }
    Ok(())
}

pub async fn optimize(client: &mut DaemonClient, profile: String) -> Result<()> {
    println!("running bypass sequence with profile '{}'...", profile.bold());
    let params = serde_json::to_value(OptimizeParams { profile })?;
    let result = client.call(RpcMethod::Optimize, Some(params)).await?;

    let initial: StatusSnapshot = serde_json::from_value(result["initial"].clone())?;
    println!("\n{}", "before".bold());
    print_snapshot(&initial);

    println!(
        "\n  {:<22}: {}",
        "assessed risk",
        result["risk"].as_str().unwrap_or("unknown")
    );

    if result["final_status"].is_null() {
        let reason = result["verify_error"].as_str().unwrap_or("unknown");
        println!(
            "{}",
            format!("applied, but verification failed: {reason}").yellow()
        );
        return Ok(());
    }

    let final_status: StatusSnapshot = serde_json::from_value(result["final_status"].clone())?;
    println!("\n{}", "after".bold());
    print_snapshot(&final_status);

    let delta =
        final_status.downstream_rate_kbps as i64 - initial.downstream_rate_kbps as i64;
    if delta > 0 {
        println!("\n{}", format!("downstream improved by {delta} kbps").green());
    } else {
        println!("\ndownstream changed by {delta} kbps");
    }
    Ok(())
}

pub async fn history(client: &mut DaemonClient, limit: usize) -> Result<()> {
    let params = serde_json::to_value(HistoryParams { limit })?;
    let result = client.call(RpcMethod::History, Some(params)).await?;
    let samples: Vec<StatusSnapshot> = serde_json::from_value(result)?;

    if samples.is_empty() {
        println!("no samples collected yet");
        return Ok(());
    }

    println!(
        "{:<22} {:>6} {:>12} {:>10} {:>8}",
        "timestamp".bold(),
        "line".bold(),
        "down (kbps)".bold(),
        "snr (dB)".bold(),
        "crc".bold()
    );
    for snap in samples {
        println!(
            "{:<22} {:>6} {:>12} {:>10.1} {:>8}",
            snap.timestamp_utc.format("%Y-%m-%d %H:%M:%S"),
            snap.line_status.to_string(),
            snap.downstream_rate_kbps,
            snap.snr_margin_db,
            snap.crc_error_count
        );
    }
    Ok(())
}

pub async fn alerts(client: &mut DaemonClient) -> Result<()> {
    let result = client.call(RpcMethod::Alerts, None).await?;
    let alerts: Vec<Alert> = serde_json::from_value(result)?;

    if alerts.is_empty() {
        println!("{}", "no alerts".green());
        return Ok(());
    }

    for alert in alerts {
        let severity = match alert.severity {
            AlertSeverity::Critical => format!("{}", "critical".red().bold()),
            AlertSeverity::Warning => format!("{}", "warning".yellow()),
        };
        println!(
            "{}  [{}] {}",
            alert.timestamp_utc.format("%Y-%m-%d %H:%M:%S"),
            severity,
            alert.message
        );
    }
    Ok(())
}

pub async fn analytics(client: &mut DaemonClient) -> Result<()> {
    let result = client.call(RpcMethod::Analytics, None).await?;
    let summary: PerformanceSummary = serde_json::from_value(result)?;

    println!("{}", "performance".bold());
    println!("  {:<22}: {}", "samples", summary.sample_count);
    println!(
        "  {:<22}: {:.0} kbps",
        "average downstream", summary.average_down_rate_kbps
    );
    println!("  {:<22}: {} kbps", "max downstream", summary.max_down_rate_kbps);
    println!("  {:<22}: {} kbps", "min downstream", summary.min_down_rate_kbps);
    println!("  {:<22}: {} kbps", "improvement", summary.improvement_kbps);
    Ok(())
}

pub async fn trend(client: &mut DaemonClient) -> Result<()> {
    let result = client.call(RpcMethod::Trend, None).await?;
    let report: TrendReport = serde_json::from_value(result)?;

    println!(
        "downstream trend: {} (slope {:.1} kbps/s over {} samples)",
        report.downstream_trend.to_string().bold(),
        report.slope_kbps_per_sec,
        report.sample_count
    );
    Ok(())
}

pub async fn predict(client: &mut DaemonClient, horizon_secs: u64) -> Result<()> {
    let params = serde_json::to_value(PredictParams { horizon_secs })?;
    let result = client.call(RpcMethod::Predict, Some(params)).await?;
    let prediction: Prediction = serde_json::from_value(result)?;

    if prediction.fallback {
        println!(
            "not enough history to extrapolate; last observed rate: {:.0} kbps",
            prediction.predicted_downstream_kbps
        );
    } else {
        println!(
            "predicted downstream in {}s: {:.0} kbps",
            prediction.horizon_secs, prediction.predicted_downstream_kbps
        );
    }
    Ok(())
}

pub async fn backup_create(client: &mut DaemonClient) -> Result<()> {
    let result = client.call(RpcMethod::BackupCreate, None).await?;
    println!(
        "{} {}",
        "snapshot saved:".green(),
        result["backup_file"].as_str().unwrap_or("?")
    );
    Ok(())
}

pub async fn backup_list(client: &mut DaemonClient) -> Result<()> {
    let result = client.call(RpcMethod::BackupList, None).await?;
    let backups = result["backups"].as_array().cloned().unwrap_or_default();
    let known_good = result["last_known_good"].as_str().map(str::to_string);

    if backups.is_empty() {
        println!("no snapshots yet");
        return Ok(());
    }

    for file in backups {
        let name = file.as_str().unwrap_or("?");
        if Some(name) == known_good.as_deref() {
            println!("{} {}", name, "(known good)".green());
        } else {
            println!("{name}");
        }
    }
    Ok(())
}

pub async fn backup_restore(client: &mut DaemonClient, file: Option<String>) -> Result<()> {
    let params = serde_json::to_value(RestoreParams { file })?;
    let result = client.call(RpcMethod::BackupRestore, Some(params)).await?;

    if result["restored"].as_bool() == Some(true) {
        println!("{}", "device state restored".green());
    } else {
        println!("{}", "restore failed: file missing or device rejected it".red());
    }
    Ok(())
}

pub async fn backup_prune(client: &mut DaemonClient, keep: usize) -> Result<()> {
    let params = serde_json::to_value(PruneParams { keep })?;
    let result = client.call(RpcMethod::BackupPrune, Some(params)).await?;
    println!(
        "removed {} snapshot(s)",
        result["removed"].as_u64().unwrap_or(0)
    );
    Ok(())
}
