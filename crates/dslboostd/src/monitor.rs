//! Performance monitor - background sampling, history, analytics, alerts.
//!
//! The monitor owns the history ring and the alert log. Its loop samples
//! the gateway on a fixed interval; a failed sample is logged and skipped,
//! never fatal, and gaps in history are fine. Issue detection is the one
//! automatic-corrective-action trigger in the system: when it fires, an
//! alert is appended and the registered rollback handler (if any) runs.
//!
//! Stopping is cooperative: the stop intent is latched in a watch channel,
//! the current cycle finishes, then the task is joined with a bounded
//! timeout. A stop issued between cycles is never lost.

use crate::gateway::{DeviceGateway, SharedGateway};
use async_trait::async_trait;
use dslboost_shared::alert::{Alert, AlertLog};
use dslboost_shared::history::HistoryBuffer;
use dslboost_shared::status::StatusSnapshot;
use dslboost_shared::trend::{PerformanceSummary, Prediction, Trend, TrendReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Samples required before a trend can be fitted.
pub const TREND_MIN_SAMPLES: usize = 10;
/// Below this absolute slope the rate counts as stable (kbps per second).
pub const TREND_STABLE_SLOPE: f64 = 10.0;
/// How long `stop` waits for the loop to finish its cycle.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Corrective action invoked when the monitor detects an issue.
#[async_trait]
pub trait RollbackHandler: Send + Sync {
    /// Returns true when the rollback went through.
    async fn rollback(&self, reason: &str) -> bool;
}

struct MonitorState {
    history: RwLock<HistoryBuffer>,
    alerts: RwLock<AlertLog>,
    rollback: RwLock<Option<Arc<dyn RollbackHandler>>>,
}

struct LoopHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct PerformanceMonitor {
    gateway: SharedGateway,
    state: Arc<MonitorState>,
    running: Mutex<Option<LoopHandle>>,
}

impl PerformanceMonitor {
    pub fn new(gateway: SharedGateway, history_capacity: usize) -> Self {
        Self {
            gateway,
            state: Arc::new(MonitorState {
                history: RwLock::new(HistoryBuffer::new(history_capacity)),
                alerts: RwLock::new(AlertLog::new()),
                rollback: RwLock::new(None),
            }),
            running: Mutex::new(None),
        }
    }

    /// Register the corrective action taken when an issue is detected.
    pub async fn set_rollback_handler(&self, handler: Arc<dyn RollbackHandler>) {
        *self.state.rollback.write().await = Some(handler);
    }

    /// Start the background sampling loop.
    pub async fn start(&self, interval: Duration) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("monitoring is already running");
            return;
        }

        info!(interval_secs = interval.as_secs_f64(), "starting monitoring loop");
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let gateway = Arc::clone(&self.gateway);
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            info!("monitoring loop started");
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                sample_cycle(&gateway, &state).await;
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("monitoring loop stopped");
        });

        *running = Some(LoopHandle { stop_tx, task });
    }

    /// Signal the loop to stop, let the current cycle finish, then join
    /// with a bounded timeout.
    pub async fn stop(&self) {
        let Some(handle) = self.running.lock().await.take() else {
            warn!("monitoring is not running");
            return;
        };

        let _ = handle.stop_tx.send(true);
        match tokio::time::timeout(STOP_TIMEOUT, handle.task).await {
            Ok(Ok(())) => info!("monitoring stopped"),
            Ok(Err(e)) => error!(error = %e, "monitoring task failed"),
            Err(_) => warn!("monitoring task did not stop within timeout"),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// One sampling cycle: read status, append on success, run detection.
    /// The background loop calls this; it is public so callers can force a
    /// sample between ticks.
    pub async fn sample_once(&self) {
        sample_cycle(&self.gateway, &self.state).await;
    }

    /// Downstream-rate delta across the retained window. Zero until two
    /// samples exist.
    pub async fn track_improvement(&self) -> i64 {
        let history = self.state.history.read().await;
        if history.len() < 2 {
            return 0;
        }
        let first = history.first().expect("len checked").downstream_rate_kbps as i64;
        let last = history.last().expect("len checked").downstream_rate_kbps as i64;
        last - first
    }

    /// Check the latest sample for trouble: a line that is not up, or a
    /// failure counter that regressed against the oldest retained sample.
    /// On detection appends exactly one alert and invokes the rollback
    /// handler.
    pub async fn detect_issues(&self) -> bool {
        detect_issues_inner(&self.state).await
    }

    /// Fit a linear trend of downstream rate over elapsed time.
    pub async fn trend_analysis(&self) -> TrendReport {
        let history = self.state.history.read().await;
        let count = history.len();
        if count < TREND_MIN_SAMPLES {
            return TrendReport::insufficient(count);
        }

        let points = rate_points(&history);
        // Degenerate inputs fall back to a zero slope, which reads stable.
        let slope = fit_line(&points).map(|(slope, _)| slope).unwrap_or(0.0);

        let trend = if slope.abs() < TREND_STABLE_SLOPE {
            Trend::Stable
        } else if slope > 0.0 {
            Trend::Improving
        } else {
            Trend::Degrading
        };

        TrendReport {
            downstream_trend: trend,
            slope_kbps_per_sec: slope,
            sample_count: count,
        }
    }

    /// Extrapolate the fitted line `horizon_secs` past the last sample.
    /// Falls back to the last observed value when no fit is possible.
    pub async fn predict_ahead(&self, horizon_secs: u64) -> Prediction {
        let history = self.state.history.read().await;
        let last_rate = history
            .last()
            .map(|s| s.downstream_rate_kbps as f64)
            .unwrap_or(0.0);

        if history.len() >= TREND_MIN_SAMPLES {
            let points = rate_points(&history);
            if let Some((slope, intercept)) = fit_line(&points) {
                let last_x = points.last().expect("non-empty").0;
                let predicted = intercept + slope * (last_x + horizon_secs as f64);
                return Prediction {
                    horizon_secs,
                    predicted_downstream_kbps: predicted,
                    fallback: false,
                };
            }
        }

        Prediction {
            horizon_secs,
            predicted_downstream_kbps: last_rate,
            fallback: true,
        }
    }

    /// Aggregate numbers over the retained history.
    pub async fn performance_summary(&self) -> PerformanceSummary {
        let history = self.state.history.read().await;
        if history.is_empty() {
            return PerformanceSummary::default();
        }

        let rates: Vec<u32> = history.iter().map(|s| s.downstream_rate_kbps).collect();
        let sum: u64 = rates.iter().map(|&r| u64::from(r)).sum();
        let first = history.first().expect("non-empty").downstream_rate_kbps as i64;
        let last = history.last().expect("non-empty").downstream_rate_kbps as i64;

        PerformanceSummary {
            sample_count: rates.len(),
            average_down_rate_kbps: sum as f64 / rates.len() as f64,
            max_down_rate_kbps: *rates.iter().max().expect("non-empty"),
            min_down_rate_kbps: *rates.iter().min().expect("non-empty"),
            improvement_kbps: last - first,
        }
    }

    /// The most recent `limit` samples, oldest first.
    pub async fn history(&self, limit: usize) -> Vec<StatusSnapshot> {
        self.state.history.read().await.tail(limit)
    }

    pub async fn history_len(&self) -> usize {
        self.state.history.read().await.len()
    }

    /// All alerts, oldest first.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.state.alerts.read().await.entries().to_vec()
    }

    pub async fn alert_count(&self) -> usize {
        self.state.alerts.read().await.len()
    }
}

/// One loop iteration. Holds the gateway lock only for the read itself.
async fn sample_cycle(gateway: &SharedGateway, state: &Arc<MonitorState>) {
    let result = {
        let mut gateway = gateway.lock().await;
        gateway.get_status().await
    };

    match result {
        Ok(snapshot) => {
            state.history.write().await.push(snapshot);
            detect_issues_inner(state).await;
        }
        Err(e) => {
            // A bad sample is skipped; the gap is tolerated downstream.
            warn!(error = %e, "failed to get status from device, skipping sample");
        }
    }
}

async fn detect_issues_inner(state: &MonitorState) -> bool {
    let alert = {
        let history = state.history.read().await;
        let (Some(first), Some(last)) = (history.first(), history.last()) else {
            return false;
        };

        if !last.line_status.is_up() {
            Some(Alert::critical("Line is down!"))
        } else if last.failure_count > first.failure_count {
            Some(Alert::warning("Detected a new failure in operations."))
        } else {
            None
        }
    };

    let Some(alert) = alert else {
        return false;
    };

    warn!(severity = %alert.severity, "ALERT: {}", alert.message);
    let reason = alert.message.clone();
    state.alerts.write().await.append(alert);

    let handler = state.rollback.read().await.clone();
    if let Some(handler) = handler {
        if handler.rollback(&reason).await {
            info!("automatic rollback completed");
        } else {
            error!("automatic rollback failed");
        }
    }

    true
}

/// (elapsed seconds, downstream kbps) pairs relative to the oldest sample.
fn rate_points(history: &HistoryBuffer) -> Vec<(f64, f64)> {
    let Some(first) = history.first() else {
        return Vec::new();
    };
    history
        .iter()
        .map(|s| (s.seconds_since(first), s.downstream_rate_kbps as f64))
        .collect()
}

/// Least-squares fit. None when the fit is degenerate (fewer than two
/// points, or no spread on the time axis).
fn fit_line(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|p| (p.0 - mean_x) * (p.1 - mean_y))
        .sum();

    let slope = sxy / sxx;
    if !slope.is_finite() {
        return None;
    }
    Some((slope, mean_y - slope * mean_x))
}
