//! Read-only analytics views derived from the monitor's history.
//!
//! These are wire types: the daemon computes them, the ctl renders them.

use serde::{Deserialize, Serialize};

/// Trend classification of the downstream rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    InsufficientData,
    Stable,
    Improving,
    Degrading,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::InsufficientData => write!(f, "insufficient_data"),
            Trend::Stable => write!(f, "stable"),
            Trend::Improving => write!(f, "improving"),
            Trend::Degrading => write!(f, "degrading"),
        }
    }
}

/// Result of a trend analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReport {
    pub downstream_trend: Trend,
    /// Fitted slope in kbps per second (0.0 when not enough data)
    pub slope_kbps_per_sec: f64,
    /// Samples the fit was computed over
    pub sample_count: usize,
}

impl TrendReport {
    pub fn insufficient(sample_count: usize) -> Self {
        Self {
            downstream_trend: Trend::InsufficientData,
            slope_kbps_per_sec: 0.0,
            sample_count,
        }
    }
}

/// Extrapolated downstream rate at a future point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Seconds past the last sample the prediction targets
    pub horizon_secs: u64,
    /// Predicted downstream rate in kbps
    pub predicted_downstream_kbps: f64,
    /// True when the fit failed and the last observed value was used
    pub fallback: bool,
}

/// Aggregate numbers over the retained history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub sample_count: usize,
    pub average_down_rate_kbps: f64,
    pub max_down_rate_kbps: u32,
    pub min_down_rate_kbps: u32,
    /// last - first downstream rate over the retained window
    pub improvement_kbps: i64,
}
