//! StatusSnapshot - single authoritative reading of the DSL line.
//!
//! Produced by the device gateway, consumed read-only by the planner, the
//! governor and the monitor. A snapshot is never mutated after capture.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Physical line state as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Up,
    Down,
}

impl LineStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, LineStatus::Up)
    }
}

impl std::fmt::Display for LineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineStatus::Up => write!(f, "Up"),
            LineStatus::Down => write!(f, "Down"),
        }
    }
}

/// One reading of the line, timestamped at capture.
///
/// `snr_margin_db` can be negative on a degenerate line; `attenuation_db`
/// is never negative. `crc_error_count`, `success_count` and
/// `failure_count` are monotonic counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Capture timestamp (UTC)
    pub timestamp_utc: DateTime<Utc>,
    /// Line state
    pub line_status: LineStatus,
    /// Downstream sync rate in kbps
    pub downstream_rate_kbps: u32,
    /// Upstream sync rate in kbps
    pub upstream_rate_kbps: u32,
    /// SNR margin headroom in dB (signed)
    pub snr_margin_db: f64,
    /// Line attenuation in dB (non-negative)
    pub attenuation_db: f64,
    /// CRC errors since line training
    pub crc_error_count: u64,
    /// Successful gateway operations
    pub success_count: u64,
    /// Failed gateway operations
    pub failure_count: u64,
}

impl StatusSnapshot {
    /// Snapshot of a line that is down; all metrics zeroed.
    pub fn line_down() -> Self {
        Self {
            timestamp_utc: Utc::now(),
            line_status: LineStatus::Down,
            downstream_rate_kbps: 0,
            upstream_rate_kbps: 0,
            snr_margin_db: 0.0,
            attenuation_db: 0.0,
            crc_error_count: 0,
            success_count: 0,
            failure_count: 0,
        }
    }

    /// Elapsed seconds between two snapshots (0 if `other` is not older).
    pub fn seconds_since(&self, other: &StatusSnapshot) -> f64 {
        let delta = self
            .timestamp_utc
            .signed_duration_since(other.timestamp_utc);
        (delta.num_milliseconds().max(0) as f64) / 1000.0
    }

    /// Downstream rate in Mbps for display.
    pub fn downstream_mbps(&self) -> f64 {
        self.downstream_rate_kbps as f64 / 1000.0
    }

    /// Upstream rate in Mbps for display.
    pub fn upstream_mbps(&self) -> f64 {
        self.upstream_rate_kbps as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_line_down_snapshot() {
        let snap = StatusSnapshot::line_down();
        assert_eq!(snap.line_status, LineStatus::Down);
        assert!(!snap.line_status.is_up());
        assert_eq!(snap.downstream_rate_kbps, 0);
    }

    #[test]
    fn test_seconds_since() {
        let mut a = StatusSnapshot::line_down();
        let b = a.clone();
        a.timestamp_utc = b.timestamp_utc + Duration::seconds(30);
        assert!((a.seconds_since(&b) - 30.0).abs() < 1e-9);
        // Not older: clamps to zero
        assert_eq!(b.seconds_since(&a), 0.0);
    }

    #[test]
    fn test_mbps_conversion() {
        let mut snap = StatusSnapshot::line_down();
        snap.downstream_rate_kbps = 80_000;
        snap.upstream_rate_kbps = 20_000;
        assert!((snap.downstream_mbps() - 80.0).abs() < 1e-9);
        assert!((snap.upstream_mbps() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut snap = StatusSnapshot::line_down();
        snap.line_status = LineStatus::Up;
        snap.snr_margin_db = -1.5;
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"up\""));
        let back: StatusSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.line_status, LineStatus::Up);
        assert!((back.snr_margin_db + 1.5).abs() < 1e-9);
    }
}
