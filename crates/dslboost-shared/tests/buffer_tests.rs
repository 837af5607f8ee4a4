//! Tests for history.rs and alert.rs working together the way the monitor
//! drives them.

use dslboost_shared::alert::{Alert, AlertLog, AlertSeverity};
use dslboost_shared::history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
use dslboost_shared::status::{LineStatus, StatusSnapshot};

fn sample(rate: u32, failures: u64) -> StatusSnapshot {
    let mut snap = StatusSnapshot::line_down();
    snap.line_status = LineStatus::Up;
    snap.downstream_rate_kbps = rate;
    snap.failure_count = failures;
    snap
}

#[test]
fn test_default_capacity_is_100() {
    let buf = HistoryBuffer::default();
    assert_eq!(buf.capacity(), DEFAULT_HISTORY_CAPACITY);
}

#[test]
fn test_long_run_stays_bounded() {
    let mut buf = HistoryBuffer::default();
    for rate in 0..1_000u32 {
        buf.push(sample(rate, 0));
    }
    assert_eq!(buf.len(), 100);
    assert_eq!(buf.first().unwrap().downstream_rate_kbps, 900);
    assert_eq!(buf.last().unwrap().downstream_rate_kbps, 999);
}

#[test]
fn test_gap_tolerant_history() {
    // Failed samples are never appended; the buffer just has fewer entries.
    let mut buf = HistoryBuffer::new(10);
    buf.push(sample(50_000, 0));
    // ... two sampling failures here, nothing appended ...
    buf.push(sample(52_000, 0));
    assert_eq!(buf.len(), 2);
}

#[test]
fn test_alert_log_is_append_only_audit_trail() {
    let mut log = AlertLog::new();
    log.append(Alert::critical("Line is down!"));
    let first_ts = log.entries()[0].timestamp_utc;

    log.append(Alert::warning("Detected a new failure in operations."));
    assert_eq!(log.len(), 2);
    // Earlier entries are untouched by later appends.
    assert_eq!(log.entries()[0].timestamp_utc, first_ts);
    assert_eq!(log.entries()[0].severity, AlertSeverity::Critical);
}
