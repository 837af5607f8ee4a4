//! Monitor alerts - append-only audit trail.
//!
//! An alert is never mutated or removed once created. Consumers get clones;
//! only the monitor appends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// One alert raised by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub message: String,
    pub timestamp_utc: DateTime<Utc>,
    pub severity: AlertSeverity,
}

impl Alert {
    pub fn new(message: impl Into<String>, severity: AlertSeverity) -> Self {
        Self {
            message: message.into(),
            timestamp_utc: Utc::now(),
            severity,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, AlertSeverity::Warning)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(message, AlertSeverity::Critical)
    }
}

/// In-memory append-only alert log.
#[derive(Debug, Clone, Default)]
pub struct AlertLog {
    entries: Vec<Alert>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, alert: Alert) {
        self.entries.push(alert);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only view of all entries, oldest first.
    pub fn entries(&self) -> &[Alert] {
        &self.entries
    }

    /// The most recent `limit` entries, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<Alert> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries[skip..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_growth() {
        let mut log = AlertLog::new();
        assert!(log.is_empty());
        log.append(Alert::critical("Line is down!"));
        log.append(Alert::warning("CRC errors rising"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].severity, AlertSeverity::Critical);
        assert_eq!(log.entries()[1].message, "CRC errors rising");
    }

    #[test]
    fn test_tail() {
        let mut log = AlertLog::new();
        for i in 0..5 {
            log.append(Alert::warning(format!("alert {i}")));
        }
        let tail = log.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "alert 3");
        assert_eq!(tail[1].message, "alert 4");
    }
}
