//! Error types for DSL Boost.
//!
//! One typed taxonomy for the whole bypass pipeline. Every variant maps to a
//! stable numeric code so RPC clients can match on it without string parsing.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BypassError {
    #[error("Could not read status from the device")]
    StatusUnavailable,

    #[error("Optimization profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("Safety validation rejected parameter '{parameter}' = {value}")]
    SafetyRejected { parameter: String, value: f64 },

    #[error("Risk level too high to apply: {0}")]
    RiskTooHigh(String),

    #[error("Device rejected the new parameters")]
    ApplyFailed,

    #[error("Post-apply verification could not re-read status: {0}")]
    VerifyIncomplete(String),

    #[error("Another bypass operation is already in flight")]
    OperationInProgress,

    #[error("No known-good backup available to roll back to")]
    NoKnownGoodBackup,

    #[error("Backup store error: {0}")]
    Backup(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BypassError {
    pub fn code(&self) -> i32 {
        match self {
            BypassError::StatusUnavailable => -32000,
            BypassError::ProfileNotFound(_) => -32001,
            BypassError::SafetyRejected { .. } => -32002,
            BypassError::RiskTooHigh(_) => -32003,
            BypassError::ApplyFailed => -32004,
            BypassError::VerifyIncomplete(_) => -32005,
            BypassError::OperationInProgress => -32006,
            BypassError::NoKnownGoodBackup => -32007,
            BypassError::Backup(_) => -32008,
            BypassError::Gateway(_) => -32009,
            BypassError::Io(_) => -32010,
            BypassError::Json(_) => -32700,
        }
    }
}
