//! DSL Boost daemon library.
//!
//! Core closed-loop control: read the line, compute targets from a profile,
//! gate them through the safety governor, apply through the device gateway,
//! verify. A background monitor samples continuously and can trigger a
//! rollback to the last known-good backup.

pub mod backup;
pub mod config;
pub mod gateway;
pub mod governor;
pub mod monitor;
pub mod orchestrator;
pub mod planner;
pub mod rpc_server;
