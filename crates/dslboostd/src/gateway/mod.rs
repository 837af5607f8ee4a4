//! Device gateway - the single capability interface to the physical modem.
//!
//! One trait, variant backends: `SimulatedModem` for the in-memory plant
//! model, `KeeneticClient` for the real HTTP command channel. Everything
//! above this module (orchestrator, monitor, backup store) is backend
//! agnostic.
//!
//! The device has no notion of concurrent sessions, so the daemon shares a
//! single gateway behind a mutex and holds the lock for one call at a time.

pub mod keenetic;
pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;
use dslboost_shared::params::ParameterSet;
use dslboost_shared::status::StatusSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Operation counters shared between a gateway and its callers.
///
/// The safety governor records validation failures here so they are visible
/// alongside the gateway's own operation outcomes.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    success: AtomicU64,
    failure: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }
}

/// Capability interface to one physical device.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Read the current line status.
    async fn get_status(&mut self) -> Result<StatusSnapshot>;

    /// Push a set of target parameters to the device.
    async fn apply_parameters(&mut self, params: &ParameterSet) -> Result<()>;

    /// Dump the full device state for backup.
    async fn get_full_state(&mut self) -> Result<serde_json::Value>;

    /// Push a previously dumped state back to the device.
    async fn set_full_state(&mut self, state: serde_json::Value) -> Result<()>;

    /// Shared operation counters.
    fn metrics(&self) -> Arc<GatewayMetrics>;
}

/// The one logical connection to the device, serialized per call.
pub type SharedGateway = Arc<Mutex<Box<dyn DeviceGateway>>>;

/// Wrap a backend into the shared, serialized form.
pub fn shared(gateway: impl DeviceGateway + 'static) -> SharedGateway {
    let boxed: Box<dyn DeviceGateway> = Box::new(gateway);
    Arc::new(Mutex::new(boxed))
}
