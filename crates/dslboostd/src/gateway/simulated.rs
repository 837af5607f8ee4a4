//! Simulated modem backend - an in-memory plant model.
//!
//! The plant holds the line's physical parameters and derives sync rates
//! from them: lower attenuation and a lower SNR margin target both raise
//! the rate, with a little sampling jitter so history is not a flat line.
//! Full-state dumps carry only the plant parameters, never derived rates,
//! so a dump/restore cycle is exact.

use super::{DeviceGateway, GatewayMetrics};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use dslboost_shared::params::{
    ParameterSet, PARAM_ATTENUATION, PARAM_LINE_LENGTH, PARAM_SNR_MARGIN,
};
use dslboost_shared::status::{LineStatus, StatusSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Ideal-conditions downstream ceiling in kbps.
const BASE_DOWNSTREAM_KBPS: f64 = 120_000.0;
/// Rate lost per dB of attenuation.
const ATTENUATION_PENALTY_KBPS: f64 = 1_500.0;
/// Rate lost per dB of SNR margin headroom.
const SNR_PENALTY_KBPS: f64 = 2_000.0;
/// A line never syncs below this.
const FLOOR_DOWNSTREAM_KBPS: f64 = 8_000.0;

/// The plant parameters - everything a backup needs to reproduce the line.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlantState {
    line_up: bool,
    snr_margin_db: f64,
    attenuation_db: f64,
    line_length_m: f64,
    crc_error_count: u64,
}

impl Default for PlantState {
    fn default() -> Self {
        // A typical mid-length line before any optimization.
        Self {
            line_up: true,
            snr_margin_db: 12.0,
            attenuation_db: 18.5,
            line_length_m: 300.0,
            crc_error_count: 0,
        }
    }
}

struct Inner {
    plant: PlantState,
    rng: StdRng,
}

/// Simulated device. Clones share the same plant, which lets tests keep a
/// control handle while the daemon owns the boxed gateway.
#[derive(Clone)]
pub struct SimulatedModem {
    inner: Arc<Mutex<Inner>>,
    metrics: Arc<GatewayMetrics>,
}

impl SimulatedModem {
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    /// Deterministic plant for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                plant: PlantState::default(),
                rng: StdRng::seed_from_u64(seed),
            })),
            metrics: Arc::new(GatewayMetrics::new()),
        }
    }

    /// Drop or restore the physical line (test control).
    pub fn set_line_up(&self, up: bool) {
        self.inner.lock().expect("plant lock").plant.line_up = up;
    }

    /// Current SNR margin target (test observation).
    pub fn snr_margin_db(&self) -> f64 {
        self.inner.lock().expect("plant lock").plant.snr_margin_db
    }

    /// Current attenuation (test observation).
    pub fn attenuation_db(&self) -> f64 {
        self.inner.lock().expect("plant lock").plant.attenuation_db
    }

    /// Shared operation counters without going through the trait.
    pub fn metrics_handle(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    fn snapshot(&self) -> StatusSnapshot {
        let mut inner = self.inner.lock().expect("plant lock");

        if !inner.plant.line_up {
            let mut snap = StatusSnapshot::line_down();
            snap.success_count = self.metrics.success_count();
            snap.failure_count = self.metrics.failure_count();
            return snap;
        }

        // The occasional CRC error keeps the counter honest.
        if inner.rng.gen_ratio(1, 20) {
            inner.plant.crc_error_count += 1;
        }

        let jitter: f64 = inner.rng.gen_range(-250.0..250.0);
        let downstream = (BASE_DOWNSTREAM_KBPS
            - ATTENUATION_PENALTY_KBPS * inner.plant.attenuation_db
            - SNR_PENALTY_KBPS * inner.plant.snr_margin_db
            + jitter)
            .max(FLOOR_DOWNSTREAM_KBPS);
        let upstream = (downstream / 4.0).max(1_000.0);

        StatusSnapshot {
            timestamp_utc: Utc::now(),
            line_status: LineStatus::Up,
            downstream_rate_kbps: downstream as u32,
            upstream_rate_kbps: upstream as u32,
            snr_margin_db: inner.plant.snr_margin_db,
            attenuation_db: inner.plant.attenuation_db,
            crc_error_count: inner.plant.crc_error_count,
            success_count: self.metrics.success_count(),
            failure_count: self.metrics.failure_count(),
        }
    }
}

impl Default for SimulatedModem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceGateway for SimulatedModem {
    async fn get_status(&mut self) -> Result<StatusSnapshot> {
        let snap = self.snapshot();
        if snap.line_status != LineStatus::Up {
            debug!("simulated line is down, reporting zeroed status");
        }
        self.metrics.record_success();
        Ok(snap)
    }

    async fn apply_parameters(&mut self, params: &ParameterSet) -> Result<()> {
        if params.is_empty() {
            self.metrics.record_failure();
            return Err(anyhow!("refusing to apply an empty parameter set"));
        }

        let mut inner = self.inner.lock().expect("plant lock");
        if !inner.plant.line_up {
            drop(inner);
            self.metrics.record_failure();
            return Err(anyhow!("line is down, device rejects parameter changes"));
        }

        for (name, value) in params.iter() {
            match name {
                PARAM_SNR_MARGIN => inner.plant.snr_margin_db = value,
                PARAM_ATTENUATION => inner.plant.attenuation_db = value,
                PARAM_LINE_LENGTH => inner.plant.line_length_m = value,
                other => debug!(parameter = other, "simulated device ignores parameter"),
            }
        }
        drop(inner);

        self.metrics.record_success();
        Ok(())
    }

    async fn get_full_state(&mut self) -> Result<serde_json::Value> {
        let inner = self.inner.lock().expect("plant lock");
        let state = serde_json::to_value(&inner.plant)?;
        drop(inner);
        self.metrics.record_success();
        Ok(state)
    }

    async fn set_full_state(&mut self, state: serde_json::Value) -> Result<()> {
        let plant: PlantState = match serde_json::from_value(state) {
            Ok(p) => p,
            Err(e) => {
                self.metrics.record_failure();
                return Err(anyhow!("device rejected state blob: {e}"));
            }
        };
        self.inner.lock().expect("plant lock").plant = plant;
        self.metrics.record_success();
        Ok(())
    }

    fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }
}
