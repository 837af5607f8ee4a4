//! Bypass orchestrator - the five-phase apply sequence.
//!
//! Read -> Plan -> Check -> Apply -> Verify, strictly ordered, any failure
//! short-circuits with a typed error. At most one sequence is in flight at
//! a time; a second invocation is rejected, never interleaved. The gateway
//! lock is held per call, not across phases, so the monitor keeps sampling
//! between phases.
//!
//! There are no retries here and no rollback: rollback is the monitor's
//! alert-triggered path, retry policy belongs to the caller.

use crate::gateway::{DeviceGateway, SharedGateway};
use crate::governor::SafetyGovernor;
use crate::planner::ParameterPlanner;
use dslboost_shared::error::BypassError;
use dslboost_shared::params::{ParameterSet, RiskLevel};
use dslboost_shared::status::StatusSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Result of a completed bypass sequence, kept for audit display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassOutcome {
    /// Line state before anything was touched
    pub initial: StatusSnapshot,
    /// What was applied
    pub applied_params: ParameterSet,
    /// Risk level the governor assessed (Medium proceeds, but is recorded)
    pub risk: RiskLevel,
    /// Line state re-read after apply; None when verification failed
    pub final_status: Option<StatusSnapshot>,
    /// Why verification is missing, when it is
    pub verify_error: Option<String>,
}

pub struct BypassOrchestrator {
    gateway: SharedGateway,
    planner: ParameterPlanner,
    governor: SafetyGovernor,
    in_flight: Mutex<()>,
}

impl BypassOrchestrator {
    pub fn new(gateway: SharedGateway, planner: ParameterPlanner, governor: SafetyGovernor) -> Self {
        Self {
            gateway,
            planner,
            governor,
            in_flight: Mutex::new(()),
        }
    }

    /// Run the full sequence for one profile.
    pub async fn execute(&self, profile: &str) -> Result<BypassOutcome, BypassError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| BypassError::OperationInProgress)?;

        info!(profile, "starting bypass sequence");

        // Phase 1: Read
        let initial = {
            let mut gateway = self.gateway.lock().await;
            gateway.get_status().await.map_err(|e| {
                warn!(error = %e, "failed to read current status, aborting");
                BypassError::StatusUnavailable
            })?
        };
        info!(
            rate_kbps = initial.downstream_rate_kbps,
            snr_db = initial.snr_margin_db,
            attenuation_db = initial.attenuation_db,
            "phase 1/5: current status read"
        );

        // Phase 2: Plan
        let params = self.planner.plan(&initial, profile)?;
        info!(?params, "phase 2/5: target parameters planned");

        // Phase 3: Check
        if !self.governor.validate(&params) {
            let (parameter, value) = self
                .governor
                .violation(&params)
                .unwrap_or_else(|| ("unknown".to_string(), f64::NAN));
            return Err(BypassError::SafetyRejected { parameter, value });
        }
        let risk = self.governor.assess_risk(&params);
        match risk {
            RiskLevel::High => {
                warn!(profile, "risk assessed as high, aborting before apply");
                return Err(BypassError::RiskTooHigh(format!(
                    "profile '{profile}' plans a high-risk change"
                )));
            }
            RiskLevel::Medium => {
                warn!(profile, "risk assessed as medium, proceeding");
            }
            RiskLevel::Low => {}
        }
        info!(%risk, "phase 3/5: safety checks passed");

        // Phase 4: Apply
        {
            let mut gateway = self.gateway.lock().await;
            gateway.apply_parameters(&params).await.map_err(|e| {
                warn!(error = %e, "device rejected parameters");
                BypassError::ApplyFailed
            })?;
        }
        info!("phase 4/5: parameters applied");

        // Phase 5: Verify - best effort, a read failure here does not mean
        // the apply failed.
        let (final_status, verify_error) = {
            let mut gateway = self.gateway.lock().await;
            match gateway.get_status().await {
                Ok(status) => {
                    info!(
                        rate_kbps = status.downstream_rate_kbps,
                        snr_db = status.snr_margin_db,
                        "phase 5/5: new status verified"
                    );
                    (Some(status), None)
                }
                Err(e) => {
                    let err = BypassError::VerifyIncomplete(e.to_string());
                    warn!(error = %err, "phase 5/5: verification read failed");
                    (None, Some(err.to_string()))
                }
            }
        };

        info!(profile, "bypass sequence finished");
        Ok(BypassOutcome {
            initial,
            applied_params: params,
            risk,
            final_status,
            verify_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{shared, DeviceGateway, GatewayMetrics};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use dslboost_shared::params::{PARAM_ATTENUATION, PARAM_LINE_LENGTH, PARAM_SNR_MARGIN};
    use dslboost_shared::profile::{OptimizationProfile, ProfileTable};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    /// Counting gateway: every call is tallied, behavior is switchable.
    #[derive(Clone, Default)]
    struct CountingGateway {
        status_calls: Arc<AtomicU64>,
        apply_calls: Arc<AtomicU64>,
        fail_status: Arc<AtomicBool>,
        fail_apply: Arc<AtomicBool>,
        fail_verify: Arc<AtomicBool>,
        metrics: Arc<GatewayMetrics>,
    }

    #[async_trait]
    impl DeviceGateway for CountingGateway {
        async fn get_status(&mut self) -> Result<StatusSnapshot> {
            let call = self.status_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_status.load(Ordering::SeqCst) {
                return Err(anyhow!("status unreachable"));
            }
            if call > 0 && self.fail_verify.load(Ordering::SeqCst) {
                return Err(anyhow!("verify read unreachable"));
            }
            let mut snap = StatusSnapshot::line_down();
            snap.line_status = dslboost_shared::status::LineStatus::Up;
            snap.downstream_rate_kbps = 60_000 + (call as u32) * 1_000;
            Ok(snap)
        }

        async fn apply_parameters(&mut self, _params: &ParameterSet) -> Result<()> {
            self.apply_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_apply.load(Ordering::SeqCst) {
                return Err(anyhow!("device said no"));
            }
            Ok(())
        }

        async fn get_full_state(&mut self) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }

        async fn set_full_state(&mut self, _state: serde_json::Value) -> Result<()> {
            Ok(())
        }

        fn metrics(&self) -> Arc<GatewayMetrics> {
            Arc::clone(&self.metrics)
        }
    }

    fn profile_table(snr: f64) -> ProfileTable {
        let mut table = ProfileTable::new();
        table.insert(
            "test",
            OptimizationProfile {
                description: "fixture".to_string(),
                parameters: ParameterSet::new().with(PARAM_SNR_MARGIN, snr),
                simulate_short_line: false,
            },
        );
        table
    }

    fn orchestrator(gw: &CountingGateway, table: ProfileTable) -> BypassOrchestrator {
        let governor = SafetyGovernor::standard(gw.metrics());
        BypassOrchestrator::new(shared(gw.clone()), ParameterPlanner::new(table), governor)
    }

    #[tokio::test]
    async fn test_all_five_phases_succeed() {
        let gw = CountingGateway::default();
        let orch = orchestrator(&gw, profile_table(12.0));

        let outcome = orch.execute("test").await.unwrap();
        assert_eq!(outcome.risk, RiskLevel::Medium);
        assert!(outcome.final_status.is_some());
        assert!(outcome.verify_error.is_none());
        // One read, one apply, one verify read.
        assert_eq!(gw.status_calls.load(Ordering::SeqCst), 2);
        assert_eq!(gw.apply_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_unavailable_aborts_phase_one() {
        let gw = CountingGateway::default();
        gw.fail_status.store(true, Ordering::SeqCst);
        let orch = orchestrator(&gw, profile_table(12.0));

        let err = orch.execute("test").await.unwrap_err();
        assert!(matches!(err, BypassError::StatusUnavailable));
        assert_eq!(gw.apply_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_profile_aborts_phase_two() {
        let gw = CountingGateway::default();
        let orch = orchestrator(&gw, profile_table(12.0));

        let err = orch.execute("nonexistent").await.unwrap_err();
        assert!(matches!(err, BypassError::ProfileNotFound(_)));
        assert_eq!(gw.apply_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_out_of_bounds_plan_is_safety_rejected() {
        let gw = CountingGateway::default();
        let orch = orchestrator(&gw, profile_table(30.0));

        let err = orch.execute("test").await.unwrap_err();
        match err {
            BypassError::SafetyRejected { parameter, value } => {
                assert_eq!(parameter, PARAM_SNR_MARGIN);
                assert!((value - 30.0).abs() < 1e-9);
            }
            other => panic!("expected SafetyRejected, got {other:?}"),
        }
        assert_eq!(gw.apply_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_negative_snr_aborts_with_risk_too_high_and_never_applies() {
        let gw = CountingGateway::default();
        let orch = orchestrator(&gw, profile_table(-1.0));

        let err = orch.execute("test").await.unwrap_err();
        assert!(matches!(err, BypassError::RiskTooHigh(_)));
        // The gateway's apply must never have been called.
        assert_eq!(gw.apply_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_apply_failure_reported_without_rollback_attempt() {
        let gw = CountingGateway::default();
        gw.fail_apply.store(true, Ordering::SeqCst);
        let orch = orchestrator(&gw, profile_table(12.0));

        let err = orch.execute("test").await.unwrap_err();
        assert!(matches!(err, BypassError::ApplyFailed));
        assert_eq!(gw.apply_calls.load(Ordering::SeqCst), 1);
        // No verify read after a failed apply.
        assert_eq!(gw.status_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_verify_failure_is_non_fatal() {
        let gw = CountingGateway::default();
        gw.fail_verify.store(true, Ordering::SeqCst);
        let orch = orchestrator(&gw, profile_table(12.0));

        let outcome = orch.execute("test").await.unwrap();
        assert!(outcome.final_status.is_none());
        assert!(outcome.verify_error.is_some());
        assert_eq!(gw.apply_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_low_risk_when_no_high_impact_parameter() {
        let mut table = ProfileTable::new();
        table.insert(
            "gentle",
            OptimizationProfile {
                description: "touches nothing risky".to_string(),
                parameters: ParameterSet::new().with(PARAM_LINE_LENGTH, 500.0),
                simulate_short_line: false,
            },
        );
        let gw = CountingGateway::default();
        let orch = orchestrator(&gw, table);

        let outcome = orch.execute("gentle").await.unwrap();
        assert_eq!(outcome.risk, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_second_invocation_rejected_while_in_flight() {
        use std::time::Duration;

        let gw = CountingGateway::default();
        let orch = Arc::new(orchestrator(&gw, profile_table(12.0)));

        // Hold the in-flight guard the way a running sequence would.
        let guard = orch.in_flight.try_lock().unwrap();
        let err = orch.execute("test").await.unwrap_err();
        assert!(matches!(err, BypassError::OperationInProgress));
        drop(guard);

        // After the first finishes, a new invocation goes through.
        let outcome = tokio::time::timeout(Duration::from_secs(5), orch.execute("test"))
            .await
            .expect("no deadlock")
            .unwrap();
        assert!(outcome.final_status.is_some());
    }

    #[tokio::test]
    async fn test_short_line_profile_applies_attenuation_override() {
        let mut table = ProfileTable::new();
        table.insert(
            "max_speed",
            OptimizationProfile {
                description: "fixture".to_string(),
                parameters: ParameterSet::new().with(PARAM_SNR_MARGIN, 6.0),
                simulate_short_line: true,
            },
        );
        let gw = CountingGateway::default();
        let orch = orchestrator(&gw, table);

        let outcome = orch.execute("max_speed").await.unwrap();
        assert_eq!(outcome.applied_params.get(PARAM_ATTENUATION), Some(1.0));
        assert_eq!(gw.apply_calls.load(Ordering::SeqCst), 1);
    }
}
