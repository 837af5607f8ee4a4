//! Safety governor - the last line of defense before the device.
//!
//! Two independent gates: hard bounds (categorical reject) and risk scoring
//! (the caller decides what to do with Medium; High is always fatal in the
//! orchestrator). No parameter set reaches the gateway without passing
//! through here first.

use crate::gateway::GatewayMetrics;
use dslboost_shared::params::{
    ParameterSet, RiskLevel, SafetyBounds, HIGH_IMPACT_PARAMS, PARAM_SNR_MARGIN,
};
use std::sync::Arc;
use tracing::warn;

pub struct SafetyGovernor {
    bounds: SafetyBounds,
    metrics: Arc<GatewayMetrics>,
}

impl SafetyGovernor {
    pub fn new(bounds: SafetyBounds, metrics: Arc<GatewayMetrics>) -> Self {
        Self { bounds, metrics }
    }

    /// Governor with the shipped limit table.
    pub fn standard(metrics: Arc<GatewayMetrics>) -> Self {
        Self::new(SafetyBounds::standard(), metrics)
    }

    /// First bounds violation in the proposed set, if any.
    pub fn violation(&self, proposed: &ParameterSet) -> Option<(String, f64)> {
        for (name, value) in proposed.iter() {
            match self.bounds.get(name) {
                Some(bounds) if !bounds.contains(value) => {
                    return Some((name.to_string(), value));
                }
                Some(_) => {}
                None => {
                    // Fail-open for parameters we have no bounds for.
                    warn!(parameter = name, "no safety bounds defined, passing unchecked");
                }
            }
        }
        None
    }

    /// Hard bounds check: fail-closed for known parameters, fail-open (with
    /// a warning) for unknown ones. A failure counts against the gateway's
    /// failure metric so it shows up next to device-level failures.
    pub fn validate(&self, proposed: &ParameterSet) -> bool {
        if let Some((parameter, value)) = self.violation(proposed) {
            let bounds = self.bounds.get(&parameter).expect("violations are bounded");
            warn!(
                parameter,
                value,
                min = bounds.min,
                max = bounds.max,
                "safety validation failed, value outside bounds"
            );
            self.metrics.record_failure();
            return false;
        }
        true
    }

    /// Risk score for a proposed change. Strict precedence, not cumulative:
    /// a negative SNR margin target is High no matter what else is present;
    /// any touch of a high-impact parameter is at least Medium; otherwise
    /// Low.
    pub fn assess_risk(&self, proposed: &ParameterSet) -> RiskLevel {
        if let Some(snr) = proposed.get(PARAM_SNR_MARGIN) {
            if snr < 0.0 {
                return RiskLevel::High;
            }
        }

        if HIGH_IMPACT_PARAMS.iter().any(|p| proposed.contains(p)) {
            return RiskLevel::Medium;
        }

        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dslboost_shared::params::{Bounds, PARAM_ATTENUATION, PARAM_LINE_LENGTH};

    fn governor() -> SafetyGovernor {
        SafetyGovernor::standard(Arc::new(GatewayMetrics::new()))
    }

    #[test]
    fn test_safe_parameters_pass() {
        let params = ParameterSet::new()
            .with(PARAM_SNR_MARGIN, 10.0)
            .with(PARAM_ATTENUATION, 20.0);
        assert!(governor().validate(&params));
    }

    #[test]
    fn test_snr_below_floor_rejected() {
        let params = ParameterSet::new().with(PARAM_SNR_MARGIN, -5.0);
        assert!(!governor().validate(&params));
    }

    #[test]
    fn test_snr_above_ceiling_rejected() {
        let params = ParameterSet::new().with(PARAM_SNR_MARGIN, 30.0);
        assert!(!governor().validate(&params));
    }

    #[test]
    fn test_attenuation_out_of_bounds_rejected() {
        let params = ParameterSet::new().with(PARAM_ATTENUATION, 47.5);
        assert!(!governor().validate(&params));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let params = ParameterSet::new().with(PARAM_SNR_MARGIN, 25.0);
        assert!(governor().validate(&params));
        let params = ParameterSet::new().with(PARAM_SNR_MARGIN, -2.0);
        assert!(governor().validate(&params));
    }

    #[test]
    fn test_unknown_parameter_passes_with_warning() {
        let params = ParameterSet::new().with("tx_power", 9_999.0);
        assert!(governor().validate(&params));
    }

    #[test]
    fn test_validation_failure_increments_failure_metric() {
        let metrics = Arc::new(GatewayMetrics::new());
        let governor = SafetyGovernor::standard(Arc::clone(&metrics));

        let params = ParameterSet::new().with(PARAM_LINE_LENGTH, 0.0);
        assert!(!governor.validate(&params));
        assert_eq!(metrics.failure_count(), 1);

        // A passing check adds nothing.
        let ok = ParameterSet::new().with(PARAM_LINE_LENGTH, 5.0);
        assert!(governor.validate(&ok));
        assert_eq!(metrics.failure_count(), 1);
    }

    #[test]
    fn test_risk_low_without_high_impact_params() {
        let params = ParameterSet::new().with("some_other_param", 123.0);
        assert_eq!(governor().assess_risk(&params), RiskLevel::Low);
    }

    #[test]
    fn test_risk_medium_on_high_impact_touch() {
        let params = ParameterSet::new().with(PARAM_ATTENUATION, 15.0);
        assert_eq!(governor().assess_risk(&params), RiskLevel::Medium);

        let params = ParameterSet::new().with(PARAM_SNR_MARGIN, 12.0);
        assert_eq!(governor().assess_risk(&params), RiskLevel::Medium);
    }

    #[test]
    fn test_risk_high_on_negative_snr_regardless_of_other_keys() {
        let params = ParameterSet::new()
            .with(PARAM_SNR_MARGIN, -1.0)
            .with(PARAM_ATTENUATION, 15.0)
            .with("some_other_param", 1.0);
        assert_eq!(governor().assess_risk(&params), RiskLevel::High);

        let alone = ParameterSet::new().with(PARAM_SNR_MARGIN, -0.1);
        assert_eq!(governor().assess_risk(&alone), RiskLevel::High);
    }

    #[test]
    fn test_custom_bounds_table() {
        let mut bounds = SafetyBounds::empty();
        bounds.insert("tx_power", Bounds::new(0.0, 10.0));
        let governor = SafetyGovernor::new(bounds, Arc::new(GatewayMetrics::new()));

        assert!(governor.validate(&ParameterSet::new().with("tx_power", 5.0)));
        assert!(!governor.validate(&ParameterSet::new().with("tx_power", 11.0)));
        // snr_margin has no bounds in this table, so it passes unchecked.
        assert!(governor.validate(&ParameterSet::new().with(PARAM_SNR_MARGIN, 500.0)));
    }
}
