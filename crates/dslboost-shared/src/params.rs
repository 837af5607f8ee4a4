//! Parameter sets, safety bounds and risk levels.
//!
//! A `ParameterSet` is one operation's worth of target values, keyed by
//! canonical parameter name. It has no persistent identity: the planner
//! creates one, the governor inspects it, the gateway consumes it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical parameter names
pub const PARAM_SNR_MARGIN: &str = "snr_margin";
pub const PARAM_ATTENUATION: &str = "attenuation";
pub const PARAM_LINE_LENGTH: &str = "line_length";

/// Parameters whose mere presence in a change set raises the risk level.
pub const HIGH_IMPACT_PARAMS: &[&str] = &[PARAM_SNR_MARGIN, PARAM_ATTENUATION];

/// Mapping from parameter name to numeric target value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, f64>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, f64)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Inclusive [min, max] range for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Static table of hard limits, the governor's last line of defense.
///
/// These are tighter than anything the planner enforces on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyBounds(BTreeMap<String, Bounds>);

impl SafetyBounds {
    /// The shipped limit table.
    ///
    /// Attenuation's floor is 0.0: a reported attenuation is never negative,
    /// and the short-line simulation legitimately targets 1.0 dB.
    pub fn standard() -> Self {
        let mut table = BTreeMap::new();
        table.insert(PARAM_SNR_MARGIN.to_string(), Bounds::new(-2.0, 25.0));
        table.insert(PARAM_ATTENUATION.to_string(), Bounds::new(0.0, 45.0));
        table.insert(PARAM_LINE_LENGTH.to_string(), Bounds::new(1.0, 5000.0));
        Self(table)
    }

    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: &str, bounds: Bounds) {
        self.0.insert(name.to_string(), bounds);
    }

    pub fn get(&self, name: &str) -> Option<Bounds> {
        self.0.get(name).copied()
    }
}

/// Derived risk classification for a proposed change. Never stored.
///
/// Ordering is a strict precedence: High overrides Medium overrides Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_set_basics() {
        let params = ParameterSet::new()
            .with(PARAM_SNR_MARGIN, 12.0)
            .with(PARAM_ATTENUATION, 10.5);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get(PARAM_SNR_MARGIN), Some(12.0));
        assert!(!params.contains(PARAM_LINE_LENGTH));
    }

    #[test]
    fn test_bounds_inclusive() {
        let b = Bounds::new(-2.0, 25.0);
        assert!(b.contains(-2.0));
        assert!(b.contains(25.0));
        assert!(!b.contains(-2.1));
        assert!(!b.contains(25.1));
    }

    #[test]
    fn test_standard_bounds_table() {
        let bounds = SafetyBounds::standard();
        assert_eq!(bounds.get(PARAM_SNR_MARGIN), Some(Bounds::new(-2.0, 25.0)));
        assert_eq!(bounds.get(PARAM_ATTENUATION), Some(Bounds::new(0.0, 45.0)));
        assert!(bounds.get("tx_power").is_none());
    }

    #[test]
    fn test_risk_level_precedence() {
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
    }

    #[test]
    fn test_parameter_set_serde_is_flat_map() {
        let params = ParameterSet::new().with(PARAM_SNR_MARGIN, 6.0);
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, "{\"snr_margin\":6.0}");
    }
}
