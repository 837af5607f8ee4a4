//! Optimization profiles - named bundles of target parameter values.
//!
//! Profiles are loaded once at daemon startup and handed to the planner as
//! an immutable table. The `simulate_short_line` flag makes the planner
//! force the attenuation target to a near-zero-distance value regardless of
//! the profile's own parameters.

use crate::params::{ParameterSet, PARAM_ATTENUATION, PARAM_SNR_MARGIN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attenuation target that simulates a ~5 m line.
pub const SHORT_LINE_ATTENUATION_DB: f64 = 1.0;

/// One named optimization strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationProfile {
    /// Human-readable summary shown by the ctl
    pub description: String,
    /// Base target values
    pub parameters: ParameterSet,
    /// Force attenuation to the short-line value
    #[serde(default)]
    pub simulate_short_line: bool,
}

/// Immutable profile rule table keyed by profile name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileTable(BTreeMap<String, OptimizationProfile>);

impl ProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, profile: OptimizationProfile) {
        self.0.insert(name.to_string(), profile);
    }

    pub fn get(&self, name: &str) -> Option<&OptimizationProfile> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    /// Profiles shipped with the daemon, used when the config file defines
    /// none of its own.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert(
            "max_speed",
            OptimizationProfile {
                description: "Lowest SNR margin target plus short-line simulation".to_string(),
                parameters: ParameterSet::new().with(PARAM_SNR_MARGIN, 6.0),
                simulate_short_line: true,
            },
        );
        table.insert(
            "balanced",
            OptimizationProfile {
                description: "Moderate SNR margin, real line attenuation".to_string(),
                parameters: ParameterSet::new()
                    .with(PARAM_SNR_MARGIN, 12.0)
                    .with(PARAM_ATTENUATION, 18.0),
                simulate_short_line: false,
            },
        );
        table.insert(
            "stability",
            OptimizationProfile {
                description: "High SNR margin for error-free sync at lower rates".to_string(),
                parameters: ParameterSet::new().with(PARAM_SNR_MARGIN, 16.0),
                simulate_short_line: false,
            },
        );
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_present() {
        let table = ProfileTable::builtin();
        assert!(table.get("max_speed").is_some());
        assert!(table.get("balanced").is_some());
        assert!(table.get("stability").is_some());
        assert!(table.get("warp_drive").is_none());
    }

    #[test]
    fn test_max_speed_simulates_short_line() {
        let table = ProfileTable::builtin();
        let profile = table.get("max_speed").unwrap();
        assert!(profile.simulate_short_line);
        assert_eq!(profile.parameters.get(PARAM_SNR_MARGIN), Some(6.0));
    }

    #[test]
    fn test_profile_deserialize_flag_defaults_false() {
        let json = r#"{"description":"d","parameters":{"snr_margin":10.0}}"#;
        let profile: OptimizationProfile = serde_json::from_str(json).unwrap();
        assert!(!profile.simulate_short_line);
    }
}
