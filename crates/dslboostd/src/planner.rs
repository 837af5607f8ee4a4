//! Parameter planner - maps a profile name onto target parameter values.
//!
//! Pure lookup plus one rule: a profile flagged `simulate_short_line` gets
//! its attenuation target forced to the fixed near-zero-distance value,
//! overriding anything the profile's base parameters say. The planner never
//! talks to the governor or the device.

use dslboost_shared::error::BypassError;
use dslboost_shared::params::{ParameterSet, PARAM_ATTENUATION};
use dslboost_shared::profile::{ProfileTable, SHORT_LINE_ATTENUATION_DB};
use dslboost_shared::status::StatusSnapshot;
use tracing::{debug, info};

pub struct ParameterPlanner {
    profiles: ProfileTable,
}

impl ParameterPlanner {
    pub fn new(profiles: ProfileTable) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    /// Compute the target parameter set for `profile_name` given the line's
    /// current state.
    pub fn plan(
        &self,
        status: &StatusSnapshot,
        profile_name: &str,
    ) -> Result<ParameterSet, BypassError> {
        let profile = self
            .profiles
            .get(profile_name)
            .ok_or_else(|| BypassError::ProfileNotFound(profile_name.to_string()))?;

        debug!(
            profile = profile_name,
            description = %profile.description,
            current_rate_kbps = status.downstream_rate_kbps,
            current_snr_db = status.snr_margin_db,
            current_attenuation_db = status.attenuation_db,
            "planning target parameters"
        );

        let mut params = profile.parameters.clone();

        if profile.simulate_short_line {
            params.set(PARAM_ATTENUATION, SHORT_LINE_ATTENUATION_DB);
            info!(
                target_attenuation_db = SHORT_LINE_ATTENUATION_DB,
                "applying short line simulation"
            );
        }

        Ok(params)
    }
}
