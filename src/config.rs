//! Runtime Configuration
//!
//! Broadcast cadence and settle windows. Defaults match what peers expect; a
//! host may override them from TOML.

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::context::StatsContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// UltValue broadcast interval (ms).
    pub ult_value_interval_ms: u64,
    /// Coarse UltType refresh interval (ms).
    pub ult_type_interval_ms: u64,
    /// Dps broadcast interval (ms).
    pub dps_interval_ms: u64,
    /// Hps broadcast interval (ms).
    pub hps_interval_ms: u64,
    /// Window that coalesces loadout swaps into one UltType broadcast (ms).
    pub loadout_settle_ms: u64,
    /// Delay between a membership event and reconciliation (ms).
    pub reconcile_settle_ms: u64,
    /// Settle window of each member stat container (ms). 0 fires inline.
    pub member_settle_ms: u64,
    /// Namespace for every timer key registered with the host.
    pub timer_prefix: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            ult_value_interval_ms: 1000,
            ult_type_interval_ms: 10_000,
            dps_interval_ms: 2000,
            hps_interval_ms: 2000,
            loadout_settle_ms: 2000,
            reconcile_settle_ms: 500,
            member_settle_ms: 100,
            timer_prefix: "GroupCombatStats".to_string(),
        }
    }
}

impl StatsConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: StatsConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the scheduler.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("ult_value_interval_ms", self.ult_value_interval_ms),
            ("ult_type_interval_ms", self.ult_type_interval_ms),
            ("dps_interval_ms", self.dps_interval_ms),
            ("hps_interval_ms", self.hps_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::ZeroInterval(*name));
        }
        if self.timer_prefix.is_empty() {
            return Err(ConfigError::EmptyTimerPrefix);
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML did not parse.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A periodic interval was zero.
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    /// Timer keys would collide with other host consumers.
    #[error("timer_prefix must not be empty")]
    EmptyTimerPrefix,
}
