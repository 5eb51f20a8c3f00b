//! Thermal policy configuration.
//!
//! The policy JSON is produced by the platform's policy loader; this module
//! gives it a strongly-typed shape and validates the parts the engine depends
//! on. Validation failures are fatal: a policy that fails here must refuse to
//! start rather than run with untuned gains.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ConfigError;

/// Absolute lower bound for any commanded fan speed, in percent.
pub const FAN_MIN_SPEED: f64 = 30.0;
/// Absolute upper bound for any commanded fan speed, in percent.
pub const FAN_MAX_SPEED: f64 = 100.0;

/// Gains and margin for one PID domain.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PidDomainConfig {
    #[serde(rename = "KP")]
    pub kp: f64,
    #[serde(rename = "KI")]
    pub ki: f64,
    #[serde(rename = "KD")]
    pub kd: f64,
    /// Extra headroom subtracted from every sensor error in this domain.
    #[serde(default)]
    pub extra_setpoint_margin: f64,
}

/// The `constants` section of the policy.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Constants {
    /// Control loop period in seconds. Gains are tuned against this value.
    pub interval: u64,
}

/// The `fan_limits` section of the policy.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FanLimits {
    pub min: f64,
    pub max: f64,
}

/// The complete thermal control policy.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    pub pid_domains: BTreeMap<String, PidDomainConfig>,
    pub constants: Constants,
    pub fan_limits: FanLimits,
}

impl PolicyConfig {
    /// Parses and validates a policy from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let policy: Self = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Parses and validates a policy from an already-loaded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let policy: Self = serde_json::from_value(value)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pid_domains.is_empty() {
            return Err(ConfigError::NoPidDomains);
        }
        let FanLimits { min, max } = self.fan_limits;
        if min > max {
            return Err(ConfigError::InvertedFanLimits { min, max });
        }
        if min < FAN_MIN_SPEED || max > FAN_MAX_SPEED {
            return Err(ConfigError::FanLimitsOutOfRange {
                min,
                max,
                lo: FAN_MIN_SPEED,
                hi: FAN_MAX_SPEED,
            });
        }
        if self.constants.interval == 0 {
            return Err(ConfigError::BadInterval);
        }
        Ok(())
    }
}
