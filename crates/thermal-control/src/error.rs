use thiserror::Error;

/// Represents an error found while loading or validating the thermal policy.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse thermal policy JSON")]
    Parse(#[from] serde_json::Error),

    #[error("no PID domains defined in policy")]
    NoPidDomains,

    #[error("fan limit min {min} is greater than max {max}")]
    InvertedFanLimits { min: f64, max: f64 },

    #[error("fan limits {min}-{max} are out of range [{lo}, {hi}]")]
    FanLimitsOutOfRange { min: f64, max: f64, lo: f64, hi: f64 },

    #[error("control interval must be a positive number of seconds")]
    BadInterval,
}

/// Represents a failure of a single control tick.
///
/// Any of these aborts the tick and drives the fail-safe path: all fans are
/// commanded to maximum speed before the error is handed back to the policy
/// scheduler.
#[derive(Error, Debug)]
pub enum TickError {
    #[error("control interval {reported}s does not match configured interval {configured}s")]
    IntervalMismatch { reported: u64, configured: u64 },

    #[error("no sensors available for PID control")]
    NoPidSensors,

    #[error("domain '{0}' has no usable sensors this tick")]
    EmptyDomain(String),

    #[error("no fans available to set speed")]
    NoFans,

    #[error("fan {index} failed while setting speed")]
    Fan {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
}
