use thiserror::Error;

/// Represents an error while decoding blackbox data or building a platform
/// spec.
#[derive(Error, Debug)]
pub enum BlackboxError {
    #[error("blackbox blob length {len} is not a multiple of the {record_size}-byte record size")]
    Malformed { len: usize, record_size: usize },

    #[error("invalid platform data for DPM '{device}': {reason}")]
    PlatformSpec { device: String, reason: String },
}
