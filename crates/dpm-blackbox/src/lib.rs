//! # DPM Blackbox Crate
//!
//! `dpm-blackbox` decodes the non-volatile fault log ("blackbox") of a
//! digital power monitor and resolves it into a reboot cause. The DPM traps
//! power-rail faults in hardware and appends a fixed-size record per fault;
//! after a reboot the platform reads the log back and asks this crate what
//! happened.
//!
//! Decoding is table-driven: each board ships a [`DpmPlatformSpec`] mapping
//! voltage inputs to rail names, PDIO fault bits to a compact fault index,
//! and PDIO inputs to canonical reboot causes.

pub mod decode;
pub mod device;
pub mod error;
pub mod platform_spec;
pub mod record;
pub mod resolver;

// Re-export key types
pub use decode::{channel_names, decode_dpm_fault, render_record, BlackboxRecord, ChannelBank};
pub use device::DpmDevice;
pub use error::BlackboxError;
pub use platform_spec::{DpmPlatformSpec, FaultCauseEntry};
pub use record::{parse_blackbox, FaultRecord, NO_RECORDS_SENTINEL, RECORD_SIZE};
pub use resolver::{get_reboot_cause_type, resolve};
