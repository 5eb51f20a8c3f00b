//! # Thermal Control Crate
//!
//! `thermal-control` implements the closed-loop fan control core of a
//! network-switch platform driver. The policy host invokes one control tick
//! per configured interval; each tick reads every thermal sensor, runs one
//! PID controller per thermal domain on the worst sensor error in that
//! domain, and commands all chassis fans with the highest domain output.
//!
//! ## Features
//!
//! - **Domain-partitioned PID**: each named domain (ASIC, CPU, transceivers…)
//!   has its own gains and controller; the hottest domain drives the fans.
//! - **Anti-windup**: conditional integration freezes the integral while the
//!   output is saturated, and releases it as soon as the error unwinds.
//! - **Hot-plug tolerance**: sensors may appear, disappear, or report partial
//!   data between ticks without aborting control.
//! - **Fail-safe**: any tick failure commands all fans to maximum speed
//!   before the error propagates.
//! - **CSV telemetry**: per-tick controller state, temperatures, and input
//!   errors go to size-capped rolling CSV files, gated on a debug flag.

pub mod config;
pub mod engine;
pub mod error;
pub mod naming;
pub mod pid;
pub mod ports;
pub mod telemetry;

// Re-export key types
pub use config::{PolicyConfig, FAN_MAX_SPEED, FAN_MIN_SPEED};
pub use engine::{set_all_fan_speeds, ControlEngine, FixedSpeedAction, TickReport};
pub use error::{ConfigError, TickError};
pub use pid::{DomainPid, PidDetails};
pub use ports::{Fan, Sensor};
pub use telemetry::CsvLogger;
