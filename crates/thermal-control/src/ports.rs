//! Capability traits for the platform devices the engine drives.
//!
//! The concrete sensor and fan drivers live in the platform layer; the engine
//! only sees these traits. Sensors may appear and disappear between ticks
//! (transceivers are hot-pluggable), so temperature and setpoint reads are
//! optional by design.

use anyhow::Result;

/// A thermal sensor as seen by the control engine.
pub trait Sensor {
    /// Stable sensor name, e.g. `"CPU"` or `"Transceiver Port3"`.
    fn name(&self) -> String;

    /// Current temperature in °C, or `None` when the sensor is unplugged or
    /// has no reading this tick.
    fn temperature(&self) -> Option<f64>;

    /// Whether this sensor implements the PID-membership capability at all.
    ///
    /// Drivers that predate the PID policy return `false` here; the engine
    /// warns and leaves them out of domain grouping.
    fn supports_pid_control(&self) -> bool {
        false
    }

    /// Whether this sensor participates in closed-loop control.
    fn is_controlled_by_pid(&self) -> bool {
        false
    }

    /// The PID domain this sensor belongs to. Defined whenever
    /// [`is_controlled_by_pid`](Sensor::is_controlled_by_pid) is true.
    fn pid_domain(&self) -> Option<String> {
        None
    }

    /// The sensor's target temperature in °C. May be transiently absent even
    /// for a controlled sensor, e.g. right after unplugging.
    fn pid_setpoint(&self) -> Option<f64> {
        None
    }
}

/// A chassis fan as seen by the control engine.
pub trait Fan {
    /// Commands the fan to `pct` percent of full speed.
    ///
    /// Returns `Ok(false)` when the fan is not present, which is not an
    /// error. An `Err` means the driver itself failed and aborts the tick.
    fn set_speed(&mut self, pct: f64) -> Result<bool>;
}
