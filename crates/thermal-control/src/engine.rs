//! The PID thermal control engine.
//!
//! Once per policy interval the engine reads every thermal sensor, groups the
//! PID-controlled ones by domain, runs one PID controller per domain on the
//! worst sensor error, and commands every chassis fan with the highest domain
//! output. Control integrity beats everything else: any failure inside a tick
//! commands all fans to maximum speed before the error is handed back to the
//! scheduler.

use std::path::PathBuf;

use chrono::Local;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::{PidDomainConfig, PolicyConfig, FAN_MAX_SPEED};
use crate::error::{ConfigError, TickError};
use crate::naming::{natural_key, normalize_sensor_name};
use crate::pid::{DomainPid, PidDetails};
use crate::ports::{Fan, Sensor};
use crate::telemetry::{CsvLogger, CSV_LOG_DIR};

/// The outcome of a successful control tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Speed commanded to every fan, in percent.
    pub fan_speed: f64,
    /// The domain that drove the fan speed, or `"None"` when no domain is
    /// pushing above the minimum.
    pub selected_domain: String,
    /// Saturated PID output per domain that computed this tick, in natural
    /// sort order.
    pub domain_outputs: Vec<(String, f64)>,
}

struct DomainState {
    name: String,
    config: PidDomainConfig,
    pid: DomainPid<f64>,
    /// Lazily created on the first tick that observes sensors in this domain;
    /// the header is fixed at that point.
    input_error_log: Option<CsvLogger>,
}

/// Commands `speed` to every fan.
///
/// A fan reporting itself absent is warned about and skipped; a fan driver
/// error aborts immediately. An empty fan list is an error: a chassis with no
/// controllable fans cannot be cooled.
pub fn set_all_fan_speeds(fans: &mut [&mut dyn Fan], speed: f64) -> Result<(), TickError> {
    if fans.is_empty() {
        error!("no fans available to set speed");
        return Err(TickError::NoFans);
    }
    let mut success_count = 0;
    let total = fans.len();
    for (index, fan) in fans.iter_mut().enumerate() {
        match fan.set_speed(speed) {
            Ok(true) => success_count += 1,
            Ok(false) => {
                warn!("failed to set speed {speed:.1}% for fan {index} (fan may not be present)");
            }
            Err(source) => {
                error!("error setting speed {speed:.1}% for fan {index}: {source:#}");
                return Err(TickError::Fan { index, source });
            }
        }
    }
    info!("applied speed {speed:.1}% to {success_count}/{total} fans");
    Ok(())
}

/// Best-effort fail-safe: command every fan to maximum, tolerating per-fan
/// errors so one broken driver cannot keep the rest of the chassis slow.
fn failsafe_all_fans(fans: &mut [&mut dyn Fan]) {
    for (index, fan) in fans.iter_mut().enumerate() {
        match fan.set_speed(FAN_MAX_SPEED) {
            Ok(true) => {}
            Ok(false) => warn!("fan {index} not present during fail-safe"),
            Err(e) => error!("fan {index} failed during fail-safe: {e:#}"),
        }
    }
}

/// A policy action that pins all fans at a fixed speed.
///
/// Used by policies that bypass closed-loop control, e.g. during diagnostics
/// or as the fallback profile.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FixedSpeedAction {
    pub speed: f64,
}

impl FixedSpeedAction {
    /// Parses the action from its policy JSON (`{"speed": <pct>}`).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let action: Self = serde_json::from_str(json)?;
        info!("loaded fixed fan speed action: {}%", action.speed);
        Ok(action)
    }

    pub fn execute(&self, fans: &mut [&mut dyn Fan]) -> Result<(), TickError> {
        set_all_fan_speeds(fans, self.speed)
    }
}

/// The domain-partitioned PID control engine.
pub struct ControlEngine {
    configured_interval: u64,
    interval_checked: bool,
    fan_min: f64,
    fan_max: f64,
    /// Natural-sorted by domain name; iteration order is the tie-break order.
    domains: Vec<DomainState>,
    csv_dir: PathBuf,
    control_log: CsvLogger,
    /// Lazily created on the first tick that observes any sensor.
    temperature_log: Option<CsvLogger>,
}

impl ControlEngine {
    /// Creates an engine writing telemetry under the default log directory.
    pub fn new(policy: PolicyConfig) -> Self {
        Self::with_csv_dir(policy, CSV_LOG_DIR)
    }

    /// Creates an engine writing telemetry under `csv_dir`.
    pub fn with_csv_dir(policy: PolicyConfig, csv_dir: impl Into<PathBuf>) -> Self {
        let csv_dir = csv_dir.into();
        let fan_min = policy.fan_limits.min;
        let fan_max = policy.fan_limits.max;
        let interval = policy.constants.interval;

        let mut names: Vec<String> = policy.pid_domains.keys().cloned().collect();
        names.sort_by_key(|name| natural_key(name));

        let domains: Vec<DomainState> = names
            .into_iter()
            .map(|name| {
                let config = policy.pid_domains[&name];
                let pid = DomainPid::new(
                    name.clone(),
                    interval as f64,
                    config.kp,
                    config.ki,
                    config.kd,
                    fan_min,
                    fan_max,
                );
                info!("initialized PID controller for domain '{name}'");
                if config.extra_setpoint_margin != 0.0 {
                    info!(
                        "extra setpoint margin for domain '{name}': {}",
                        config.extra_setpoint_margin
                    );
                }
                DomainState {
                    name,
                    config,
                    pid,
                    input_error_log: None,
                }
            })
            .collect();

        let mut headers = vec!["timestamp".to_string()];
        for domain in &domains {
            for column in [
                "sensor",
                "P",
                "I",
                "D",
                "raw_output",
                "saturated_output",
                "frozen_integral",
            ] {
                headers.push(format!("{}_{column}", domain.name));
            }
        }
        headers.push("selected_domain".to_string());
        headers.push("configured_fan_speed".to_string());
        let control_log = CsvLogger::new(&csv_dir, "thermal_control_algorithm.csv", headers);

        Self {
            configured_interval: interval,
            interval_checked: false,
            fan_min,
            fan_max,
            domains,
            csv_dir,
            control_log,
            temperature_log: None,
        }
    }

    /// Runs one control tick.
    ///
    /// `interval_secs` is the period the policy scheduler is actually running
    /// at; it must match the configured interval because the gains are tuned
    /// to a specific sample time.
    ///
    /// On any failure all fans are commanded to [`FAN_MAX_SPEED`] before the
    /// error is returned, so the scheduler observes the failure but the
    /// chassis stays cooled.
    pub fn tick(
        &mut self,
        interval_secs: u64,
        sensors: &[&dyn Sensor],
        fans: &mut [&mut dyn Fan],
    ) -> Result<TickReport, TickError> {
        match self.tick_inner(interval_secs, sensors, fans) {
            Ok(report) => Ok(report),
            Err(err) => {
                error!("thermal control tick failed: {err}");
                error!("setting fan speed to {FAN_MAX_SPEED}% (max)");
                failsafe_all_fans(fans);
                Err(err)
            }
        }
    }

    fn tick_inner(
        &mut self,
        interval_secs: u64,
        sensors: &[&dyn Sensor],
        fans: &mut [&mut dyn Fan],
    ) -> Result<TickReport, TickError> {
        self.check_interval(interval_secs)?;

        // One timestamp per tick; every CSV row of this tick shares it.
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
        self.log_temperature_sensors(sensors, &timestamp);

        let grouped = self.group_sensors_by_domain(sensors)?;

        // Compute PID output per domain that has candidates this tick.
        let mut results: Vec<Option<(String, PidDetails<f64>)>> = Vec::new();
        for (idx, members) in grouped.iter().enumerate() {
            if members.is_empty() {
                results.push(None);
                continue;
            }
            let (sensor_name, details) = self.compute_domain_output(idx, members)?;
            results.push(Some((sensor_name, details)));
        }

        // Fusion: highest saturated output wins; ties go to the first domain
        // in natural sort order.
        let mut winner: Option<(usize, f64)> = None;
        for (idx, result) in results.iter().enumerate() {
            if let Some((_, details)) = result {
                let output = details.saturated_output;
                if winner.map_or(true, |(_, best)| output > best) {
                    winner = Some((idx, output));
                }
            }
        }
        let Some((winner_idx, max_output)) = winner else {
            return Err(TickError::NoPidSensors);
        };

        let final_speed = max_output.clamp(self.fan_min, self.fan_max);
        let selected_domain = if final_speed <= self.fan_min {
            "None".to_string()
        } else {
            self.domains[winner_idx].name.clone()
        };

        info!(
            "max PID output: {max_output:.3} from domain '{}', setting fan speed to {final_speed:.1}%",
            self.domains[winner_idx].name
        );

        self.log_control_row(&timestamp, &results, &selected_domain, final_speed);

        set_all_fan_speeds(fans, final_speed)?;

        let domain_outputs = self
            .domains
            .iter()
            .zip(&results)
            .filter_map(|(domain, result)| {
                result
                    .as_ref()
                    .map(|(_, details)| (domain.name.clone(), details.saturated_output))
            })
            .collect();

        Ok(TickReport {
            fan_speed: final_speed,
            selected_domain,
            domain_outputs,
        })
    }

    fn check_interval(&mut self, reported: u64) -> Result<(), TickError> {
        if self.interval_checked {
            return Ok(());
        }
        if reported != self.configured_interval {
            return Err(TickError::IntervalMismatch {
                reported,
                configured: self.configured_interval,
            });
        }
        self.interval_checked = true;
        Ok(())
    }

    /// Groups controllable sensors by configured domain, preserving the
    /// engine's natural-sorted domain order. Sensors without the PID
    /// capability are warned about; sensors of unconfigured domains are
    /// ignored.
    fn group_sensors_by_domain<'a>(
        &self,
        sensors: &[&'a dyn Sensor],
    ) -> Result<Vec<Vec<&'a dyn Sensor>>, TickError> {
        let mut grouped: Vec<Vec<&'a dyn Sensor>> =
            self.domains.iter().map(|_| Vec::new()).collect();
        let mut any = false;
        for sensor in sensors {
            if !sensor.supports_pid_control() {
                warn!("sensor '{}' does not support PID control", sensor.name());
                continue;
            }
            if !sensor.is_controlled_by_pid() {
                continue;
            }
            let Some(domain) = sensor.pid_domain() else {
                continue;
            };
            if let Some(idx) = self.domains.iter().position(|d| d.name == domain) {
                grouped[idx].push(*sensor);
                any = true;
            }
        }
        if !any {
            return Err(TickError::NoPidSensors);
        }
        debug!(
            "grouped sensors by domain: {:?}",
            self.domains
                .iter()
                .zip(&grouped)
                .map(|(d, g)| (d.name.as_str(), g.len()))
                .collect::<Vec<_>>()
        );
        Ok(grouped)
    }

    /// Runs the domain's controller on the worst sensor error. Sensors with a
    /// missing temperature or setpoint are skipped; if that leaves none, the
    /// tick fails.
    fn compute_domain_output(
        &mut self,
        idx: usize,
        members: &[&dyn Sensor],
    ) -> Result<(String, PidDetails<f64>), TickError> {
        let domain = &mut self.domains[idx];
        let margin = domain.config.extra_setpoint_margin;

        let mut worst: Option<(f64, f64, String)> = None;
        for sensor in members {
            let Some(temperature) = sensor.temperature() else {
                // No reading while the sensor is absent; tolerate hot-plug.
                continue;
            };
            let Some(setpoint) = sensor.pid_setpoint() else {
                // Just-unplugged sensors can report a temperature but no
                // setpoint.
                continue;
            };
            let err = temperature - setpoint - margin;
            if worst.as_ref().map_or(true, |(max_err, _, _)| err > *max_err) {
                worst = Some((err, setpoint, sensor.name()));
            }
        }

        let Some((max_error, setpoint, sensor_name)) = worst else {
            return Err(TickError::EmptyDomain(domain.name.clone()));
        };

        debug!(
            "domain '{}': using sensor '{sensor_name}' with error {max_error:.2}°C (setpoint={setpoint:.2}°C)",
            domain.name
        );

        let (_, details) = domain.pid.compute(max_error);
        Ok((sensor_name, details))
    }

    /// Writes the all-sensor temperature CSV row and one input-error row per
    /// domain. Header sets are fixed on the first tick that observes sensors.
    fn log_temperature_sensors(&mut self, sensors: &[&dyn Sensor], timestamp: &str) {
        let mut all_temps: Vec<(String, f64)> = Vec::new();
        let mut domain_errors: Vec<Vec<(String, f64)>> =
            self.domains.iter().map(|_| Vec::new()).collect();

        for sensor in sensors {
            let Some(temperature) = sensor.temperature() else {
                continue;
            };
            let Some(name) = normalize_sensor_name(&sensor.name()) else {
                continue;
            };
            all_temps.push((name.clone(), temperature));

            if !sensor.supports_pid_control() || !sensor.is_controlled_by_pid() {
                continue;
            }
            let Some(setpoint) = sensor.pid_setpoint() else {
                continue;
            };
            let Some(domain) = sensor.pid_domain() else {
                continue;
            };
            if let Some(idx) = self.domains.iter().position(|d| d.name == domain) {
                domain_errors[idx].push((name, temperature - setpoint));
            }
        }

        all_temps.sort_by_key(|(name, _)| natural_key(name));
        if self.temperature_log.is_none() && !all_temps.is_empty() {
            let mut headers = vec!["timestamp".to_string()];
            headers.extend(all_temps.iter().map(|(name, _)| name.clone()));
            self.temperature_log = Some(CsvLogger::new(&self.csv_dir, "temperature.csv", headers));
        }
        if let Some(log) = &self.temperature_log {
            if !all_temps.is_empty() {
                let mut row = vec![timestamp.to_string()];
                row.extend(all_temps.iter().map(|(_, t)| format!("{t:.3}")));
                log.log_row(&row);
            }
        }

        for (domain, mut errors) in self.domains.iter_mut().zip(domain_errors) {
            if errors.is_empty() {
                continue;
            }
            errors.sort_by_key(|(name, _)| natural_key(name));
            if domain.input_error_log.is_none() {
                let mut headers = vec!["timestamp".to_string()];
                headers.extend(errors.iter().map(|(name, _)| name.clone()));
                domain.input_error_log = Some(CsvLogger::new(
                    &self.csv_dir,
                    &format!("{}_input_error.csv", domain.name),
                    headers,
                ));
            }
            if let Some(log) = &domain.input_error_log {
                let mut row = vec![timestamp.to_string()];
                row.extend(errors.iter().map(|(_, e)| format!("{e:.3}")));
                log.log_row(&row);
            }
        }
    }

    fn log_control_row(
        &self,
        timestamp: &str,
        results: &[Option<(String, PidDetails<f64>)>],
        selected_domain: &str,
        final_speed: f64,
    ) {
        let mut row = vec![timestamp.to_string()];
        for result in results {
            match result {
                Some((sensor_name, details)) => {
                    row.push(sensor_name.clone());
                    row.push(format!("{:.3}", details.p));
                    row.push(format!("{:.3}", details.i));
                    row.push(format!("{:.3}", details.d));
                    row.push(format!("{:.3}", details.raw_output));
                    row.push(format!("{:.3}", details.saturated_output));
                    row.push(details.frozen_integral.to_string());
                }
                None => {
                    row.push("None".to_string());
                    for _ in 0..5 {
                        row.push(format!("{:.3}", 0.0));
                    }
                    row.push(false.to_string());
                }
            }
        }
        row.push(selected_domain.to_string());
        row.push(format!("{final_speed:.3}"));
        self.control_log.log_row(&row);
    }
}
