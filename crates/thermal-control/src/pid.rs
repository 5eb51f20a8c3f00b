//! A discrete-time PID controller with conditional-integration anti-windup.

use std::fmt::Display;

use num_traits::Float;
use tracing::debug;

/// A PID controller for one thermal domain.
///
/// The controller runs at a fixed sample interval and clamps its output to the
/// configured fan-speed range. Instead of clamping the integral term, it uses
/// conditional integration: the integral is held whenever further accumulation
/// would push the output deeper into saturation in the same direction, and is
/// allowed to move again as soon as the error starts unwinding the saturation.
#[derive(Debug, Clone)]
pub struct DomainPid<F: Float> {
    domain: String,

    /// Proportional gain.
    kp: F,
    /// Integral gain.
    ki: F,
    /// Derivative gain.
    kd: F,

    /// Sample interval in seconds. Gains are tuned against this value.
    dt: F,

    /// The lower bound of the controller's output.
    output_min: F,
    /// The upper bound of the controller's output.
    output_max: F,

    // Internal state
    integral: F,
    prev_error: F,
    first_run: bool,
}

/// The intermediate values of one [`DomainPid::compute`] call, for telemetry.
#[derive(Debug, Clone, Copy)]
pub struct PidDetails<F: Float> {
    /// Proportional term (the raw error).
    pub p: F,
    /// The integral retained after the anti-windup decision, not the
    /// candidate value used for this output.
    pub i: F,
    /// Derivative term.
    pub d: F,
    /// Output before saturation.
    pub raw_output: F,
    /// Output after clamping to the configured range.
    pub saturated_output: F,
    /// Whether the anti-windup logic held the integral this sample.
    pub frozen_integral: bool,
}

impl<F: Float + Display> DomainPid<F> {
    /// Creates a new PID controller for a domain.
    ///
    /// The integral is pre-seeded so that a zero-error first sample produces
    /// an output at the midpoint of the output range, which keeps the
    /// cold-start transient small. With a zero integral gain the seed would be
    /// meaningless (the integral term never contributes), so it starts at 0.
    pub fn new(
        domain: impl Into<String>,
        dt: F,
        kp: F,
        ki: F,
        kd: F,
        output_min: F,
        output_max: F,
    ) -> Self {
        let two = F::one() + F::one();
        let integral = if ki == F::zero() {
            F::zero()
        } else {
            (output_min + output_max) / two / ki
        };

        let pid = Self {
            domain: domain.into(),
            kp,
            ki,
            kd,
            dt,
            output_min,
            output_max,
            integral,
            prev_error: F::zero(),
            first_run: true,
        };

        debug!(
            "PID controller for domain '{}': gains=[Kp={}, Ki={}, Kd={}], \
             output_range=[{}, {}], interval={}s",
            pid.domain, kp, ki, kd, output_min, output_max, dt
        );

        pid
    }

    /// The domain this controller belongs to.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The current integral state.
    pub fn integral(&self) -> F {
        self.integral
    }

    /// Computes the next output from the current error
    /// (`measured - setpoint - extra_margin`).
    ///
    /// Never fails; the output is always within `[output_min, output_max]`.
    pub fn compute(&mut self, error: F) -> (F, PidDetails<F>) {
        // Proportional term - current error
        let proportional = error;

        // Derivative term - rate of change of error
        let derivative = if self.first_run {
            self.first_run = false;
            F::zero()
        } else {
            (error - self.prev_error) / self.dt
        };

        // Integral term - accumulated error over time
        let integral = self.integral + error * self.dt;

        let output = self.kp * proportional + self.ki * integral + self.kd * derivative;
        let saturated_output = output.max(self.output_min).min(self.output_max);

        // Only keep the new integral if the output is not saturated, or if
        // the error is pulling the output back out of saturation.
        let should_update_integral = (output <= self.output_max || error < F::zero())
            && (output >= self.output_min || error > F::zero());
        if should_update_integral {
            self.integral = integral;
        }
        self.prev_error = error;

        let mut flags = String::new();
        if saturated_output != output {
            flags.push_str("   (output saturated");
        }
        if !should_update_integral {
            flags.push_str(if flags.is_empty() {
                "   (integral frozen"
            } else {
                ", integral frozen"
            });
        }
        if !flags.is_empty() {
            flags.push(')');
        }
        debug!(
            "[{}] PID=[ {:8.3} {:8.3} {:8.3} ]   =>   OUT={:8.3}{}",
            self.domain, proportional, integral, derivative, output, flags
        );

        let details = PidDetails {
            p: proportional,
            i: self.integral,
            d: derivative,
            raw_output: output,
            saturated_output,
            frozen_integral: !should_update_integral,
        };

        (saturated_output, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn pid(kp: f64, ki: f64, kd: f64, min: f64, max: f64, dt: f64) -> DomainPid<f64> {
        DomainPid::new("test", dt, kp, ki, kd, min, max)
    }

    #[test]
    fn integral_seeds_to_midrange() {
        let mut p = pid(1.0, 2.0, 0.0, 40.0, 100.0, 1.0);
        // (40 + 100) / 2 / 2 = 35
        assert!(approx_eq!(f64, p.integral(), 35.0));
        // First sample with zero error sits at the midpoint of the range.
        let (out, details) = p.compute(0.0);
        assert!(approx_eq!(f64, out, 70.0));
        assert!(!details.frozen_integral);
    }

    #[test]
    fn zero_integral_gain_seeds_to_zero() {
        let p = pid(1.0, 0.0, 0.0, 40.0, 100.0, 1.0);
        assert_eq!(p.integral(), 0.0);
    }

    #[test]
    fn first_tick_matches_hand_computation() {
        // interval=5, KP=1, KI=0.1, KD=2, limits [40,100]: seed integral is
        // (40+100)/2/0.1 = 700. With error +3: P=3, D=0 (first run),
        // I' = 700 + 3*5 = 715, u = 3 + 71.5 + 0 = 74.5.
        let mut p = pid(1.0, 0.1, 2.0, 40.0, 100.0, 5.0);
        assert!(approx_eq!(f64, p.integral(), 700.0));
        let (out, details) = p.compute(3.0);
        assert!(approx_eq!(f64, details.p, 3.0));
        assert!(approx_eq!(f64, details.d, 0.0));
        assert!(approx_eq!(f64, details.i, 715.0));
        assert!(approx_eq!(f64, details.raw_output, 74.5));
        assert!(approx_eq!(f64, out, 74.5));
        assert!(!details.frozen_integral);
    }

    #[test]
    fn output_is_always_clamped() {
        let mut p = pid(3.0, 0.5, 1.0, 40.0, 100.0, 1.0);
        for error in [-500.0, -20.0, -1.0, 0.0, 0.5, 30.0, 900.0] {
            let (out, details) = p.compute(error);
            assert!((40.0..=100.0).contains(&out), "error {error} => out {out}");
            assert!(approx_eq!(f64, details.saturated_output, out));
        }
    }

    #[test]
    fn saturation_freezes_integral_bit_exactly() {
        let mut p = pid(1.0, 0.1, 2.0, 40.0, 100.0, 5.0);
        p.compute(3.0);
        let pre_saturation = p.integral();

        // A large positive error drives the output past the max; the
        // integral must hold at its pre-saturation value.
        let (out, details) = p.compute(50.0);
        assert_eq!(out, 100.0);
        assert!(details.frozen_integral);
        assert_eq!(p.integral().to_bits(), pre_saturation.to_bits());

        // And it stays held while saturation persists.
        let (_, details) = p.compute(50.0);
        assert!(details.frozen_integral);
        assert_eq!(p.integral().to_bits(), pre_saturation.to_bits());
    }

    #[test]
    fn negative_error_unwinds_saturation() {
        let mut p = pid(1.0, 1.0, 5.0, 40.0, 100.0, 1.0);
        // u = -50 + 20 = -30 < min with a negative error: held low.
        let (out, details) = p.compute(-50.0);
        assert_eq!(out, 40.0);
        assert!(details.frozen_integral);
        let held = p.integral();
        assert_eq!(held, 70.0);

        // The derivative kick sends the raw output past the max while the
        // error is still negative: the integral must be free to shrink.
        let (out, details) = p.compute(-10.0);
        assert_eq!(out, 100.0);
        assert!(details.raw_output > 100.0);
        assert!(!details.frozen_integral);
        assert!(p.integral() < held);
        assert_eq!(p.integral(), 60.0);
    }

    #[test]
    fn zero_error_steady_state_outputs_ki_times_integral() {
        let mut p = pid(2.0, 0.5, 1.0, 40.0, 100.0, 1.0);
        let (first, _) = p.compute(0.0);
        let integral = p.integral();
        for _ in 0..10 {
            let (out, details) = p.compute(0.0);
            assert!(approx_eq!(f64, out, first));
            assert!(approx_eq!(f64, out, 0.5 * integral));
            assert!(approx_eq!(f64, details.d, 0.0));
        }
    }
}
