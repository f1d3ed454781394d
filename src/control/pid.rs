//! pid.rs
//! PID control law for the cooling fan, output bounded to a duty cycle in [0, 100].
//!
//! Sign convention: the configured gains are positive, but the controller runs
//! with (-Kp, -Ki, -Kd). `error = target - measured` goes negative when the
//! plant is hotter than target, and the fan must then speed up, so the gains
//! are negated to make the output grow as the temperature climbs above target.
//!
//! Sample time is fixed to the monitor's check interval, so the output is a
//! deterministic function of the measurement sequence.

use serde::Deserialize;

use crate::error::ConfigError;

pub const OUTPUT_MIN: f64 = 0.0;
pub const OUTPUT_MAX: f64 = 100.0;

/// Configured (positive) gains.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 5.0,
            ki: 0.1,
            kd: 0.5,
        }
    }
}

impl PidGains {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::invalid(format!(
                    "pid.{} must be positive, got {:.3}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    target: f64,
    dt: f64,
    integral: f64,
    prev_error: Option<f64>,
}

impl PidController {
    /// `dt_secs` is the fixed sample time (the check interval).
    pub fn new(target: f64, gains: PidGains, dt_secs: f64) -> Result<Self, ConfigError> {
        gains.validate()?;
        if !(dt_secs > 0.0) || !dt_secs.is_finite() {
            return Err(ConfigError::invalid(format!(
                "sample time must be positive, got {}s",
                dt_secs
            )));
        }

        Ok(Self {
            kp: -gains.kp,
            ki: -gains.ki,
            kd: -gains.kd,
            target,
            dt: dt_secs,
            integral: 0.0,
            prev_error: None,
        })
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Effective (negated) gains the law is running with.
    pub fn effective_gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    /// Feeds one measurement and returns the new output in [0, 100].
    pub fn update(&mut self, measured: f64) -> f64 {
        let error = self.target - measured;

        let p = self.kp * error;

        // gain folded into the accumulator, which is held inside the output range
        self.integral = (self.integral + self.ki * error * self.dt).clamp(OUTPUT_MIN, OUTPUT_MAX);

        let d = match self.prev_error {
            Some(prev) => self.kd * (error - prev) / self.dt,
            None => 0.0,
        };
        self.prev_error = Some(error);

        (p + self.integral + d).clamp(OUTPUT_MIN, OUTPUT_MAX)
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }
}
