//! Fan actuation: turning a duty-cycle percentage into a PWM signal.
//!
//! Two variants behind one capability (`DutyCycleActuator`):
//! - **SoftwareActuator:** bit-bangs a GPIO line from a dedicated high-priority timing thread.
//! - **HardwareActuator:** programs a platform PWM channel through its sysfs control surface.
//!
//! Exactly one variant is live per process, chosen from `ActuatorConfig` at startup.

pub mod hardware;
pub mod line;
pub mod software;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ActuatorError;

pub use hardware::HardwareActuator;
pub use line::{CdevLineProvider, LineProvider, OutputLine};
pub use software::{PeriodPlan, SoftwareActuator};

pub const DUTY_MIN: f64 = 0.0;
pub const DUTY_MAX: f64 = 100.0;

/// Clamps a duty cycle into [0, 100]. NaN maps to 0 (fan off is never torn or undefined).
#[inline]
pub fn clamp_duty(dc: f64) -> f64 {
    if dc.is_nan() {
        DUTY_MIN
    } else {
        dc.clamp(DUTY_MIN, DUTY_MAX)
    }
}

/// Single duty-cycle value shared between the control tick and a timing loop.
///
/// Stored as the f64 bit pattern in one atomic word, so readers never observe a torn value.
#[derive(Debug)]
pub struct DutyCell(AtomicU64);

impl DutyCell {
    pub fn new(dc: f64) -> Self {
        Self(AtomicU64::new(clamp_duty(dc).to_bits()))
    }

    /// Clamps and publishes; returns the stored value.
    #[inline]
    pub fn store(&self, dc: f64) -> f64 {
        let dc = clamp_duty(dc);
        self.0.store(dc.to_bits(), Ordering::Release);
        dc
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

impl Default for DutyCell {
    fn default() -> Self {
        Self::new(DUTY_MIN)
    }
}

/// Shared contract of every PWM actuator.
pub trait DutyCycleActuator: Send {
    /// Claims the output and begins driving it. Calling it while running is a no-op.
    fn start(&mut self) -> Result<(), ActuatorError>;

    /// Leaves the output inactive and releases it. Idempotent; failures are logged only.
    fn stop(&mut self);

    /// Clamps to [0, 100] and publishes the new duty cycle. Never blocks on the output.
    fn set_duty_cycle(&self, percent: f64);

    /// Last published duty cycle.
    fn duty_cycle(&self) -> f64;

    fn is_running(&self) -> bool;
}

/// Which actuator to build, resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorConfig {
    Software {
        chip: String,
        pin: u32,
        frequency_hz: f64,
        /// Optional CPU core for the timing thread.
        cpu_core: Option<usize>,
    },
    Hardware {
        chip: String,
        channel: u32,
        frequency_khz: f64,
        inverted: bool,
    },
}

impl ActuatorConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ActuatorConfig::Software { .. } => "software",
            ActuatorConfig::Hardware { .. } => "hardware",
        }
    }
}

#[derive(Debug)]
pub enum Actuator {
    Software(SoftwareActuator),
    Hardware(HardwareActuator),
}

impl Actuator {
    pub fn from_config(cfg: &ActuatorConfig) -> Result<Self, ActuatorError> {
        match cfg {
            ActuatorConfig::Software {
                chip,
                pin,
                frequency_hz,
                cpu_core,
            } => {
                let mut actuator = SoftwareActuator::new(chip.clone(), *pin, *frequency_hz)?;
                if let Some(core) = cpu_core {
                    actuator = actuator.with_cpu_core(*core);
                }
                Ok(Actuator::Software(actuator))
            }
            ActuatorConfig::Hardware {
                chip,
                channel,
                frequency_khz,
                inverted,
            } => Ok(Actuator::Hardware(HardwareActuator::new(
                chip.clone(),
                *channel,
                *frequency_khz,
                *inverted,
            )?)),
        }
    }

    /// One-line summary for the startup log.
    pub fn describe(&self) -> String {
        match self {
            Actuator::Software(a) => format!(
                "software {:.2}kHz on {} pin {}",
                a.frequency_hz() / 1000.0,
                a.chip(),
                a.pin()
            ),
            Actuator::Hardware(a) => format!(
                "hardware {} pwm{} period {}ns ({:.2}kHz) inverted={}",
                a.chip(),
                a.channel(),
                a.period_ns(),
                1e6 / a.period_ns() as f64,
                a.inverted()
            ),
        }
    }
}

impl DutyCycleActuator for Actuator {
    fn start(&mut self) -> Result<(), ActuatorError> {
        match self {
            Actuator::Software(a) => a.start(),
            Actuator::Hardware(a) => a.start(),
        }
    }

    fn stop(&mut self) {
        match self {
            Actuator::Software(a) => a.stop(),
            Actuator::Hardware(a) => a.stop(),
        }
    }

    fn set_duty_cycle(&self, percent: f64) {
        match self {
            Actuator::Software(a) => a.set_duty_cycle(percent),
            Actuator::Hardware(a) => a.set_duty_cycle(percent),
        }
    }

    fn duty_cycle(&self) -> f64 {
        match self {
            Actuator::Software(a) => a.duty_cycle(),
            Actuator::Hardware(a) => a.duty_cycle(),
        }
    }

    fn is_running(&self) -> bool {
        match self {
            Actuator::Software(a) => a.is_running(),
            Actuator::Hardware(a) => a.is_running(),
        }
    }
}
