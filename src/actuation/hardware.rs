//! hardware.rs
//! Hardware PWM through the Linux sysfs PWM interface.
//!
//! Layout under the root (default `/sys/class/pwm`):
//!   <chip>/export                      ← channel number
//!   <chip>/pwm<N>/{enable,period,duty_cycle}
//!
//! All values are decimal text; period and duty cycle are in nanoseconds.

use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::actuation::{DutyCycleActuator, clamp_duty};
use crate::error::ActuatorError;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/pwm";
pub const EXPORT_ATTEMPTS: u32 = 20;
pub const EXPORT_POLL: Duration = Duration::from_millis(25);

/// `period_ns = trunc(1e6 / kHz)`.
pub fn period_ns_from_khz(frequency_khz: f64) -> Result<u64, ActuatorError> {
    if !(frequency_khz > 0.0) || !frequency_khz.is_finite() {
        return Err(ActuatorError::InvalidFrequency(frequency_khz));
    }
    let period_ns = (1e6 / frequency_khz) as u64;
    if period_ns == 0 {
        return Err(ActuatorError::InvalidFrequency(frequency_khz));
    }
    Ok(period_ns)
}

/// Active time written to `duty_cycle` for a percentage, inverted if requested.
pub fn active_ns(period_ns: u64, dc: f64, inverted: bool) -> u64 {
    let on = (period_ns as f64 * clamp_duty(dc) / 100.0).round() as u64;
    let on = on.min(period_ns);
    if inverted { period_ns - on } else { on }
}

#[derive(Debug)]
struct ChannelState {
    duty: f64,
    enabled: bool,
}

#[derive(Debug)]
pub struct HardwareActuator {
    chip: String,
    channel: u32,
    period_ns: u64,
    inverted: bool,
    root: PathBuf,
    export_attempts: u32,
    export_poll: Duration,
    state: Mutex<ChannelState>,
}

impl HardwareActuator {
    pub fn new(
        chip: impl Into<String>,
        channel: u32,
        frequency_khz: f64,
        inverted: bool,
    ) -> Result<Self, ActuatorError> {
        Ok(Self {
            chip: chip.into(),
            channel,
            period_ns: period_ns_from_khz(frequency_khz)?,
            inverted,
            root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            export_attempts: EXPORT_ATTEMPTS,
            export_poll: EXPORT_POLL,
            state: Mutex::new(ChannelState {
                duty: 0.0,
                enabled: false,
            }),
        })
    }

    /// Points the actuator at another sysfs tree (tests, containers with a bind mount).
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_export_wait(mut self, attempts: u32, poll: Duration) -> Self {
        self.export_attempts = attempts;
        self.export_poll = poll;
        self
    }

    pub fn chip(&self) -> &str {
        &self.chip
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub fn chip_path(&self) -> PathBuf {
        self.root.join(&self.chip)
    }

    pub fn channel_path(&self) -> PathBuf {
        self.chip_path().join(format!("pwm{}", self.channel))
    }

    fn export(&self) -> Result<(), ActuatorError> {
        let channel_dir = self.channel_path();
        if channel_dir.is_dir() {
            debug!("[HwPWM] pwm{} already exported", self.channel);
            return Ok(());
        }

        fs::write(self.chip_path().join("export"), self.channel.to_string()).map_err(|source| {
            ActuatorError::Export {
                channel: self.channel,
                source,
            }
        })?;

        // the kernel creates the channel directory asynchronously
        for _ in 0..self.export_attempts {
            if channel_dir.is_dir() {
                return Ok(());
            }
            thread::sleep(self.export_poll);
        }
        if channel_dir.is_dir() {
            return Ok(());
        }

        Err(ActuatorError::ExportTimeout {
            channel: self.channel,
            attempts: self.export_attempts,
        })
    }

    fn write_attr(&self, attribute: &'static str, value: impl Display) -> Result<(), ActuatorError> {
        write_attr(&self.channel_path(), attribute, value)
    }
}

fn write_attr(dir: &Path, attribute: &'static str, value: impl Display) -> Result<(), ActuatorError> {
    let path = dir.join(attribute);
    fs::write(&path, value.to_string()).map_err(|source| ActuatorError::Sysfs {
        attribute,
        path,
        source,
    })
}

impl DutyCycleActuator for HardwareActuator {
    /// export → disable → duty 0 → period → cached duty → enable.
    ///
    /// Duty is zeroed before the period is written so the kernel never sees
    /// duty_cycle > period while the period shrinks.
    fn start(&mut self) -> Result<(), ActuatorError> {
        let mut state = self.state.lock();
        if state.enabled {
            return Ok(());
        }

        self.export()?;
        self.write_attr("enable", 0)?;
        self.write_attr("duty_cycle", 0)?;
        self.write_attr("period", self.period_ns)?;
        self.write_attr("duty_cycle", active_ns(self.period_ns, state.duty, self.inverted))?;
        self.write_attr("enable", 1)?;
        state.enabled = true;

        info!(
            "[HwPWM] {} pwm{} enabled: period {}ns, duty {:.1}%{}",
            self.chip,
            self.channel,
            self.period_ns,
            state.duty,
            if self.inverted { " (inverted)" } else { "" }
        );
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }
        state.enabled = false;
        match self.write_attr("enable", 0) {
            Ok(()) => info!("[HwPWM] {} pwm{} disabled", self.chip, self.channel),
            Err(e) => warn!("[HwPWM] failed to disable channel: {}", e),
        }
    }

    fn set_duty_cycle(&self, percent: f64) {
        let mut state = self.state.lock();
        state.duty = clamp_duty(percent);
        if !state.enabled {
            return;
        }
        let ns = active_ns(self.period_ns, state.duty, self.inverted);
        if let Err(e) = self.write_attr("duty_cycle", ns) {
            warn!("[HwPWM] failed to set duty cycle {:.1}%: {}", state.duty, e);
        }
    }

    fn duty_cycle(&self) -> f64 {
        self.state.lock().duty
    }

    fn is_running(&self) -> bool {
        self.state.lock().enabled
    }
}

impl Drop for HardwareActuator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn period_truncates_like_integer_division() {
        assert_eq!(period_ns_from_khz(25.0).unwrap(), 40_000);
        assert_eq!(period_ns_from_khz(1.0).unwrap(), 1_000_000);
        assert_eq!(period_ns_from_khz(3.0).unwrap(), 333_333);
    }

    #[test]
    fn period_rejects_nonsense() {
        for khz in [0.0, -1.0, f64::NAN, f64::INFINITY, 2e6] {
            assert!(
                matches!(period_ns_from_khz(khz), Err(ActuatorError::InvalidFrequency(_))),
                "{} kHz accepted",
                khz
            );
        }
    }

    #[test]
    fn active_time_rounds_and_inverts() {
        assert_eq!(active_ns(40_000, 0.0, false), 0);
        assert_eq!(active_ns(40_000, 25.0, false), 10_000);
        assert_eq!(active_ns(40_000, 100.0, false), 40_000);
        assert_eq!(active_ns(40_000, 25.0, true), 30_000);
        assert_eq!(active_ns(40_000, 0.0, true), 40_000);
        assert_eq!(active_ns(333_333, 50.0, false), 166_667);
        assert_eq!(active_ns(40_000, 180.0, false), 40_000);
        assert_eq!(active_ns(40_000, f64::NAN, false), 0);
    }

    proptest! {
        #[test]
        fn active_time_stays_within_the_period(period_ns in 1u64..10_000_000, dc in 0.0f64..=100.0) {
            let on = active_ns(period_ns, dc, false);
            prop_assert!(on <= period_ns);
            prop_assert_eq!(on, (period_ns as f64 * dc / 100.0).round() as u64);
            prop_assert_eq!(active_ns(period_ns, dc, true), period_ns - on);
            prop_assert_eq!(active_ns(period_ns, 0.0, false), 0);
            prop_assert_eq!(active_ns(period_ns, 100.0, false), period_ns);
        }
    }

    #[test]
    fn channel_paths_follow_sysfs_layout() {
        let a = HardwareActuator::new("pwmchip0", 1, 25.0, false)
            .unwrap()
            .with_sysfs_root("/tmp/fake-pwm");
        assert_eq!(a.chip_path(), PathBuf::from("/tmp/fake-pwm/pwmchip0"));
        assert_eq!(a.channel_path(), PathBuf::from("/tmp/fake-pwm/pwmchip0/pwm1"));
    }

    #[test]
    fn duty_is_cached_until_started() {
        let a = HardwareActuator::new("pwmchip0", 1, 25.0, false)
            .unwrap()
            .with_sysfs_root("/nonexistent/pwm");
        a.set_duty_cycle(42.0);
        assert_eq!(a.duty_cycle(), 42.0);
        assert!(!a.is_running());
    }
}
