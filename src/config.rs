//! config.rs
//! YAML configuration for the fan controller.
//!
//! Every field has a default, so an empty file (or none of a section) yields the
//! stock setup: software PWM on gpiochip0 pin 13 at 25 kHz, 55 °C target,
//! thermal-zone file source, gains (5, 0.1, 0.5), 1 s check interval.

use std::{fs, io, path::Path, time::Duration};

use serde::Deserialize;

use crate::actuation::ActuatorConfig;
use crate::control::{MonitorConfig, PidGains};
use crate::error::ConfigError;
use crate::sensing::{SourceConfig, SourceKind};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/fanctl/fan.yaml";

pub const PIN_MAX: u32 = 27;
pub const TARGET_MIN: f64 = 20.0;
pub const TARGET_MAX: f64 = 90.0;

/// Human-readable durations (`"1s"`, `"250ms"`) for serde.
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) if !s.trim().is_empty() => humantime::parse_duration(s.trim())
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub chip_name: String,
    pub pin: u32,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            chip_name: "gpiochip0".into(),
            pin: 13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PwmMode {
    #[default]
    Software,
    Hardware,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HardwarePwmConfig {
    pub chip: String,
    pub channel: u32,
    pub inverted: bool,
}

impl Default for HardwarePwmConfig {
    fn default() -> Self {
        Self {
            chip: "pwmchip0".into(),
            channel: 1,
            inverted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    pub mode: PwmMode,
    pub frequency_khz: f64,
    pub hardware: HardwarePwmConfig,
    /// Core to pin the software timing thread to.
    pub cpu_core: Option<usize>,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            mode: PwmMode::Software,
            frequency_khz: 25.0,
            hardware: HardwarePwmConfig::default(),
            cpu_core: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TemperatureConfig {
    /// Target temperature in °C.
    pub target: f64,
    pub source: SourceConfig,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            target: 55.0,
            source: SourceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct FanConfig {
    pub gpio: GpioConfig,
    pub pwm: PwmConfig,
    pub temperature: TemperatureConfig,
    pub pid: PidGains,
    pub monitor: MonitorSettings,
}

impl FanConfig {
    /// Reads, parses and validates a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: FanConfig = if text.trim().is_empty() {
            FanConfig::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gpio.pin > PIN_MAX {
            return Err(ConfigError::invalid(format!(
                "gpio.pin must be within 0..={}, got {}",
                PIN_MAX, self.gpio.pin
            )));
        }
        if self.gpio.chip_name.trim().is_empty() && self.pwm.mode == PwmMode::Software {
            return Err(ConfigError::invalid("gpio.chip_name must not be empty"));
        }
        if !(self.pwm.frequency_khz > 0.0) || !self.pwm.frequency_khz.is_finite() {
            return Err(ConfigError::invalid(format!(
                "pwm.frequency_khz must be positive, got {}",
                self.pwm.frequency_khz
            )));
        }
        if self.pwm.mode == PwmMode::Hardware && self.pwm.hardware.chip.trim().is_empty() {
            return Err(ConfigError::invalid("pwm.hardware.chip must not be empty"));
        }

        let target = self.temperature.target;
        if !(TARGET_MIN..=TARGET_MAX).contains(&target) {
            return Err(ConfigError::invalid(format!(
                "temperature.target must be within [{}, {}] °C, got {}",
                TARGET_MIN, TARGET_MAX, target
            )));
        }

        self.pid.validate()?;

        if self.monitor.check_interval.is_zero() {
            return Err(ConfigError::invalid("monitor.check_interval must be non-zero"));
        }

        let source = &self.temperature.source;
        if source.file.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("temperature.source.file.path must not be empty"));
        }
        if source.primary == SourceKind::RemoteQuery {
            let remote = source.remote.as_ref().ok_or_else(|| {
                ConfigError::invalid("temperature.source.remote is required for remote-query")
            })?;
            let host = remote.host.trim();
            if !host.starts_with("http://") && !host.starts_with("https://") {
                return Err(ConfigError::invalid(format!(
                    "temperature.source.remote.host must start with http:// or https://, got '{}'",
                    host
                )));
            }
        }

        Ok(())
    }

    pub fn actuator_config(&self) -> ActuatorConfig {
        match self.pwm.mode {
            PwmMode::Software => ActuatorConfig::Software {
                chip: self.gpio.chip_name.clone(),
                pin: self.gpio.pin,
                frequency_hz: self.pwm.frequency_khz * 1000.0,
                cpu_core: self.pwm.cpu_core,
            },
            PwmMode::Hardware => ActuatorConfig::Hardware {
                chip: self.pwm.hardware.chip.clone(),
                channel: self.pwm.hardware.channel,
                frequency_khz: self.pwm.frequency_khz,
                inverted: self.pwm.hardware.inverted,
            },
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            target: self.temperature.target,
            gains: self.pid,
            check_interval: self.monitor.check_interval,
            actuator: self.actuator_config(),
        }
    }

    pub fn source_config(&self) -> &SourceConfig {
        &self.temperature.source
    }
}
