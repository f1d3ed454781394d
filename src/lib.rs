//! fanctl: closed-loop fan control.
//!
//! A temperature source feeds a PID controller whose bounded output drives a
//! PWM fan actuator (bit-banged GPIO or a sysfs PWM channel), ticking on a
//! fixed interval until cancelled.

pub mod actuation;
pub mod config;
pub mod control;
pub mod error;
pub mod sensing;
pub mod utils;

pub use actuation::{Actuator, ActuatorConfig, DutyCycleActuator};
pub use config::FanConfig;
pub use control::{MonitorConfig, MonitorLoop, MonitorStats, run_monitor};
pub use error::{ActuatorError, ConfigError, MonitorError, ReadError, SourceError, TelemetryError};
pub use sensing::{ReadTemperature, SourceSelector, TemperatureSource};
pub use utils::telemetry::{GaugeBoard, LogSink, Reading, Telemetry, TelemetrySink};
