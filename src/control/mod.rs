//! Control law and the periodic loop that drives it.

pub mod monitor;
pub mod pid;

pub use monitor::{MonitorConfig, MonitorLoop, MonitorState, MonitorStats, run_monitor};
pub use pid::{PidController, PidGains};
