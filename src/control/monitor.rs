//! monitor.rs
//! The fan control loop: read → PID → actuate → telemetry, once per check interval.
//!
//! States: Initializing → Running → ShuttingDown → Stopped.
//! - Initializing: build and start the actuator, build the PID controller.
//!   Any failure here is fatal; nothing ticks.
//! - Running: a failed read skips the tick (no PID update, no duty change).
//! - ShuttingDown: entered on cancellation; checked between ticks, never mid-tick.
//! - Stopped: the actuator has been stopped exactly once if it was started.

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::actuation::{Actuator, ActuatorConfig, DutyCycleActuator};
use crate::control::{PidController, PidGains};
use crate::error::MonitorError;
use crate::sensing::ReadTemperature;
use crate::utils::telemetry::{Reading, Telemetry};

pub const TEMPERATURE_GAUGE: &str = "fanctl.temperature.celsius";
pub const TEMPERATURE_UNIT: &str = "Cel";
pub const DUTY_CYCLE_GAUGE: &str = "fanctl.fan.duty_cycle.percent";
pub const DUTY_CYCLE_UNIT: &str = "%";

/// Fully resolved loop configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub target: f64,
    pub gains: PidGains,
    pub check_interval: Duration,
    pub actuator: ActuatorConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStats {
    /// Ticks that read a temperature and actuated.
    pub ticks: u64,
    /// Ticks dropped because the read failed.
    pub skipped_reads: u64,
    /// Ticks whose body took longer than the check interval.
    pub overruns: u64,
}

pub struct MonitorLoop {
    config: MonitorConfig,
    telemetry: Telemetry,
    state: MonitorState,
    stats: MonitorStats,
}

impl MonitorLoop {
    pub fn new(config: MonitorConfig, telemetry: Telemetry) -> Self {
        Self {
            config,
            telemetry,
            state: MonitorState::Initializing,
            stats: MonitorStats::default(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Builds the configured actuator and runs until `cancel` fires.
    pub async fn run<S>(&mut self, source: &S, cancel: CancellationToken) -> Result<MonitorStats, MonitorError>
    where
        S: ReadTemperature,
    {
        self.enter(MonitorState::Initializing);
        let mut actuator = match Actuator::from_config(&self.config.actuator) {
            Ok(actuator) => actuator,
            Err(e) => {
                self.enter(MonitorState::Stopped);
                return Err(e.into());
            }
        };
        info!("[Monitor] actuator: {}", actuator.describe());
        self.run_with(source, &mut actuator, cancel).await
    }

    /// Runs the loop against an already built actuator.
    pub async fn run_with<S, A>(
        &mut self,
        source: &S,
        actuator: &mut A,
        cancel: CancellationToken,
    ) -> Result<MonitorStats, MonitorError>
    where
        S: ReadTemperature,
        A: DutyCycleActuator,
    {
        self.enter(MonitorState::Initializing);
        self.stats = MonitorStats::default();

        if let Err(e) = actuator.start() {
            error!("[Monitor] actuator failed to start: {}", e);
            self.enter(MonitorState::Stopped);
            return Err(e.into());
        }

        let outcome = match PidController::new(
            self.config.target,
            self.config.gains,
            self.config.check_interval.as_secs_f64(),
        ) {
            Ok(pid) => {
                info!(
                    "[Monitor] target {:.1}°C, gains kp={} ki={} kd={}, every {:?}",
                    self.config.target,
                    self.config.gains.kp,
                    self.config.gains.ki,
                    self.config.gains.kd,
                    self.config.check_interval
                );
                self.enter(MonitorState::Running);
                self.drive(source, actuator, pid, &cancel).await;
                Ok(self.stats)
            }
            Err(e) => {
                error!("[Monitor] controller setup failed: {}", e);
                Err(e.into())
            }
        };

        actuator.stop();
        self.enter(MonitorState::Stopped);

        if outcome.is_ok() {
            info!(
                "[Monitor] stopped after {} ticks ({} skipped reads, {} overruns)",
                self.stats.ticks, self.stats.skipped_reads, self.stats.overruns
            );
        }
        outcome
    }

    async fn drive<S, A>(&mut self, source: &S, actuator: &A, mut pid: PidController, cancel: &CancellationToken)
    where
        S: ReadTemperature,
        A: DutyCycleActuator,
    {
        let period = self.config.check_interval;
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.enter(MonitorState::ShuttingDown);
                    break;
                }
                _ = ticker.tick() => {
                    let started = Instant::now();
                    self.tick(source, actuator, &mut pid).await;
                    let elapsed = started.elapsed();
                    if elapsed > period {
                        self.stats.overruns += 1;
                        warn!(
                            "[Monitor] tick took {:?}, longer than the {:?} interval",
                            elapsed, period
                        );
                    }
                }
            }
        }
    }

    async fn tick<S, A>(&mut self, source: &S, actuator: &A, pid: &mut PidController)
    where
        S: ReadTemperature,
        A: DutyCycleActuator,
    {
        let temperature = match source.read().await {
            Ok(t) => t,
            Err(e) => {
                self.stats.skipped_reads += 1;
                warn!("[Monitor] temperature read failed, skipping tick: {}", e);
                return;
            }
        };

        let duty = pid.update(temperature);
        actuator.set_duty_cycle(duty);
        self.stats.ticks += 1;

        debug!("[Monitor] {:.2}°C → duty {:.1}%", temperature, duty);

        self.telemetry
            .record(Reading::new(TEMPERATURE_GAUGE, temperature, TEMPERATURE_UNIT));
        self.telemetry
            .record(Reading::new(DUTY_CYCLE_GAUGE, duty, DUTY_CYCLE_UNIT));
    }

    fn enter(&mut self, next: MonitorState) {
        if self.state != next {
            debug!("[Monitor] {:?} → {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Runs the fan control loop until `cancel` fires, with an already constructed source.
pub async fn run_monitor(
    config: &MonitorConfig,
    source: &mut impl ReadTemperature,
    telemetry: &Telemetry,
    cancel: CancellationToken,
) -> Result<MonitorStats, MonitorError> {
    MonitorLoop::new(config.clone(), telemetry.clone())
        .run(&*source, cancel)
        .await
}
