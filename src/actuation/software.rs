//! software.rs
//! Software PWM: a dedicated timing thread toggles a GPIO output line.
//!
//! - Duty cycle is published through a `DutyCell` and re-read once per period,
//!   so a change takes effect at the next period boundary.
//! - Timing thread runs at `ThreadPriority::Max`, optionally pinned to one core,
//!   and waits with `SpinSleeper` against absolute deadlines.
//! - Stop is signalled over a bounded crossbeam channel. Waits block on the
//!   channel until shortly before each deadline, so `stop()` returns within
//!   about a millisecond at any frequency and leaves the line inactive.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use log::{debug, error, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::actuation::{CdevLineProvider, DutyCell, DutyCycleActuator, LineProvider, OutputLine};
use crate::error::ActuatorError;

const CONSUMER: &str = "fanctl";
/// Waits longer than this block on the stop channel, the rest is spun.
const COARSE_WAIT_MARGIN: Duration = Duration::from_millis(1);

/// What the line does during one PWM period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodPlan {
    /// Level held for the whole period (0% or 100%).
    Hold { active: bool },
    /// Active for `active_for`, then inactive for `inactive_for`.
    Split {
        active_for: Duration,
        inactive_for: Duration,
    },
}

impl PeriodPlan {
    pub fn for_duty(dc: f64, period: Duration) -> Self {
        if !(dc > 0.0) {
            return PeriodPlan::Hold { active: false };
        }
        if dc >= 100.0 {
            return PeriodPlan::Hold { active: true };
        }
        let active_ns = (period.as_nanos() as f64 * dc / 100.0).round() as u64;
        let active_for = Duration::from_nanos(active_ns);
        // a split with an empty half would only glitch the line
        if active_for.is_zero() {
            return PeriodPlan::Hold { active: false };
        }
        if active_for >= period {
            return PeriodPlan::Hold { active: true };
        }
        PeriodPlan::Split {
            active_for,
            inactive_for: period - active_for,
        }
    }
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct SoftwareActuator {
    chip: String,
    pin: u32,
    frequency_hz: f64,
    period: Duration,
    cpu_core: Option<usize>,
    duty: Arc<DutyCell>,
    lines: Arc<dyn LineProvider>,
    worker: Option<Worker>,
}

impl std::fmt::Debug for SoftwareActuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareActuator")
            .field("chip", &self.chip)
            .field("pin", &self.pin)
            .field("frequency_hz", &self.frequency_hz)
            .field("cpu_core", &self.cpu_core)
            .field("duty", &self.duty.load())
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl SoftwareActuator {
    /// Actuator on the GPIO character device.
    pub fn new(chip: impl Into<String>, pin: u32, frequency_hz: f64) -> Result<Self, ActuatorError> {
        Self::with_provider(chip, pin, frequency_hz, Arc::new(CdevLineProvider))
    }

    /// Actuator claiming its line from `lines` instead of the character device.
    pub fn with_provider(
        chip: impl Into<String>,
        pin: u32,
        frequency_hz: f64,
        lines: Arc<dyn LineProvider>,
    ) -> Result<Self, ActuatorError> {
        if !(frequency_hz > 0.0) || !frequency_hz.is_finite() {
            return Err(ActuatorError::InvalidFrequency(frequency_hz));
        }
        let period_ns = (1e9 / frequency_hz).round() as u64;
        if period_ns == 0 {
            return Err(ActuatorError::InvalidFrequency(frequency_hz));
        }

        Ok(Self {
            chip: chip.into(),
            pin,
            frequency_hz,
            period: Duration::from_nanos(period_ns),
            cpu_core: None,
            duty: Arc::new(DutyCell::default()),
            lines,
            worker: None,
        })
    }

    pub fn with_cpu_core(mut self, core: usize) -> Self {
        self.cpu_core = Some(core);
        self
    }

    pub fn chip(&self) -> &str {
        &self.chip
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl DutyCycleActuator for SoftwareActuator {
    fn start(&mut self) -> Result<(), ActuatorError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let line = self.lines.claim(&self.chip, self.pin, CONSUMER)?;
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let duty = Arc::clone(&self.duty);
        let period = self.period;
        let core = self.cpu_core;
        let pin = self.pin;

        let handle = thread::Builder::new()
            .name(format!("soft-pwm-{}", pin))
            .spawn_with_priority(ThreadPriority::Max, move |priority| {
                if let Err(e) = priority {
                    warn!("[SoftPWM] could not raise timing thread priority: {:?}", e);
                }
                if let Some(core) = core {
                    pin_to_core(core);
                }
                run_timing_loop(line, period, &duty, &stop_rx);
            })
            .map_err(ActuatorError::Spawn)?;

        info!(
            "[SoftPWM] driving {} pin {} at {:.0} Hz",
            self.chip, self.pin, self.frequency_hz
        );
        self.worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        // A full channel already carries a stop request.
        let _ = worker.stop_tx.try_send(());
        if worker.handle.join().is_err() {
            error!("[SoftPWM] timing thread panicked");
        } else {
            info!("[SoftPWM] stopped, pin {} released", self.pin);
        }
    }

    fn set_duty_cycle(&self, percent: f64) {
        self.duty.store(percent);
    }

    fn duty_cycle(&self) -> f64 {
        self.duty.load()
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for SoftwareActuator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pin_to_core(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(core_id) if core_affinity::set_for_current(*core_id) => {
            debug!("[SoftPWM] timing thread pinned to core {}", core);
        }
        Some(_) => warn!("[SoftPWM] failed to pin timing thread to core {}", core),
        None => warn!("[SoftPWM] core {} not found among available cores", core),
    }
}

// ============================================================================
// Timing loop
// ============================================================================

struct DrivenLine {
    line: Box<dyn OutputLine>,
    failures: u64,
}

impl DrivenLine {
    fn drive(&mut self, active: bool) {
        if let Err(e) = self.line.set_active(active) {
            self.failures += 1;
            // first failure is loud, the rest would flood the log at PWM rate
            if self.failures == 1 {
                warn!("[SoftPWM] line write failed: {}", e);
            }
        }
    }
}

fn run_timing_loop(line: Box<dyn OutputLine>, period: Duration, duty: &DutyCell, stop_rx: &Receiver<()>) {
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    let mut line = DrivenLine { line, failures: 0 };
    let mut next = Instant::now();

    loop {
        match stop_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        match PeriodPlan::for_duty(duty.load(), period) {
            PeriodPlan::Hold { active } => {
                line.drive(active);
                next += period;
                if wait_or_stop(&sleeper, stop_rx, next) {
                    break;
                }
            }
            PeriodPlan::Split {
                active_for,
                inactive_for,
            } => {
                line.drive(true);
                next += active_for;
                if wait_or_stop(&sleeper, stop_rx, next) {
                    break;
                }
                line.drive(false);
                next += inactive_for;
                if wait_or_stop(&sleeper, stop_rx, next) {
                    break;
                }
            }
        }

        // fell more than a period behind: resync instead of bursting
        let now = Instant::now();
        if now > next + period {
            next = now;
        }
    }

    line.drive(false);
    if line.failures > 1 {
        warn!("[SoftPWM] {} line writes failed in total", line.failures);
    }
}

/// Waits for `deadline`; true when a stop arrived first.
fn wait_or_stop(sleeper: &SpinSleeper, stop_rx: &Receiver<()>, deadline: Instant) -> bool {
    let now = Instant::now();
    if deadline > now + COARSE_WAIT_MARGIN {
        match stop_rx.recv_timeout(deadline - now - COARSE_WAIT_MARGIN) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
    sleep_until(sleeper, deadline);
    false
}

#[inline]
fn sleep_until(sleeper: &SpinSleeper, deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        sleeper.sleep(deadline - now);
    }
}
