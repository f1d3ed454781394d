use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use fanctl::actuation::{DutyCycleActuator, LineProvider, OutputLine, SoftwareActuator};
use fanctl::error::ActuatorError;
use parking_lot::Mutex;

type Edges = Arc<Mutex<Vec<(Instant, bool)>>>;

/// Records every level write with its timestamp.
struct RecordingLine {
    edges: Edges,
}

impl OutputLine for RecordingLine {
    fn set_active(&mut self, active: bool) -> Result<(), ActuatorError> {
        self.edges.lock().push((Instant::now(), active));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingLines {
    edges: Edges,
    claims: Mutex<u32>,
    busy: bool,
}

impl LineProvider for RecordingLines {
    fn claim(&self, chip: &str, pin: u32, _consumer: &str) -> Result<Box<dyn OutputLine>, ActuatorError> {
        if self.busy {
            return Err(ActuatorError::LineRequest {
                chip: chip.to_string(),
                pin,
                reason: "Device or resource busy".into(),
            });
        }
        *self.claims.lock() += 1;
        Ok(Box::new(RecordingLine {
            edges: Arc::clone(&self.edges),
        }))
    }
}

fn actuator(lines: &Arc<RecordingLines>, frequency_hz: f64) -> SoftwareActuator {
    let provider: Arc<dyn LineProvider> = lines.clone();
    SoftwareActuator::with_provider("gpiochip0", 13, frequency_hz, provider).unwrap()
}

fn run_for(pwm: &mut SoftwareActuator, duty: f64, time: Duration) {
    pwm.set_duty_cycle(duty);
    pwm.start().unwrap();
    thread::sleep(time);
    pwm.stop();
}

/// Durations of every complete active pulse (true → false).
fn pulse_widths(edges: &[(Instant, bool)]) -> Vec<Duration> {
    edges
        .windows(2)
        .filter(|w| w[0].1 && !w[1].1)
        .map(|w| w[1].0 - w[0].0)
        .collect()
}

#[test]
fn quarter_duty_is_active_for_a_quarter_period() {
    let lines = Arc::new(RecordingLines::default());
    // 100 Hz → 10 ms period, 2.5 ms active
    let mut pwm = actuator(&lines, 100.0);
    run_for(&mut pwm, 25.0, Duration::from_millis(300));

    let edges = lines.edges.lock().clone();
    let mut widths = pulse_widths(&edges);
    assert!(widths.len() >= 10, "only {} pulses", widths.len());

    widths.sort();
    let median = widths[widths.len() / 2];
    assert!(
        median >= Duration::from_micros(2_000) && median <= Duration::from_micros(4_000),
        "median active time {:?}",
        median
    );
}

#[test]
fn zero_duty_never_drives_the_line_active() {
    let lines = Arc::new(RecordingLines::default());
    let mut pwm = actuator(&lines, 200.0);
    run_for(&mut pwm, 0.0, Duration::from_millis(50));

    let edges = lines.edges.lock().clone();
    assert!(!edges.is_empty());
    assert!(edges.iter().all(|(_, active)| !active));
}

#[test]
fn full_duty_holds_active_and_releases_inactive() {
    let lines = Arc::new(RecordingLines::default());
    let mut pwm = actuator(&lines, 200.0);
    run_for(&mut pwm, 100.0, Duration::from_millis(50));

    let edges = lines.edges.lock().clone();
    let (last, rest) = edges.split_last().unwrap();
    assert!(!last.1, "line must end inactive");
    assert!(!rest.is_empty());
    assert!(rest.iter().all(|(_, active)| *active));
}

#[test]
fn duty_change_is_picked_up_while_running() {
    let lines = Arc::new(RecordingLines::default());
    let mut pwm = actuator(&lines, 200.0);
    pwm.set_duty_cycle(0.0);
    pwm.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    pwm.set_duty_cycle(100.0);
    thread::sleep(Duration::from_millis(30));
    pwm.stop();

    let edges = lines.edges.lock().clone();
    assert!(edges.iter().any(|(_, active)| *active));
    assert!(!edges.last().unwrap().1);
}

#[test]
fn stop_does_not_wait_out_a_long_period() {
    // 1 Hz: a 1 s hold or a 500 ms half-period is pending when stop arrives
    for duty in [0.0, 50.0, 100.0] {
        let lines = Arc::new(RecordingLines::default());
        let mut pwm = actuator(&lines, 1.0);
        pwm.set_duty_cycle(duty);
        pwm.start().unwrap();
        thread::sleep(Duration::from_millis(50));

        let asked = Instant::now();
        pwm.stop();
        let took = asked.elapsed();

        assert!(took < Duration::from_millis(200), "stop at {}% took {:?}", duty, took);
        assert!(!pwm.is_running());
        assert!(!lines.edges.lock().last().unwrap().1, "line must end inactive at {}%", duty);
    }
}

#[test]
fn stop_is_idempotent_and_restart_reclaims_the_line() {
    let lines = Arc::new(RecordingLines::default());
    let mut pwm = actuator(&lines, 500.0);

    pwm.start().unwrap();
    pwm.start().unwrap();
    assert_eq!(*lines.claims.lock(), 1);
    assert!(pwm.is_running());

    pwm.stop();
    pwm.stop();
    assert!(!pwm.is_running());

    pwm.start().unwrap();
    assert_eq!(*lines.claims.lock(), 2);
    drop(pwm);
    assert!(!lines.edges.lock().last().unwrap().1);
}

#[test]
fn busy_line_fails_start() {
    let lines = Arc::new(RecordingLines {
        busy: true,
        ..Default::default()
    });
    let mut pwm = actuator(&lines, 500.0);

    match pwm.start() {
        Err(ActuatorError::LineRequest { chip, pin, .. }) => {
            assert_eq!(chip, "gpiochip0");
            assert_eq!(pin, 13);
        }
        other => panic!("expected line request error, got {:?}", other),
    }
    assert!(!pwm.is_running());
}
