//! Telemetry emission for the control loop.
//!
//! Two built-in sinks:
//! - **LogSink:** one debug line per reading.
//! - **GaugeBoard:** latest value per gauge plus a bounded history (1000 points),
//!   shared behind a mutex so the caller can read it while the loop runs.
//!
//! A sink failing never reaches the control loop: `Telemetry::record` logs the
//! error and carries on with the remaining sinks.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::TelemetryError;

pub const MAX_POINTS: usize = 1_000;

/// One gauge observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub name: &'static str,
    pub value: f64,
    pub unit: &'static str,
}

impl Reading {
    pub fn new(name: &'static str, value: f64, unit: &'static str) -> Self {
        Self { name, value, unit }
    }
}

pub trait TelemetrySink: Send + Sync {
    fn name(&self) -> &'static str;
    fn record(&self, reading: &Reading) -> Result<(), TelemetryError>;
}

/// Fan-out over the configured sinks. Cheap to clone.
#[derive(Clone, Default)]
pub struct Telemetry {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|s| s.name()))
            .finish()
    }
}

impl Telemetry {
    /// No sinks: every reading is dropped.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Hands the reading to every sink. Returns how many sinks rejected it.
    pub fn record(&self, reading: Reading) -> usize {
        let mut failed = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.record(&reading) {
                failed += 1;
                warn!("[Telemetry] {}", e);
            }
        }
        failed
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn record(&self, reading: &Reading) -> Result<(), TelemetryError> {
        debug!(
            "[Telemetry] {} = {:.2} {}",
            reading.name, reading.value, reading.unit
        );
        Ok(())
    }
}

#[derive(Debug)]
struct Gauge {
    unit: &'static str,
    history: VecDeque<f64>,
}

/// In-process gauge store.
#[derive(Debug, Clone, Default)]
pub struct GaugeBoard {
    gauges: Arc<Mutex<HashMap<&'static str, Gauge>>>,
}

impl GaugeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, name: &str) -> Option<f64> {
        self.gauges
            .lock()
            .get(name)
            .and_then(|g| g.history.back().copied())
    }

    pub fn unit(&self, name: &str) -> Option<&'static str> {
        self.gauges.lock().get(name).map(|g| g.unit)
    }

    pub fn history(&self, name: &str) -> Vec<f64> {
        self.gauges
            .lock()
            .get(name)
            .map(|g| g.history.iter().copied().collect())
            .unwrap_or_default()
    }

    /// `(name, latest, unit)` for every gauge, sorted by name.
    pub fn snapshot(&self) -> Vec<(&'static str, f64, &'static str)> {
        let gauges = self.gauges.lock();
        let mut out: Vec<_> = gauges
            .iter()
            .filter_map(|(name, g)| g.history.back().map(|v| (*name, *v, g.unit)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }
}

impl TelemetrySink for GaugeBoard {
    fn name(&self) -> &'static str {
        "gauges"
    }

    fn record(&self, reading: &Reading) -> Result<(), TelemetryError> {
        if !reading.value.is_finite() {
            return Err(TelemetryError::Rejected {
                sink: self.name(),
                name: reading.name,
                reason: format!("non-finite value {}", reading.value),
            });
        }

        let mut gauges = self.gauges.lock();
        let gauge = gauges.entry(reading.name).or_insert_with(|| Gauge {
            unit: reading.unit,
            history: VecDeque::new(),
        });
        gauge.unit = reading.unit;
        if gauge.history.len() >= MAX_POINTS {
            gauge.history.pop_front();
        }
        gauge.history.push_back(reading.value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    impl TelemetrySink for Refusing {
        fn name(&self) -> &'static str {
            "refusing"
        }

        fn record(&self, reading: &Reading) -> Result<(), TelemetryError> {
            Err(TelemetryError::Rejected {
                sink: "refusing",
                name: reading.name,
                reason: "closed".into(),
            })
        }
    }

    #[test]
    fn failing_sink_does_not_starve_the_others() {
        let board = GaugeBoard::new();
        let telemetry = Telemetry::disabled()
            .with_sink(Arc::new(Refusing))
            .with_sink(Arc::new(board.clone()));

        let failed = telemetry.record(Reading::new("fan.duty", 42.0, "%"));
        assert_eq!(failed, 1);
        assert_eq!(board.latest("fan.duty"), Some(42.0));
        assert_eq!(board.unit("fan.duty"), Some("%"));
    }

    #[test]
    fn disabled_telemetry_drops_readings() {
        let telemetry = Telemetry::disabled();
        assert!(telemetry.is_empty());
        assert_eq!(telemetry.record(Reading::new("x", 1.0, "")), 0);
    }

    #[test]
    fn history_is_capped() {
        let board = GaugeBoard::new();
        for i in 0..(MAX_POINTS + 10) {
            board.record(&Reading::new("t", i as f64, "Cel")).unwrap();
        }
        let history = board.history("t");
        assert_eq!(history.len(), MAX_POINTS);
        assert_eq!(history[0], 10.0);
        assert_eq!(board.latest("t"), Some((MAX_POINTS + 9) as f64));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let board = GaugeBoard::new();
        assert!(board.record(&Reading::new("t", f64::NAN, "Cel")).is_err());
        assert_eq!(board.latest("t"), None);
    }

    #[test]
    fn snapshot_is_sorted() {
        let board = GaugeBoard::new();
        board.record(&Reading::new("b", 2.0, "%")).unwrap();
        board.record(&Reading::new("a", 1.0, "Cel")).unwrap();
        assert_eq!(board.snapshot(), vec![("a", 1.0, "Cel"), ("b", 2.0, "%")]);
    }
}
