pub mod telemetry;

pub use telemetry::{GaugeBoard, LogSink, Reading, Telemetry, TelemetrySink};
