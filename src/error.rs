//! Error types for the fan controller.
//!
//! One enum per failure class:
//! - **ConfigError:** fatal, raised before the control loop starts.
//! - **SourceError:** temperature source could not be constructed (fatal unless a fallback succeeds).
//! - **ReadError:** a single temperature read failed (recoverable, the tick is skipped).
//! - **ActuatorError:** the PWM output could not be claimed or programmed (fatal at startup).
//! - **TelemetryError:** a sink rejected a reading (always logged, never fatal).
//!
//! `MonitorError` is the single wrapped failure handed back to the caller of the monitor loop.

use std::{io, num::ParseIntError, path::PathBuf};

use thiserror::Error;

use crate::sensing::SourceKind;

/// Configuration could not be loaded or does not describe a runnable controller.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {what}")]
    Invalid { what: String },
}

impl ConfigError {
    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Self::Invalid { what: what.into() }
    }
}

/// A temperature source could not be constructed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("remote query source requires a host")]
    MissingHost,

    #[error("remote query host must start with http:// or https://, got '{0}'")]
    InvalidHost(String),

    #[error("file source requires a path")]
    MissingFilePath,

    #[error("remote-query source selected but no remote configuration given")]
    MissingRemoteConfig,

    #[error("unsupported fallback source kind '{0}' (only 'file' can be a fallback)")]
    UnsupportedFallback(SourceKind),

    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("fallback source failed after primary '{primary}' was rejected: {source}")]
    FallbackFailed {
        primary: SourceKind,
        #[source]
        source: Box<SourceError>,
    },
}

/// A single temperature read failed. The monitor loop logs it and skips the tick.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse temperature '{content}' from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        content: String,
        #[source]
        source: ParseIntError,
    },

    #[error("remote query request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("remote query timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("remote query failed ({kind}): {message}")]
    QueryFailed { kind: String, message: String },

    #[error("failed to decode remote query response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no result returned from remote query")]
    NoResult,

    #[error("unexpected remote query result type '{0}'")]
    UnexpectedResultType(String),

    #[error("invalid sample value '{0}'")]
    InvalidSample(String),

    #[error("temperature source is closed")]
    Closed,
}

/// The PWM output could not be claimed, configured or driven.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("failed to request GPIO {pin} on {chip}: {reason}")]
    LineRequest {
        chip: String,
        pin: u32,
        reason: String,
    },

    #[error("failed to drive output line: {what}")]
    LineWrite { what: String },

    #[error("failed to spawn PWM timing thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("PWM frequency must be positive, got {0:.2}")]
    InvalidFrequency(f64),

    #[error("failed to export PWM channel {channel}: {source}")]
    Export {
        channel: u32,
        #[source]
        source: io::Error,
    },

    #[error("PWM channel {channel} did not appear after export ({attempts} attempts)")]
    ExportTimeout { channel: u32, attempts: u32 },

    #[error("failed to write PWM {attribute} at {}: {source}", path.display())]
    Sysfs {
        attribute: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A telemetry sink rejected a reading.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TelemetryError {
    #[error("sink '{sink}' rejected {name}: {reason}")]
    Rejected {
        sink: &'static str,
        name: &'static str,
        reason: String,
    },
}

/// Fatal failure of the monitor loop, surfaced to the caller.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("actuator failure: {0}")]
    Actuator(#[from] ActuatorError),
}
