//! Temperature sources: where the control loop gets its measurement from.
//!
//! Two variants share one capability (`ReadTemperature`):
//! - **FileSource:** a small text file holding millidegrees Celsius (thermal zone).
//! - **RemoteQuerySource:** an instant time-series query against a remote endpoint.
//!
//! `SourceSelector` picks one of them at startup, falling back from the primary to the file source.

pub mod file_source;
pub mod remote_source;
pub mod selector;

use std::{fmt, future::Future, path::PathBuf};

use serde::Deserialize;

use crate::error::ReadError;

pub use file_source::FileSource;
pub use remote_source::{BasicAuth, RemoteQueryConfig, RemoteQuerySource};
pub use selector::SourceSelector;

/// Default thermal zone exposed by the kernel.
pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    File,
    #[serde(alias = "prometheus")]
    RemoteQuery,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::RemoteQuery => "remote-query",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileSourceConfig {
    pub path: PathBuf,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_THERMAL_ZONE),
        }
    }
}

/// Primary and fallback source description. Read once at startup, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub primary: SourceKind,
    pub fallback: SourceKind,
    pub file: FileSourceConfig,
    #[serde(alias = "prometheus")]
    pub remote: Option<RemoteQueryConfig>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            primary: SourceKind::File,
            fallback: SourceKind::File,
            file: FileSourceConfig::default(),
            remote: None,
        }
    }
}

/// Capability shared by every temperature source.
pub trait ReadTemperature {
    /// Latest temperature in degrees Celsius.
    fn read(&self) -> impl Future<Output = Result<f64, ReadError>> + Send;

    /// Releases held resources. Idempotent, never fails.
    fn close(&mut self);
}

/// The live temperature source, chosen once by [`SourceSelector`].
#[derive(Debug)]
pub enum TemperatureSource {
    File(FileSource),
    RemoteQuery(RemoteQuerySource),
}

impl TemperatureSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            TemperatureSource::File(_) => SourceKind::File,
            TemperatureSource::RemoteQuery(_) => SourceKind::RemoteQuery,
        }
    }

    /// Human-readable origin, used in startup logs.
    pub fn describe(&self) -> String {
        match self {
            TemperatureSource::File(s) => format!("file {}", s.path().display()),
            TemperatureSource::RemoteQuery(s) => {
                format!("remote-query {} [{}]", s.endpoint(), s.query_expr())
            }
        }
    }
}

impl ReadTemperature for TemperatureSource {
    async fn read(&self) -> Result<f64, ReadError> {
        match self {
            TemperatureSource::File(s) => s.read_celsius(),
            TemperatureSource::RemoteQuery(s) => s.query().await,
        }
    }

    fn close(&mut self) {
        match self {
            TemperatureSource::File(s) => s.close(),
            TemperatureSource::RemoteQuery(s) => s.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_accepts_legacy_prometheus_name() {
        let kind: SourceKind = serde_yaml::from_str("prometheus").unwrap();
        assert_eq!(kind, SourceKind::RemoteQuery);

        let kind: SourceKind = serde_yaml::from_str("remote-query").unwrap();
        assert_eq!(kind, SourceKind::RemoteQuery);
        assert_eq!(kind.to_string(), "remote-query");
    }

    #[test]
    fn source_config_defaults_to_thermal_zone() {
        let cfg: SourceConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.primary, SourceKind::File);
        assert_eq!(cfg.fallback, SourceKind::File);
        assert_eq!(cfg.file.path, PathBuf::from(DEFAULT_THERMAL_ZONE));
        assert!(cfg.remote.is_none());
    }

    #[tokio::test]
    async fn enum_dispatches_to_file_variant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp");
        std::fs::write(&path, "51250\n").unwrap();

        let mut source = TemperatureSource::File(FileSource::new(&path));
        assert_eq!(source.kind(), SourceKind::File);
        assert_eq!(source.read().await.unwrap(), 51.25);

        source.close();
        source.close();
        assert!(matches!(source.read().await, Err(ReadError::Closed)));
    }
}
