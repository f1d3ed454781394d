//! selector.rs
//! Startup-time source selection with a single primary → file fallback.
//!
//! Selection runs once. A primary that later starts failing mid-run is not
//! replaced; the monitor loop skips those ticks instead.

use log::{info, warn};
use thiserror::Error;

use crate::error::{ReadError, SourceError};
use crate::sensing::{
    FileSource, ReadTemperature, RemoteQuerySource, SourceConfig, SourceKind, TemperatureSource,
};

/// Why the primary source was rejected during selection.
#[derive(Debug, Error)]
enum PrimaryRejected {
    #[error("construction failed: {0}")]
    Construct(#[from] SourceError),
    #[error("probe read failed: {0}")]
    Probe(#[from] ReadError),
}

pub struct SourceSelector;

impl SourceSelector {
    /// Builds the live temperature source.
    ///
    /// A `remote-query` primary is probed with one read right after construction;
    /// if construction or the probe fails, the file fallback is built instead.
    pub async fn build(cfg: &SourceConfig) -> Result<TemperatureSource, SourceError> {
        if cfg.fallback != SourceKind::File {
            return Err(SourceError::UnsupportedFallback(cfg.fallback));
        }

        match cfg.primary {
            SourceKind::File => Self::construct(SourceKind::File, cfg),
            SourceKind::RemoteQuery => match Self::probe_primary(cfg).await {
                Ok((source, temp)) => {
                    info!(
                        "[Source] using {} (probe read {:.2}°C)",
                        source.describe(),
                        temp
                    );
                    Ok(source)
                }
                Err(reason) => {
                    warn!(
                        "[Source] primary {} source unavailable ({}), falling back to {}",
                        cfg.primary, reason, cfg.fallback
                    );
                    let fallback = Self::construct(cfg.fallback, cfg).map_err(|e| {
                        SourceError::FallbackFailed {
                            primary: cfg.primary,
                            source: Box::new(e),
                        }
                    })?;
                    info!("[Source] using {}", fallback.describe());
                    Ok(fallback)
                }
            },
        }
    }

    /// Builds only the primary source: no probe, no fallback.
    pub fn build_primary(cfg: &SourceConfig) -> Result<TemperatureSource, SourceError> {
        Self::construct(cfg.primary, cfg)
    }

    fn construct(kind: SourceKind, cfg: &SourceConfig) -> Result<TemperatureSource, SourceError> {
        match kind {
            SourceKind::File => {
                if cfg.file.path.as_os_str().is_empty() {
                    return Err(SourceError::MissingFilePath);
                }
                Ok(TemperatureSource::File(FileSource::new(&cfg.file.path)))
            }
            SourceKind::RemoteQuery => {
                let remote = cfg.remote.as_ref().ok_or(SourceError::MissingRemoteConfig)?;
                Ok(TemperatureSource::RemoteQuery(RemoteQuerySource::new(remote)?))
            }
        }
    }

    async fn probe_primary(cfg: &SourceConfig) -> Result<(TemperatureSource, f64), PrimaryRejected> {
        let mut source = Self::construct(cfg.primary, cfg)?;
        match source.read().await {
            Ok(temp) => Ok((source, temp)),
            Err(e) => {
                source.close();
                Err(e.into())
            }
        }
    }
}
