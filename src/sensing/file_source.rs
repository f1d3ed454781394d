//! file_source.rs
//! Reads a thermal-zone style file: one integer in millidegrees Celsius.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::ReadError;

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    closed: bool,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            closed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole file and converts millidegrees to degrees Celsius.
    pub fn read_celsius(&self) -> Result<f64, ReadError> {
        if self.closed {
            return Err(ReadError::Closed);
        }

        let data = fs::read_to_string(&self.path).map_err(|source| ReadError::Io {
            path: self.path.clone(),
            source,
        })?;

        let trimmed = data.trim();
        let milli: i64 = trimmed.parse().map_err(|source| ReadError::Parse {
            path: self.path.clone(),
            content: trimmed.to_string(),
            source,
        })?;

        Ok(milli as f64 / 1000.0)
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with(content: &str) -> (tempfile::TempDir, FileSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp");
        fs::write(&path, content).unwrap();
        (dir, FileSource::new(path))
    }

    #[test]
    fn millidegrees_are_converted() {
        let (_dir, source) = source_with("45000");
        assert_eq!(source.read_celsius().unwrap(), 45.0);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let (_dir, source) = source_with("  -1500\n");
        assert_eq!(source.read_celsius().unwrap(), -1.5);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let (_dir, source) = source_with("45.0");
        match source.read_celsius() {
            Err(ReadError::Parse { content, .. }) => assert_eq!(content, "45.0"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let source = FileSource::new("/nonexistent/thermal_zone/temp");
        assert!(matches!(source.read_celsius(), Err(ReadError::Io { .. })));
    }

    #[test]
    fn file_is_reread_on_every_call() {
        let (dir, source) = source_with("40000");
        assert_eq!(source.read_celsius().unwrap(), 40.0);
        fs::write(dir.path().join("temp"), "60500").unwrap();
        assert_eq!(source.read_celsius().unwrap(), 60.5);
    }
}
