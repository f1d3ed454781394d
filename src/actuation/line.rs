//! line.rs
//! Digital output lines for the software PWM.
//!
//! The timing loop only needs "drive active / inactive"; claiming goes through a
//! `LineProvider` so the GPIO character device can be swapped out in tests.

use std::path::PathBuf;

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};

use crate::error::ActuatorError;

/// An exclusively owned output line. Dropping it releases the line.
pub trait OutputLine: Send {
    fn set_active(&mut self, active: bool) -> Result<(), ActuatorError>;
}

/// Hands out exclusive ownership of a single output line.
pub trait LineProvider: Send + Sync {
    /// Claims `pin` on `chip` as an output, initially inactive.
    fn claim(&self, chip: &str, pin: u32, consumer: &str) -> Result<Box<dyn OutputLine>, ActuatorError>;
}

/// Resolves `gpiochip0` to `/dev/gpiochip0`; absolute paths pass through.
pub fn chip_path(chip: &str) -> PathBuf {
    if chip.starts_with('/') {
        PathBuf::from(chip)
    } else {
        PathBuf::from("/dev").join(chip)
    }
}

/// Linux GPIO character device (`/dev/gpiochipN`).
#[derive(Debug, Default, Clone, Copy)]
pub struct CdevLineProvider;

struct CdevLine {
    handle: LineHandle,
}

impl OutputLine for CdevLine {
    fn set_active(&mut self, active: bool) -> Result<(), ActuatorError> {
        self.handle
            .set_value(u8::from(active))
            .map_err(|e| ActuatorError::LineWrite { what: e.to_string() })
    }
}

impl LineProvider for CdevLineProvider {
    fn claim(&self, chip: &str, pin: u32, consumer: &str) -> Result<Box<dyn OutputLine>, ActuatorError> {
        let mut gpio_chip =
            Chip::new(chip_path(chip)).map_err(|e| request_error(chip, pin, e))?;
        let handle = gpio_chip
            .get_line(pin)
            .map_err(|e| request_error(chip, pin, e))?
            .request(LineRequestFlags::OUTPUT, 0, consumer)
            .map_err(|e| request_error(chip, pin, e))?;

        Ok(Box::new(CdevLine { handle }))
    }
}

fn request_error(chip: &str, pin: u32, e: impl std::fmt::Display) -> ActuatorError {
    ActuatorError::LineRequest {
        chip: chip.to_string(),
        pin,
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chip_names_resolve_under_dev() {
        assert_eq!(chip_path("gpiochip0"), PathBuf::from("/dev/gpiochip0"));
        assert_eq!(chip_path("/dev/gpiochip4"), PathBuf::from("/dev/gpiochip4"));
    }

    #[test]
    fn missing_chip_is_a_request_error() {
        let err = CdevLineProvider
            .claim("/nonexistent/gpiochip9", 13, "fanctl-test")
            .err()
            .expect("claim must fail");
        match err {
            ActuatorError::LineRequest { chip, pin, .. } => {
                assert_eq!(chip, "/nonexistent/gpiochip9");
                assert_eq!(pin, 13);
            }
            other => panic!("expected line request error, got {:?}", other),
        }
    }
}
