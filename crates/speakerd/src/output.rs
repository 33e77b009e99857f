//! Digital output that follows playback (amplifier enable, indicator LED).
//!
//! The pin is acquired once at startup and released when the toggle is
//! dropped, which resets it and hands it back to the kernel.

use std::fs;
use std::path::{Path, PathBuf};

use speakerconf::GpioConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("GPIO write to {path} failed: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub trait OutputToggle: Send + Sync {
    /// Drive the output active.
    fn set(&self) -> Result<(), OutputError>;

    /// Drive the output inactive.
    fn reset(&self) -> Result<(), OutputError>;
}

/// Used when no pin is configured.
#[derive(Debug, Default)]
pub struct NoOutput;

impl OutputToggle for NoOutput {
    fn set(&self) -> Result<(), OutputError> {
        Ok(())
    }

    fn reset(&self) -> Result<(), OutputError> {
        Ok(())
    }
}

fn write_attr(path: &Path, value: &str) -> Result<(), OutputError> {
    fs::write(path, value).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// A GPIO line driven through the sysfs interface.
#[derive(Debug)]
pub struct SysfsPin {
    pin: u32,
    root: PathBuf,
    value: PathBuf,
}

impl SysfsPin {
    /// Export the pin (unless already exported), make it an output and
    /// drive it low.
    pub fn acquire(root: &Path, pin: u32) -> Result<Self, OutputError> {
        let pin_dir = root.join(format!("gpio{}", pin));
        if !pin_dir.exists() {
            write_attr(&root.join("export"), &pin.to_string())?;
        }
        write_attr(&pin_dir.join("direction"), "out")?;

        let value = pin_dir.join("value");
        write_attr(&value, "0")?;

        info!("allocated output pin {}", pin);
        Ok(Self {
            pin,
            root: root.to_path_buf(),
            value,
        })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }
}

impl OutputToggle for SysfsPin {
    fn set(&self) -> Result<(), OutputError> {
        write_attr(&self.value, "1")
    }

    fn reset(&self) -> Result<(), OutputError> {
        write_attr(&self.value, "0")
    }
}

impl Drop for SysfsPin {
    fn drop(&mut self) {
        info!("releasing output pin {}", self.pin);
        if let Err(e) = self.reset() {
            warn!("{}", e);
        }
        if let Err(e) = write_attr(&self.root.join("unexport"), &self.pin.to_string()) {
            warn!("{}", e);
        }
    }
}

/// Acquire the configured output, or a no-op when there is none.
pub fn open_output(config: &GpioConfig) -> Result<Box<dyn OutputToggle>, OutputError> {
    match config.pin {
        Some(pin) => Ok(Box::new(SysfsPin::acquire(&config.sysfs_root, pin)?)),
        None => {
            debug!("no output pin configured");
            Ok(Box::new(NoOutput))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_acquire_set_reset_release() {
        let root = TempDir::new().unwrap();
        let pin_dir = root.path().join("gpio17");
        fs::create_dir(&pin_dir).unwrap();

        let pin = SysfsPin::acquire(root.path(), 17).unwrap();
        assert_eq!(pin.pin(), 17);
        assert_eq!(read(&pin_dir.join("direction")), "out");
        assert_eq!(read(&pin_dir.join("value")), "0");
        // Already exported, so no export write
        assert!(!root.path().join("export").exists());

        pin.set().unwrap();
        assert_eq!(read(&pin_dir.join("value")), "1");

        drop(pin);
        assert_eq!(read(&pin_dir.join("value")), "0");
        assert_eq!(read(&root.path().join("unexport")), "17");
    }

    #[test]
    fn test_export_then_missing_pin_dir_fails() {
        let root = TempDir::new().unwrap();

        let err = SysfsPin::acquire(root.path(), 4).unwrap_err();
        assert_eq!(read(&root.path().join("export")), "4");
        match err {
            OutputError::Io { path, .. } => {
                assert_eq!(path, root.path().join("gpio4").join("direction"))
            }
        }
    }

    #[test]
    fn test_no_pin_gives_no_output() {
        let config = GpioConfig::default();
        let output = open_output(&config).unwrap();
        output.set().unwrap();
        output.reset().unwrap();
    }
}
