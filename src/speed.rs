// Transfer speed estimate
//
// A single running average in megabits per second, kept in a plain-text
// file so it survives between runs. The file holds one integer; anything
// else (missing, empty, garbage, zero) reads as "no estimate yet".

use crate::error::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Unit of every speed value in this module.
pub const UNIT: &str = "Mbps";

/// Convert a byte count to megabits (decimal, as network speeds are quoted).
pub fn megabits(bytes: u64) -> f64 {
    bytes as f64 / 1_000_000.0 * 8.0
}

/// Speed of a finished transfer, rounded up to whole megabits per second.
///
/// Transfers that finish in under a second are treated as taking one
/// second, so instantaneous copies give a finite (if pessimistic) value.
pub fn measured_speed(bytes: u64, elapsed: Duration) -> u64 {
    let seconds = elapsed.as_secs_f64().max(1.0);
    (megabits(bytes) / seconds).ceil() as u64
}

/// Persisted running-average transfer speed.
#[derive(Debug)]
pub struct SpeedTracker {
    path: PathBuf,
    estimate: Option<u64>,
    outlier_factor: Option<f64>,
}

impl SpeedTracker {
    /// Load the estimate stored at `path`. Never fails.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let estimate = Self::read_estimate(&path);

        match estimate {
            Some(value) => tracing::debug!(speed = value, unit = UNIT, "Loaded speed estimate"),
            None => tracing::debug!(path = %path.display(), "No prior speed estimate"),
        }

        Self {
            path,
            estimate,
            outlier_factor: None,
        }
    }

    /// Ignore samples larger than `factor` times the current estimate.
    pub fn with_outlier_factor(mut self, factor: Option<f64>) -> Self {
        self.outlier_factor = factor;
        self
    }

    fn read_estimate(path: &Path) -> Option<u64> {
        let content = fs::read_to_string(path).ok()?;
        match content.trim().parse::<u64>() {
            Ok(0) | Err(_) => None,
            Ok(value) => Some(value),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn estimate(&self) -> Option<u64> {
        self.estimate
    }

    /// Fold a new sample into the estimate and write it to disk.
    ///
    /// Without a prior estimate the sample is taken as is; otherwise the new
    /// estimate is the mean of the two, rounded half up. Zero samples are
    /// dropped. Returns the estimate after the update.
    pub fn update(&mut self, sample: u64) -> Result<Option<u64>> {
        if sample == 0 {
            return Ok(self.estimate);
        }

        let next = match self.estimate {
            None => sample,
            Some(prior) => {
                if let Some(factor) = self.outlier_factor {
                    if sample as f64 > prior as f64 * factor {
                        tracing::warn!(
                            sample,
                            estimate = prior,
                            unit = UNIT,
                            "Fishy transfer speed, not updating estimate"
                        );
                        return Ok(self.estimate);
                    }
                }
                average(prior, sample)
            }
        };

        self.persist(next)?;
        self.estimate = Some(next);

        tracing::debug!(sample, speed = next, unit = UNIT, "Speed estimate updated");
        Ok(self.estimate)
    }

    /// Predicted duration for moving `bytes`, if there is an estimate.
    pub fn estimate_transfer_time(&self, bytes: u64) -> Option<Duration> {
        let speed = self.estimate?;
        Some(Duration::from_secs_f64(megabits(bytes) / speed as f64))
    }

    /// Forget the estimate and remove the backing file.
    pub fn reset(&mut self) -> Result<()> {
        self.estimate = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write atomically: temp file, then rename over the old record.
    fn persist(&self, value: u64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_file = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_file)?;
            writeln!(file, "{}", value)?;
            file.sync_all()?;
        }
        fs::rename(&temp_file, &self.path)?;

        Ok(())
    }
}

/// Mean of `a` and `b`, rounded half up, without overflowing.
fn average(a: u64, b: u64) -> u64 {
    a / 2 + b / 2 + (a % 2 + b % 2 + 1) / 2
}
