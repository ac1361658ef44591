// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Checking finished containers.
//!
//! Validation only ever reads a container. An invalid container is left
//! where it is for inspection.

mod error;

pub use error::ValidationError;

use std::path::{Path, PathBuf};

use hifitime::Epoch;
use log::{debug, error};
use serde_json::json;

use crate::{
    config::ConversionConfig,
    io::container::{read_container, read_container_header},
    misc::disk_usage,
};

/// The limits a container is held to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationThresholds {
    /// \[bytes\]
    pub min_output_bytes: u64,
    pub min_unflagged_fraction: f64,
    pub max_missing_subbands: usize,
}

impl From<&ConversionConfig> for ValidationThresholds {
    fn from(config: &ConversionConfig) -> Self {
        ValidationThresholds {
            min_output_bytes: config.min_output_bytes,
            min_unflagged_fraction: config.min_unflagged_fraction,
            max_missing_subbands: config.max_missing_subbands,
        }
    }
}

/// What discovery says a container should hold. Anything `None` isn't
/// checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expectations {
    pub num_subbands: Option<usize>,
    pub num_channels: Option<usize>,
    pub num_rows: Option<usize>,
}

#[derive(Debug)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub num_rows: Option<usize>,
    pub num_antennas: Option<usize>,
    pub num_channels: Option<usize>,
    pub num_subbands: Option<usize>,
    pub time_range: Option<(Epoch, Epoch)>,
    pub unflagged_fraction: Option<f64>,
}

impl ValidationReport {
    fn new(path: &Path) -> ValidationReport {
        ValidationReport {
            path: path.to_path_buf(),
            valid: false,
            errors: vec![],
            warnings: vec![],
            num_rows: None,
            num_antennas: None,
            num_channels: None,
            num_subbands: None,
            time_range: None,
            unflagged_fraction: None,
        }
    }

    fn fail(mut self, e: ValidationError) -> ValidationReport {
        self.errors.push(e);
        self.valid = false;
        self
    }

    /// The report as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "path": self.path.display().to_string(),
            "valid": self.valid,
            "errors": self.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            "warnings": self.warnings,
            "num_rows": self.num_rows,
            "num_antennas": self.num_antennas,
            "num_channels": self.num_channels,
            "num_subbands": self.num_subbands,
            "time_range_gps": self
                .time_range
                .map(|(start, end)| [start.to_gpst_seconds(), end.to_gpst_seconds()]),
            "unflagged_fraction": self.unflagged_fraction,
        })
    }

    /// Log a structured alert for an invalid container.
    pub fn alert(&self, key: &str) {
        if !self.valid {
            let mut alert = self.to_json();
            alert["alert"] = json!("container_validation_failed");
            alert["group"] = json!(key);
            error!("{alert}");
        }
    }
}

/// Check the container at `path` against the thresholds and, optionally,
/// what discovery expected of it.
pub fn validate_container(
    path: &Path,
    thresholds: &ValidationThresholds,
    expected: &Expectations,
) -> ValidationReport {
    debug!("Validating {}", path.display());
    let mut report = ValidationReport::new(path);
    if !path.exists() {
        return report.fail(ValidationError::Missing(path.to_path_buf()));
    }
    let size = disk_usage(path);
    if size < thresholds.min_output_bytes {
        return report.fail(ValidationError::TooSmall {
            size,
            min: thresholds.min_output_bytes,
        });
    }

    // The header alone describes a lot; get it first so that the report has
    // something even if the rows are bad.
    let header = match read_container_header(path) {
        Ok(h) => h,
        Err(e) => return report.fail(e.into()),
    };
    report.num_rows = Some(header.main.num_rows);
    report.num_antennas = Some(header.antennas.len());
    report.num_channels = Some(header.main.num_channels);
    report.num_subbands = Some(header.spectral_window.num_subbands);

    let dataset = match read_container(path) {
        Ok(d) => d,
        Err(e) => return report.fail(e.into()),
    };
    report.time_range = dataset.time_range();
    let unflagged_fraction = dataset.unflagged_fraction();
    report.unflagged_fraction = Some(unflagged_fraction);

    let mut errors = vec![];
    if dataset.phase_centres.is_empty() {
        errors.push(ValidationError::NoFields);
    }
    if !dataset.freqs_ascending() {
        errors.push(ValidationError::FreqsNotAscending);
    }
    if report.time_range.is_none() {
        errors.push(ValidationError::NoTimes);
    }
    if unflagged_fraction < thresholds.min_unflagged_fraction {
        errors.push(ValidationError::TooFlagged {
            fraction: unflagged_fraction,
            min: thresholds.min_unflagged_fraction,
        });
    }

    if let Some(expected_subbands) = expected.num_subbands {
        let got = dataset.num_subbands;
        if got + thresholds.max_missing_subbands < expected_subbands {
            errors.push(ValidationError::MissingSubbands {
                got,
                expected: expected_subbands,
                max_missing: thresholds.max_missing_subbands,
            });
        } else if got < expected_subbands {
            report.warnings.push(format!(
                "{} of {expected_subbands} subbands are missing",
                expected_subbands - got
            ));
        }
    }
    for (what, got, expected) in [
        ("channels", dataset.num_channels(), expected.num_channels),
        ("rows", dataset.num_rows(), expected.num_rows),
    ] {
        if let Some(expected) = expected {
            if got != expected {
                errors.push(ValidationError::Unexpected {
                    what,
                    got,
                    expected,
                });
            }
        }
    }

    if dataset.uvws.is_none() {
        report.warnings.push("The container has no UVWs".to_string());
    }
    if unflagged_fraction < 1.0 && unflagged_fraction >= thresholds.min_unflagged_fraction {
        report.warnings.push(format!(
            "{:.1}% of samples are flagged",
            (1.0 - unflagged_fraction) * 100.0
        ));
    }

    report.valid = errors.is_empty();
    report.errors = errors;
    report
}
