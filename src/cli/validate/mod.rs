// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests;

use clap::Parser;
use log::{info, trace, warn};

use super::common::InfoPrinter;
use crate::{
    config::ConversionConfig,
    io::expand_globs,
    validation::{validate_container, Expectations, ValidationReport, ValidationThresholds},
    SubbandConvertError,
};

#[derive(Parser, Debug, Clone, Default)]
pub(super) struct ValidateArgs {
    /// Paths (or globs) of the containers to check.
    #[clap(name = "CONTAINERS", required = true, multiple_values(true))]
    pub(super) containers: Vec<String>,

    /// Containers smaller than this are invalid [bytes].
    #[clap(long)]
    pub(super) min_output_bytes: Option<u64>,

    /// Containers with a smaller fraction of unflagged samples are invalid.
    #[clap(long)]
    pub(super) min_unflagged_fraction: Option<f64>,

    /// Containers may have at most this many fewer subbands than expected.
    #[clap(long)]
    pub(super) max_missing_subbands: Option<usize>,

    /// The number of subbands each container should have.
    #[clap(long)]
    pub(super) expected_subbands: Option<usize>,

    /// The number of channels each container should have.
    #[clap(long)]
    pub(super) expected_channels: Option<usize>,

    /// Print one JSON report per container on stdout, rather than logging.
    #[clap(long)]
    pub(super) json: bool,
}

impl ValidateArgs {
    pub(super) fn run(self) -> Result<(), SubbandConvertError> {
        trace!("{:#?}", self);
        let defaults = ConversionConfig::default();
        let thresholds = ValidationThresholds {
            min_output_bytes: self.min_output_bytes.unwrap_or(defaults.min_output_bytes),
            min_unflagged_fraction: self
                .min_unflagged_fraction
                .unwrap_or(defaults.min_unflagged_fraction),
            max_missing_subbands: self
                .max_missing_subbands
                .unwrap_or(defaults.max_missing_subbands),
        };
        let expected = Expectations {
            num_subbands: self.expected_subbands,
            num_channels: self.expected_channels,
            num_rows: None,
        };

        let containers = expand_globs(&self.containers)?;
        let mut num_invalid = 0;
        for container in &containers {
            let report = validate_container(container, &thresholds, &expected);
            if self.json {
                println!("{}", report.to_json());
            } else {
                print_report(&report);
            }
            if !report.valid {
                num_invalid += 1;
                let key = container
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                report.alert(&key);
            }
        }

        if num_invalid > 0 {
            return Err(SubbandConvertError::Validation(format!(
                "{num_invalid} of {} container(s) are invalid",
                containers.len()
            )));
        }
        info!("All {} container(s) are valid", containers.len());
        Ok(())
    }
}

fn print_report(report: &ValidationReport) {
    let mut printer = InfoPrinter::new(
        format!(
            "{}: {}",
            report.path.display(),
            if report.valid { "valid" } else { "INVALID" }
        )
        .into(),
    );
    let describe = |n: Option<usize>| n.map(|n| n.to_string()).unwrap_or_else(|| "?".into());
    printer.push_block(vec![
        format!(
            "{} rows, {} antennas",
            describe(report.num_rows),
            describe(report.num_antennas)
        )
        .into(),
        format!(
            "{} channels in {} subbands",
            describe(report.num_channels),
            describe(report.num_subbands)
        )
        .into(),
    ]);
    if let Some((start, end)) = report.time_range {
        printer.push_line(format!("{start} to {end}").into());
    }
    if let Some(f) = report.unflagged_fraction {
        printer.push_line(format!("{:.1}% unflagged", f * 100.0).into());
    }
    printer.display();

    for e in &report.errors {
        warn!("{}: {e}", report.path.display());
    }
    for w in &report.warnings {
        info!("{}: {w}", report.path.display());
    }
}
