// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use super::{
    common::{display_warnings, ConversionArgs, InfoPrinter, SearchArgs, ARG_FILE_HELP},
    discover::print_discovery,
};
use crate::{
    config::ConversionConfig,
    discovery::{discover, TimeWindow},
    pipeline::{BatchSummary, Pipeline},
    staging::SysinfoGauge,
    writer::{InProcessWorker, ProcessWorker, SubbandWorker},
    SubbandConvertError,
};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ConvertArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "input")]
    #[serde(default)]
    pub(super) search_args: SearchArgs,

    /// The directory to write containers into. It is created if it doesn't
    /// exist.
    #[clap(short = 'o', long, parse(from_os_str), help_heading = "OUTPUT FILES")]
    pub(super) output_dir: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "conversion")]
    #[serde(default)]
    pub(super) conversion_args: ConversionArgs,

    /// Write subbands on threads of this process instead of in worker
    /// processes.
    #[clap(long, hide = true)]
    #[serde(default)]
    pub(super) in_process: bool,
}

/// Everything a conversion run needs.
#[derive(Debug)]
pub(super) struct ConvertParams {
    pub(super) input_dir: PathBuf,
    pub(super) window: TimeWindow,
    pub(super) output_dir: PathBuf,
    pub(super) config: ConversionConfig,
    pub(super) in_process: bool,
}

impl ConvertArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    ///
    /// This function should only ever merge arguments, and not try to make
    /// sense of them.
    pub(super) fn merge(self) -> Result<ConvertArgs, SubbandConvertError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Ensure all of the file args are accounted for by pattern
            // matching.
            let ConvertArgs {
                args_file: _,
                search_args,
                output_dir,
                conversion_args,
                in_process,
            } = unpack_arg_file!(arg_file);

            Ok(ConvertArgs {
                args_file: None,
                search_args: cli_args.search_args.merge(search_args),
                output_dir: cli_args.output_dir.or(output_dir),
                conversion_args: cli_args.conversion_args.merge(conversion_args),
                in_process: cli_args.in_process || in_process,
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn parse(self) -> Result<ConvertParams, SubbandConvertError> {
        debug!("{:#?}", self);

        let Self {
            args_file: _,
            search_args,
            output_dir,
            conversion_args,
            in_process,
        } = self;

        let (input_dir, window) = search_args.parse()?;
        let output_dir = output_dir.ok_or_else(|| {
            SubbandConvertError::Config("No output directory was specified".to_string())
        })?;
        let config = conversion_args.parse()?;

        let mut printer = InfoPrinter::new("Conversion set up".into());
        printer.push_block(vec![
            format!("Input:  {}", input_dir.display()).into(),
            format!("Output: {}", output_dir.display()).into(),
        ]);
        if window.start.is_some() || window.end.is_some() {
            printer.push_line(
                format!(
                    "Window: {} to {}",
                    window.start.map(|e| e.to_string()).unwrap_or_else(|| "…".into()),
                    window.end.map(|e| e.to_string()).unwrap_or_else(|| "…".into()),
                )
                .into(),
            );
        }
        printer.push_block(vec![
            format!(
                "{} subband codes ({} to {}), tolerance {}s",
                config.subband_codes.len(),
                config.subband_codes[0],
                config.subband_codes[config.subband_codes.len() - 1],
                config.tolerance_s
            )
            .into(),
            format!(
                "Up to {} writer(s) per group, {} group(s) at a time",
                config.max_workers, config.max_concurrent_groups
            )
            .into(),
        ]);
        printer.push_line(if config.staging.enabled {
            format!(
                "Staging on {} when it has {}x the space",
                config.staging.path.display(),
                config.staging.safety_factor
            )
            .into()
        } else {
            "Staging is disabled".into()
        });
        printer.push_line(
            format!(
                "Phase centres: {}, precession: {}, rephasing: {}",
                config.phase_centre_mode, config.precess, config.rephase
            )
            .into(),
        );
        printer.display();
        display_warnings();

        Ok(ConvertParams {
            input_dir,
            window,
            output_dir,
            config,
            in_process,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), SubbandConvertError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;
        let summary = params.run(dry_run)?;
        if let Some(summary) = summary {
            if summary.failed > 0 {
                return Err(SubbandConvertError::Conversion(format!(
                    "{} of {} group(s) failed to convert",
                    summary.failed, summary.found
                )));
            }
        }
        Ok(())
    }
}

impl ConvertParams {
    /// Discover and convert. Nothing is returned for a dry run.
    pub(super) fn run(&self, dry_run: bool) -> Result<Option<BatchSummary>, SubbandConvertError> {
        let discovery = discover(&self.input_dir, self.window, &self.config)?;
        print_discovery(&discovery);

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(None);
        }

        std::fs::create_dir_all(&self.output_dir)?;
        let worker: Box<dyn SubbandWorker> = if self.in_process {
            Box::new(InProcessWorker)
        } else {
            Box::new(ProcessWorker::current_exe()?)
        };
        let gauge = SysinfoGauge;
        let pipeline = Pipeline::new(&self.config, &self.output_dir, worker.as_ref(), &gauge);
        let summary = pipeline.run(&discovery);
        summary.log();
        Ok(Some(summary))
    }
}
