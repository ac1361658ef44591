// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.


use std::path::PathBuf;

use clap::Parser;
use hifitime::Duration;
use log::{debug, info, trace};
use vec1::Vec1;

use super::common::display_warnings;
use crate::{
    io::{
        container::read_container,
        get_single_match_from_glob,
        write::{can_write_to_file, export_dataset, VisOutputType, VIS_OUTPUT_EXTENSIONS},
    },
    misc::expensive_op,
    SubbandConvertError,
};

lazy_static::lazy_static! {
    static ref OUTPUTS_HELP: String =
        format!("Paths to the output visibility files. Supported formats: {}", *VIS_OUTPUT_EXTENSIONS);
}

#[derive(Parser, Debug, Clone, Default)]
pub(super) struct ExportArgs {
    /// The container to export. A glob is allowed if it matches exactly one
    /// container.
    #[clap(name = "CONTAINER")]
    pub(super) container: String,

    #[clap(
        short = 'o',
        long,
        required = true,
        multiple_values(true),
        help = OUTPUTS_HELP.as_str(),
        parse(from_os_str)
    )]
    pub(super) outputs: Vec<PathBuf>,

    /// Use this value as the DUT1 [seconds].
    #[clap(long, allow_hyphen_values = true)]
    pub(super) dut1: Option<f64>,

    /// Write apparent-epoch UVWs rather than J2000 UVWs. Use this for
    /// containers converted with --no-precession.
    #[clap(long)]
    pub(super) no_precession: bool,
}

impl ExportArgs {
    pub(super) fn run(self, dry_run: bool) -> Result<(), SubbandConvertError> {
        trace!("{:#?}", self);
        let container = get_single_match_from_glob(&self.container)?;

        let mut outputs = Vec::with_capacity(self.outputs.len());
        for output in self.outputs {
            let output_type = VisOutputType::from_path(&output)?;
            can_write_to_file(&output)?;
            debug!("Will write {} as {output_type}", output.display());
            outputs.push((output, output_type));
        }
        let outputs = Vec1::try_from_vec(outputs).map_err(|_| {
            SubbandConvertError::VisWrite("No output visibility files were specified".to_string())
        })?;
        display_warnings();

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        info!("Reading {}", container.display());
        let dataset = expensive_op(
            || read_container(&container),
            "Still reading the container",
        )?;
        let written = export_dataset(
            &dataset,
            &outputs,
            Duration::from_seconds(self.dut1.unwrap_or(0.0)),
            !self.no_precession,
        )?;
        info!("{written}");
        Ok(())
    }
}
