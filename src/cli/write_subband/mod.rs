// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The child side of process-based subband writing.

use clap::Parser;
use log::debug;

use crate::{writer::run_job_from_reader, SubbandConvertError};

/// Takes no arguments; the job arrives as JSON on stdin, and the result is the
/// exit status.
#[derive(Parser, Debug, Clone, Default)]
pub(super) struct WriteSubbandArgs {}

impl WriteSubbandArgs {
    pub(super) fn run(self) -> Result<(), SubbandConvertError> {
        debug!("Reading a subband job from stdin");
        run_job_from_reader(std::io::stdin().lock())?;
        Ok(())
    }
}
