// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use crate::{
    antennas::AntennaError, geometry::GeometryError, io::write::VisWriteError,
};

#[derive(Error, Debug)]
pub enum SimulateError {
    #[error("Can't simulate {0}; at least one is required")]
    NothingToSimulate(&'static str),

    #[error("The channel width must be positive, but got {0} Hz")]
    BadChannelWidth(f64),

    #[error("The integration time must be positive, but got {0} s")]
    BadIntTime(f64),

    #[error("Couldn't create the output directory {dir}: {err}")]
    OutputDir { dir: PathBuf, err: std::io::Error },

    #[error(transparent)]
    Antenna(#[from] AntennaError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Write(#[from] VisWriteError),
}
