// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors when reading raw subband uvfits files.

use std::path::PathBuf;

use thiserror::Error;

use crate::{antennas::AntennaError, io::read::fits::FitsError};

#[derive(Error, Debug)]
pub enum SubbandReadError {
    #[error("{0} does not contain any visibilities")]
    Empty(PathBuf),

    #[error("{file}: the TIMSYS ({timsys}) isn't UTC, IAT or TAI; this is unsupported")]
    UnknownTimsys { file: PathBuf, timsys: String },

    #[error("{file}: couldn't find a {key} PTYPE/CTYPE in the primary header")]
    MissingAxis { file: PathBuf, key: &'static str },

    #[error("{file}: none of BASELINE, or both of ANTENNA1 and ANTENNA2, are group parameters")]
    NoBaselineInfo { file: PathBuf },

    #[error("{file}: {num_ptypes} group parameters are named, but PCOUNT is {num_params}")]
    TooManyParams {
        file: PathBuf,
        num_ptypes: usize,
        num_params: usize,
    },

    #[error("{file}: expected COMPLEX, STOKES and FREQ to be axes 2, 3 and 4, but got {complex}, {stokes} and {freq}")]
    WrongDataOrder {
        file: PathBuf,
        complex: usize,
        stokes: usize,
        freq: usize,
    },

    #[error("{file}: there are {num} floats per polarisation; only 2 or 3 are allowed")]
    FloatsPerPol { file: PathBuf, num: usize },

    #[error("{file}: {num_pols} polarisations starting at STOKES {crval} are unsupported")]
    UnsupportedPols {
        file: PathBuf,
        crval: f64,
        num_pols: usize,
    },

    #[error("{file}: the antenna table has no antennas")]
    NoAntennas { file: PathBuf },

    #[error("{file}: row {row} refers to antenna number {number}, which isn't in the antenna table")]
    UnknownAntennaNumber {
        file: PathBuf,
        row: usize,
        number: usize,
    },

    #[error("{file}: antenna {name} isn't in the supplied antenna layout")]
    AntennaNotInLayout { file: PathBuf, name: String },

    #[error("{file}: the integration time can't be determined (no INTTIM and only one timestep)")]
    UnknownIntTime { file: PathBuf },

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error(transparent)]
    Antenna(#[from] AntennaError),
}
