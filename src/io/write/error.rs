// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use super::VIS_OUTPUT_EXTENSIONS;
use crate::dataset::DatasetError;

#[derive(Error, Debug)]
pub enum VisWriteError {
    #[error(
        "An invalid output format was specified ({0}). Supported:\n{}",
        *VIS_OUTPUT_EXTENSIONS,
    )]
    InvalidOutputFormat(PathBuf),

    #[error("Irregular timestamps; first timestamp (GPS) is {first}, but timestamp {bad} is not a multiple of the time resolution ({time_res}s) from the first")]
    IrregularTimestamps { first: f64, bad: f64, time_res: f64 },

    #[error("Channel {chan} ({freq} Hz) isn't on the regular grid starting at {first} Hz with a spacing of {freq_res} Hz")]
    IrregularFrequencies {
        chan: usize,
        freq: f64,
        first: f64,
        freq_res: f64,
    },

    #[error("The visibilities have {0} phase centres, but only one can be exported")]
    MultipleFields(usize),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    FileWrite(#[from] FileWriteError),

    #[error(transparent)]
    UvfitsWrite(#[from] marlu::UvfitsWriteError),

    #[error(transparent)]
    MsWrite(#[from] marlu::io::MeasurementSetWriteError),

    #[error(transparent)]
    MarluIO(#[from] marlu::io::error::IOError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum FileWriteError {
    #[error("Cannot write to the specified file '{file}'. Do you have write permissions set?")]
    FileNotWritable { file: String },

    #[error(
        "Couldn't create directory '{0}' for output files. Do you have write permissions set?"
    )]
    NewDirectory(PathBuf),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
