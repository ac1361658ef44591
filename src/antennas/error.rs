// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with antenna layouts.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AntennaError {
    #[error("The antenna layout has no antennas")]
    Empty,

    #[error("There are {names} antenna names but {positions} antenna positions")]
    LengthMismatch { names: usize, positions: usize },

    #[error("There are {antennas} antennas but {diameters} dish diameters")]
    DiameterMismatch { antennas: usize, diameters: usize },

    #[error("Antenna name '{0}' appears more than once")]
    DuplicateName(String),

    #[error("{file}:{line}: expected 'name,latitude,longitude,height[,diameter]', got '{content}'")]
    BadLine {
        file: PathBuf,
        line: usize,
        content: String,
    },

    #[error("{file}:{line}: couldn't parse '{value}' as a number")]
    BadNumber {
        file: PathBuf,
        line: usize,
        value: String,
    },

    #[error("{file}: every antenna must have a diameter, or none of them")]
    PartialDiameters { file: PathBuf },

    #[error("Couldn't read antenna file {file}: {err}")]
    IO { file: PathBuf, err: std::io::Error },
}
