// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reading FITS files.

use std::{panic::Location, path::PathBuf};

use thiserror::Error;

/// Every variant records where in this crate the failing call was made.
#[derive(Error, Debug)]
pub enum FitsError {
    #[error("{at}: Couldn't open {file}: {err}")]
    Open {
        file: PathBuf,
        err: Box<fitsio::errors::Error>,
        at: &'static Location<'static>,
    },

    #[error("{at}: {file} HDU {hdu}: Couldn't find key {key}")]
    MissingKey {
        file: PathBuf,
        hdu: String,
        key: String,
        at: &'static Location<'static>,
    },

    #[error("{at}: {file} HDU {hdu}: Couldn't parse {key} (value '{value}')")]
    Parse {
        file: PathBuf,
        hdu: String,
        key: String,
        value: String,
        at: &'static Location<'static>,
    },

    #[error("{at}: {file} HDU {hdu}: Couldn't read {what}: {err}")]
    Fitsio {
        file: PathBuf,
        hdu: String,
        what: String,
        err: Box<fitsio::errors::Error>,
        at: &'static Location<'static>,
    },
}
