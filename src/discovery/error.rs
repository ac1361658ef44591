// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with discovering subband files.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons a file was skipped during discovery. None of these are fatal.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("{0}: file name isn't of the form '<timestamp>_<subband code>.<ext>'")]
    BadFileName(PathBuf),

    #[error("{path}: couldn't parse timestamp '{timestamp}'")]
    BadTimestamp { path: PathBuf, timestamp: String },

    #[error("{path}: subband code '{code}' isn't one of the expected codes")]
    UnknownCode { path: PathBuf, code: String },

    #[error("{0}: not a FITS file")]
    NotFits(PathBuf),

    #[error("{path}: couldn't be inspected: {err}")]
    IO { path: PathBuf, err: std::io::Error },
}

/// Errors that stop discovery from happening at all.
#[derive(Error, Debug)]
pub enum DiscoveryDirError {
    #[error("Input directory {0} doesn't exist or isn't a directory")]
    NotADirectory(PathBuf),

    #[error("Couldn't make a glob pattern for {dir}: {err}")]
    Pattern {
        dir: PathBuf,
        err: glob::PatternError,
    },

    #[error("Couldn't parse time '{0}'; expected YYYY-MM-DDTHH:MM:SS[.fff]")]
    BadWindowTime(String),
}
