// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The problems that make a container invalid.

use std::path::PathBuf;

use thiserror::Error;

use crate::io::container::ContainerError;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{0} doesn't exist")]
    Missing(PathBuf),

    #[error("The container is only {size} bytes; at least {min} bytes are expected")]
    TooSmall { size: u64, min: u64 },

    #[error("The container couldn't be read back: {0}")]
    Unreadable(#[from] ContainerError),

    #[error("The container has no phase centres")]
    NoFields,

    #[error("The frequencies aren't strictly ascending")]
    FreqsNotAscending,

    #[error("The container has no timestamps")]
    NoTimes,

    #[error("Only {fraction:.3} of the samples are unflagged; at least {min:.3} is expected")]
    TooFlagged { fraction: f64, min: f64 },

    #[error("{got} subbands are present, but {expected} are expected (at most {max_missing} may be missing)")]
    MissingSubbands {
        got: usize,
        expected: usize,
        max_missing: usize,
    },

    #[error("{got} {what} are present, but {expected} are expected")]
    Unexpected {
        what: &'static str,
        got: usize,
        expected: usize,
    },
}
