// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with conversion configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No subband codes were specified")]
    NoSubbandCodes,

    #[error("Subband code '{0}' was specified more than once")]
    DuplicateSubbandCode(String),

    #[error("Subband code '{0}' doesn't end in a subband number")]
    BadSubbandCode(String),

    #[error("The grouping tolerance must be a finite, non-negative number of seconds; got {0}")]
    BadTolerance(f64),

    #[error("The number of workers must be at least 1")]
    NoWorkers,

    #[error("The number of concurrently-processed groups must be at least 1")]
    NoConcurrentGroups,

    #[error("The staging safety factor must be at least 1; got {0}")]
    BadSafetyFactor(f64),

    #[error("The minimum unflagged fraction must be between 0 and 1; got {0}")]
    BadUnflaggedFraction(f64),

    #[error("Allowing {max_missing} missing subbands out of {num_codes} doesn't make sense")]
    TooManyMissingSubbands { max_missing: usize, num_codes: usize },

    #[error("The number of concatenation attempts must be at least 1")]
    NoConcatAttempts,

    #[error("The subband file extension must not be empty")]
    EmptyExtension,

    #[error("The array latitude must be between -90 and 90 degrees; got {0}")]
    BadLatitude(f64),

    #[error("DUT1 must be finite; got {0}")]
    BadDut1(f64),
}
