// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("The {what} array has shape {got:?}, but {expected:?} was expected")]
    BadShape {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Baseline {baseline} refers to antenna {ant}, but there are only {num_ants} antennas")]
    BadAntennaIndex {
        baseline: usize,
        ant: usize,
        num_ants: usize,
    },

    #[error("Row field ID {field} doesn't refer to any of the {num_fields} phase centres")]
    BadFieldId { field: u32, num_fields: usize },

    #[error("The dataset has no timesteps")]
    NoTimesteps,

    #[error("The dataset has no channels")]
    NoChannels,
}
