// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with phase centres.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhaseCentreError {
    #[error("Group {key}: the pointing declination isn't available in the subband metadata")]
    MetadataMissing { key: String },

    #[error("Group {key}: there are no integration times to compute a phase centre for")]
    NoTimestamps { key: String },
}
