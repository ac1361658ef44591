// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::dataset::DatasetError;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("Can't compute UVWs without any phase centres")]
    NoPhaseCentres,

    #[error("Can't rephase; the old and new UVWs have shapes {old:?} and {new:?}")]
    RephaseShape { old: Vec<usize>, new: Vec<usize> },

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}
