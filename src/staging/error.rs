// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with staging and finalising outputs.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Couldn't create the work directory {dir}: {err}")]
    CreateWorkDir { dir: PathBuf, err: std::io::Error },

    #[error("The output {0} wasn't written")]
    NothingToFinalise(PathBuf),

    #[error("Refusing to replace the existing {0}")]
    DestinationExists(PathBuf),

    #[error("Couldn't move {from} to {to}: {err}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        err: std::io::Error,
    },

    #[error("Couldn't copy {from} to {to}: {err}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        err: std::io::Error,
    },
}
