// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use crate::dataset::DatasetError;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Refusing to overwrite the existing container {0}")]
    Exists(PathBuf),

    #[error("{0} is not a container directory")]
    NotAContainer(PathBuf),

    #[error("Container {dir} is missing its {table} table")]
    MissingTable { dir: PathBuf, table: &'static str },

    #[error("Couldn't decode {file}: {err}")]
    Json {
        file: PathBuf,
        err: serde_json::Error,
    },

    #[error("{file} has format version {version}, but only version {supported} is supported")]
    Version {
        file: PathBuf,
        version: u32,
        supported: u32,
    },

    #[error("{file} is {got} bytes, but {expected} bytes are expected for the described rows")]
    BadMainSize {
        file: PathBuf,
        expected: u64,
        got: u64,
    },

    #[error("{file} row {row}: {reason}")]
    BadRow {
        file: PathBuf,
        row: usize,
        reason: String,
    },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("IO error on {file}: {err}")]
    IO { file: PathBuf, err: std::io::Error },
}
