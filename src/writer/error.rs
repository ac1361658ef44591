// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use crate::{geometry::GeometryError, io::container::ContainerError, io::read::SubbandReadError};

/// Errors from writing one subband's part.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("{input}: no phase centre was computed for the integration at GPS {gps}")]
    NoFieldForTime { input: PathBuf, gps: f64 },

    #[error("Couldn't determine the path of this executable: {0}")]
    CurrentExe(std::io::Error),

    #[error("Couldn't start a worker process ({exe}): {err}")]
    Spawn { exe: PathBuf, err: std::io::Error },

    #[error("Couldn't hand the {code} job to its worker: {err}")]
    SendJob { code: String, err: String },

    #[error("Couldn't decode a subband job: {0}")]
    DecodeJob(serde_json::Error),

    #[error("Lost track of the {code} worker: {err}")]
    WorkerIO { code: String, err: std::io::Error },

    #[error("The {code} worker ({input}) failed with exit status {status}:\n{stderr}")]
    WorkerFailed {
        code: String,
        input: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("The {code} worker panicked")]
    WorkerPanicked { code: String },

    #[error("The {code} job was cancelled because another subband failed")]
    Cancelled { code: String },

    #[error(transparent)]
    Read(#[from] SubbandReadError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Errors from merging parts into one container.
#[derive(Error, Debug)]
pub enum ConcatError {
    #[error("There are no parts to concatenate")]
    NoParts,

    #[error("{part} doesn't match the first part: {reason}")]
    GeometryMismatch { part: PathBuf, reason: String },

    #[error("{part} starts at {freq_hz} Hz, which isn't above the previous channel at {previous_hz} Hz")]
    NotAscending {
        part: PathBuf,
        freq_hz: f64,
        previous_hz: f64,
    },

    #[error("Concatenation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        last: Box<ConcatError>,
    },

    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl ConcatError {
    /// Could trying again succeed? Only some IO errors qualify: busy or
    /// locked files, interrupted calls, directories that aren't yet empty and
    /// cross-device moves.
    pub fn is_transient(&self) -> bool {
        match self {
            ConcatError::Container(ContainerError::IO { err, .. }) => is_transient_io(err),
            _ => false,
        }
    }
}

pub(crate) fn is_transient_io(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    const TRANSIENT_ERRNOS: [i32; 4] = [libc::EBUSY, libc::EXDEV, libc::ETXTBSY, libc::ENOTEMPTY];
    matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut
    ) || err
        .raw_os_error()
        .map(|errno| TRANSIENT_ERRNOS.contains(&errno))
        .unwrap_or(false)
}
