// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with converting groups.

use std::path::PathBuf;

use thiserror::Error;

use super::GroupStage;
use crate::{
    antennas::AntennaError,
    io::read::SubbandReadError,
    phase_centre::PhaseCentreError,
    staging::StagingError,
    validation::ValidationError,
    writer::{ConcatError, WriteError},
};

/// A group that couldn't be converted. Other groups are unaffected.
#[derive(Error, Debug)]
#[error("Group {key} failed at the {stage} stage: {source}")]
pub struct GroupError {
    pub key: String,
    pub stage: GroupStage,
    #[source]
    pub source: GroupFailure,
}

#[derive(Error, Debug)]
pub enum GroupFailure {
    #[error("{0} already exists but isn't a valid container; it has been left alone")]
    ExistingInvalid(PathBuf),

    #[error("{0} already exists, and existing outputs aren't skipped")]
    ExistingOutput(PathBuf),

    #[error("The group's subband codes {got:?} don't match the {expected} configured codes")]
    UnexpectedCodes { expected: usize, got: Vec<String> },

    #[error("The container failed validation: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Read(#[from] SubbandReadError),

    #[error(transparent)]
    Antenna(#[from] AntennaError),

    #[error(transparent)]
    PhaseCentre(#[from] PhaseCentreError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Concat(#[from] ConcatError),

    #[error(transparent)]
    Staging(#[from] StagingError),
}
