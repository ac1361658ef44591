// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all `subband-convert`-related errors. This should be the
//! *only* error enum that is publicly visible.

use thiserror::Error;

use crate::{
    antennas::AntennaError,
    config::ConfigError,
    discovery::DiscoveryDirError,
    io::{
        container::ContainerError,
        read::SubbandReadError,
        write::{FileWriteError, VisWriteError},
        GlobError,
    },
    simulate::SimulateError,
    writer::WriteError,
};

/// The `subband-convert` error type. The messages are written so that they
/// can be shown directly to a user.
#[derive(Error, Debug)]
pub enum SubbandConvertError {
    /// An error related to the conversion configuration.
    #[error("{0}\n\nRun with --dry-run to check a configuration without converting anything.")]
    Config(String),

    /// An error related to finding subband files.
    #[error("{0}")]
    Discovery(String),

    /// Groups that couldn't be converted. Other groups may have succeeded.
    #[error("{0}")]
    Conversion(String),

    /// Containers that failed validation.
    #[error("{0}")]
    Validation(String),

    /// An error related to reading raw subband files.
    #[error("{0}")]
    SubbandRead(String),

    /// An error related to antenna layouts.
    #[error("{0}\n\nAntenna files have one antenna per line: name, latitude [deg], longitude [deg], height [m] and optionally diameter [m].")]
    Antenna(String),

    /// An error related to visibility containers.
    #[error("{0}")]
    Container(String),

    /// An error related to exporting visibilities.
    #[error("{0}")]
    VisWrite(String),

    /// An error related to writing subband parts.
    #[error("{0}")]
    Worker(String),

    /// An error related to simulating subband files.
    #[error("{0}")]
    Simulate(String),

    /// Error when trying to write to a file.
    #[error("{0}")]
    FileWrite(String),

    /// An error related to globs.
    #[error("{0}")]
    Glob(String),

    /// An error related to argument files.
    #[error("{0}\n\nArgument files are TOML or JSON files whose keys are the long names of arguments, e.g. 'output_dir'.")]
    ArgFile(String),

    /// A cfitsio error. Because these are usually quite spartan, some
    /// suggestions are provided here.
    #[error("cfitsio error: {0}\n\nIf you don't know what this means, try turning up verbosity (-v or -vv) and maybe disabling progress bars.")]
    Cfitsio(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<ConfigError> for SubbandConvertError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<DiscoveryDirError> for SubbandConvertError {
    fn from(e: DiscoveryDirError) -> Self {
        Self::Discovery(e.to_string())
    }
}

impl From<SubbandReadError> for SubbandConvertError {
    fn from(e: SubbandReadError) -> Self {
        let s = e.to_string();
        match e {
            SubbandReadError::Fits(_) => Self::Cfitsio(s),
            SubbandReadError::Antenna(e) => Self::from(e),
            _ => Self::SubbandRead(s),
        }
    }
}

impl From<AntennaError> for SubbandConvertError {
    fn from(e: AntennaError) -> Self {
        Self::Antenna(e.to_string())
    }
}

impl From<ContainerError> for SubbandConvertError {
    fn from(e: ContainerError) -> Self {
        Self::Container(e.to_string())
    }
}

impl From<VisWriteError> for SubbandConvertError {
    fn from(e: VisWriteError) -> Self {
        let s = e.to_string();
        match e {
            VisWriteError::FileWrite(e) => Self::from(e),
            _ => Self::VisWrite(s),
        }
    }
}

impl From<FileWriteError> for SubbandConvertError {
    fn from(e: FileWriteError) -> Self {
        Self::FileWrite(e.to_string())
    }
}

impl From<WriteError> for SubbandConvertError {
    fn from(e: WriteError) -> Self {
        let s = e.to_string();
        match e {
            WriteError::Read(e) => Self::from(e),
            WriteError::Container(e) => Self::from(e),
            _ => Self::Worker(s),
        }
    }
}

impl From<SimulateError> for SubbandConvertError {
    fn from(e: SimulateError) -> Self {
        let s = e.to_string();
        match e {
            SimulateError::Antenna(e) => Self::from(e),
            SimulateError::Write(e) => Self::from(e),
            _ => Self::Simulate(s),
        }
    }
}

impl From<GlobError> for SubbandConvertError {
    fn from(e: GlobError) -> Self {
        Self::Glob(e.to_string())
    }
}

impl From<std::io::Error> for SubbandConvertError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
