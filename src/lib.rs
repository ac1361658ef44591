// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Regroup raw interferometer subband files into complete observations and
//! convert each into a single phase-coherent visibility container.
//!
//! The pipeline is: discover complete groups of subband files, compute one
//! meridian phase centre per group, write every subband in parallel with
//! recomputed UVWs, concatenate the parts in frequency order, finalise the
//! result (possibly via a RAM-backed staging area) and validate it.
//!
//! The most convenient entry points are [`pipeline::Pipeline`] and the
//! `subband-convert` binary.

pub mod antennas;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod discovery;
pub mod geometry;
pub mod io;
pub mod phase_centre;
pub mod pipeline;
pub mod simulate;
pub mod staging;
pub mod validation;
pub mod writer;

mod cli;
mod misc;

pub use cli::{SubbandConvert, SubbandConvertError};

use crossbeam_utils::atomic::AtomicCell;

lazy_static::lazy_static! {
    /// Are progress bars being drawn? This should only ever be enabled by CLI
    /// code.
    static ref PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
}
