// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! File stuff: raw subband readers, the native output container, exporting
//! to other visibility formats and globbing.

pub mod container;
mod glob;
pub mod read;
pub mod write;

pub(crate) use self::glob::{expand_globs, get_single_match_from_glob, GlobError};
