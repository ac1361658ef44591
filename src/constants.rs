// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. Geometry is computed in double
precision and only visibilities are stored in single precision.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// The longitude of the Owens Valley Radio Observatory array centre \[radians\].
pub const OVRO_LONG_RAD: f64 = -2.064427799136453;
/// The latitude of the Owens Valley Radio Observatory array centre \[radians\].
pub const OVRO_LAT_RAD: f64 = 0.6498455107238486;
/// The height of the Owens Valley Radio Observatory array centre \[metres\].
pub const OVRO_HEIGHT_M: f64 = 1188.0519;

lazy_static::lazy_static! {
    pub static ref OVRO_LONG_DEG: f64 = OVRO_LONG_RAD.to_degrees();
    pub static ref OVRO_LAT_DEG: f64 = OVRO_LAT_RAD.to_degrees();
}

/// The number of subbands that make up a complete observation by default.
pub const DEFAULT_NUM_SUBBANDS: usize = 16;

/// The prefix of subband codes, e.g. "sb" in "sb07".
pub const SUBBAND_CODE_PREFIX: &str = "sb";

/// Files within this many seconds of a cluster's anchor belong to the same
/// group.
pub const DEFAULT_CLUSTER_TOLERANCE_S: f64 = 60.0;

/// The default number of subband worker processes per group.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// The default location of the RAM-backed staging filesystem.
pub const DEFAULT_STAGING_PATH: &str = "/dev/shm";

/// Staging is only used if the ephemeral filesystem has at least this multiple
/// of the estimated dataset size free.
pub const DEFAULT_STAGING_SAFETY_FACTOR: f64 = 2.0;

/// The number of times concatenation is attempted before giving up.
pub const DEFAULT_CONCAT_RETRIES: usize = 3;

/// The delay before the first concatenation retry \[milliseconds\]. The delay
/// doubles on each subsequent retry.
pub const DEFAULT_CONCAT_RETRY_DELAY_MS: u64 = 500;

/// Output containers smaller than this are not plausible \[bytes\].
pub const DEFAULT_MIN_OUTPUT_BYTES: u64 = 4096;

/// The minimum fraction of unflagged samples a valid output must have.
pub const DEFAULT_MIN_UNFLAGGED_FRACTION: f64 = 0.5;

/// The file extension of raw subband files.
pub const DEFAULT_SUBBAND_EXTENSION: &str = "uvfits";

/// The file extension of output containers.
pub const CONTAINER_EXTENSION: &str = "vis";

/// UVWs of the same row in different parts may differ by at most this much
/// \[metres\].
pub const UVW_MATCH_TOLERANCE_M: f64 = 1e-6;

/// Timestamps closer than this are the same integration \[seconds\].
pub const TIME_MATCH_TOLERANCE_S: f64 = 1e-3;
