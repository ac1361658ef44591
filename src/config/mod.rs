// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The configuration record consumed by the conversion pipeline.
//!
//! A [`ConversionConfig`] is built once (from defaults, argument files and
//! command-line overrides), validated once, and then only ever read.

mod error;

pub use error::ConfigError;

use std::{collections::HashSet, path::PathBuf};

use hifitime::Duration;
use marlu::LatLngHeight;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    constants::*,
    phase_centre::{ObservingSite, PhaseCentreMode},
};

/// How subband numbers relate to physical frequency.
#[derive(
    Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FreqOrder {
    /// Subband 0 holds the highest frequencies.
    #[strum(serialize = "descending")]
    Descending,

    /// Subband 0 holds the lowest frequencies.
    #[strum(serialize = "ascending")]
    Ascending,
}

/// The Earth position of the array reference point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrayPosition {
    pub longitude_deg: f64,
    pub latitude_deg: f64,
    pub height_m: f64,
}

impl ArrayPosition {
    pub fn ovro() -> ArrayPosition {
        ArrayPosition {
            longitude_deg: *OVRO_LONG_DEG,
            latitude_deg: *OVRO_LAT_DEG,
            height_m: OVRO_HEIGHT_M,
        }
    }

    pub fn to_lat_lng_height(self) -> LatLngHeight {
        LatLngHeight {
            longitude_rad: self.longitude_deg.to_radians(),
            latitude_rad: self.latitude_deg.to_radians(),
            height_metres: self.height_m,
        }
    }

    pub fn from_lat_lng_height(llh: LatLngHeight) -> ArrayPosition {
        ArrayPosition {
            longitude_deg: llh.longitude_rad.to_degrees(),
            latitude_deg: llh.latitude_rad.to_degrees(),
            height_m: llh.height_metres,
        }
    }
}

/// Where and when interim and final outputs may be staged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Try to stage on the ephemeral filesystem at all?
    pub enabled: bool,

    /// The root of the ephemeral filesystem (e.g. `/dev/shm`).
    pub path: PathBuf,

    /// Staging is only used if the free space is at least this multiple of
    /// the estimated dataset size.
    pub safety_factor: f64,
}

impl Default for StagingConfig {
    fn default() -> Self {
        StagingConfig {
            enabled: true,
            path: PathBuf::from(DEFAULT_STAGING_PATH),
            safety_factor: DEFAULT_STAGING_SAFETY_FACTOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// The ordered enumeration of subband codes that make a complete group.
    pub subband_codes: Vec<String>,

    /// Files within this many seconds of a cluster's anchor belong to the
    /// cluster \[seconds\].
    pub tolerance_s: f64,

    /// The extension of raw subband files (without the dot).
    pub extension: String,

    /// Discard files that don't look like FITS files?
    pub structural_checks: bool,

    /// The maximum number of concurrent subband writers per group.
    pub max_workers: usize,

    /// The maximum number of groups processed at the same time.
    pub max_concurrent_groups: usize,

    pub staging: StagingConfig,

    /// Outputs smaller than this are invalid \[bytes\].
    pub min_output_bytes: u64,

    /// Outputs with a smaller fraction of unflagged samples are invalid.
    pub min_unflagged_fraction: f64,

    /// Outputs may have at most this many fewer subbands than expected.
    pub max_missing_subbands: usize,

    /// Concatenation is attempted at most this many times.
    pub concat_retries: usize,

    /// The delay before the first concatenation retry \[milliseconds\].
    pub concat_retry_delay_ms: u64,

    pub freq_order: FreqOrder,

    pub phase_centre_mode: PhaseCentreMode,

    /// Precess to J2000 when computing sidereal times and UVWs?
    pub precess: bool,

    /// Rotate visibility phases to match recomputed UVWs?
    pub rephase: bool,

    /// UT1 - UTC \[seconds\].
    pub dut1_s: f64,

    pub array_position: ArrayPosition,

    /// A CSV file of antenna names and geodetic positions. If not given,
    /// antennas are read from the first subband file of each group.
    pub antenna_file: Option<PathBuf>,

    /// Skip groups whose output container already exists and is valid?
    pub skip_existing: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        ConversionConfig {
            subband_codes: default_subband_codes(DEFAULT_NUM_SUBBANDS),
            tolerance_s: DEFAULT_CLUSTER_TOLERANCE_S,
            extension: DEFAULT_SUBBAND_EXTENSION.to_string(),
            structural_checks: true,
            max_workers: DEFAULT_MAX_WORKERS,
            max_concurrent_groups: 1,
            staging: StagingConfig::default(),
            min_output_bytes: DEFAULT_MIN_OUTPUT_BYTES,
            min_unflagged_fraction: DEFAULT_MIN_UNFLAGGED_FRACTION,
            max_missing_subbands: 0,
            concat_retries: DEFAULT_CONCAT_RETRIES,
            concat_retry_delay_ms: DEFAULT_CONCAT_RETRY_DELAY_MS,
            freq_order: FreqOrder::Descending,
            phase_centre_mode: PhaseCentreMode::Shared,
            precess: true,
            rephase: true,
            dut1_s: 0.0,
            array_position: ArrayPosition::ovro(),
            antenna_file: None,
            skip_existing: true,
        }
    }
}

impl ConversionConfig {
    /// Check that all of the values make sense together. The config is
    /// returned unchanged if so.
    pub fn validate(self) -> Result<ConversionConfig, ConfigError> {
        if self.subband_codes.is_empty() {
            return Err(ConfigError::NoSubbandCodes);
        }
        let mut seen = HashSet::with_capacity(self.subband_codes.len());
        for code in &self.subband_codes {
            if !seen.insert(code.as_str()) {
                return Err(ConfigError::DuplicateSubbandCode(code.clone()));
            }
            if subband_number(code).is_none() {
                return Err(ConfigError::BadSubbandCode(code.clone()));
            }
        }
        if !self.tolerance_s.is_finite() || self.tolerance_s < 0.0 {
            return Err(ConfigError::BadTolerance(self.tolerance_s));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::EmptyExtension);
        }
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_concurrent_groups == 0 {
            return Err(ConfigError::NoConcurrentGroups);
        }
        if !(self.staging.safety_factor >= 1.0) {
            return Err(ConfigError::BadSafetyFactor(self.staging.safety_factor));
        }
        if !(0.0..=1.0).contains(&self.min_unflagged_fraction) {
            return Err(ConfigError::BadUnflaggedFraction(
                self.min_unflagged_fraction,
            ));
        }
        if self.max_missing_subbands >= self.subband_codes.len() {
            return Err(ConfigError::TooManyMissingSubbands {
                max_missing: self.max_missing_subbands,
                num_codes: self.subband_codes.len(),
            });
        }
        if self.concat_retries == 0 {
            return Err(ConfigError::NoConcatAttempts);
        }
        if !(-90.0..=90.0).contains(&self.array_position.latitude_deg) {
            return Err(ConfigError::BadLatitude(self.array_position.latitude_deg));
        }
        if !self.dut1_s.is_finite() {
            return Err(ConfigError::BadDut1(self.dut1_s));
        }

        Ok(self)
    }

    pub fn dut1(&self) -> Duration {
        Duration::from_seconds(self.dut1_s)
    }

    /// The array location and time settings used for all geometry.
    pub fn site(&self) -> ObservingSite {
        ObservingSite {
            array_position: self.array_position.to_lat_lng_height(),
            dut1_s: self.dut1_s,
            precess: self.precess,
        }
    }

    /// The extension of raw subband files, without any leading dot.
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// The subband codes sorted into ascending physical-frequency order.
    pub fn codes_in_freq_order(&self) -> Vec<String> {
        let mut codes = self.subband_codes.clone();
        sort_codes_by_freq(&mut codes, self.freq_order);
        codes
    }
}

/// Make the canonical subband codes, e.g. "sb00" to "sb15" for 16 subbands.
pub fn default_subband_codes(num_subbands: usize) -> Vec<String> {
    (0..num_subbands)
        .map(|i| format!("{SUBBAND_CODE_PREFIX}{i:02}"))
        .collect()
}

/// Get the subband number from the trailing digits of a subband code.
pub fn subband_number(code: &str) -> Option<u32> {
    let digits_start = code
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    code[digits_start..].parse().ok()
}

/// Sort subband codes so that their frequencies increase. Codes without a
/// subband number go last, in their existing order.
pub(crate) fn sort_codes_by_freq<S: AsRef<str>>(codes: &mut [S], freq_order: FreqOrder) {
    codes.sort_by_key(|code| {
        let n = subband_number(code.as_ref());
        match (n, freq_order) {
            (Some(n), FreqOrder::Ascending) => (0, i64::from(n)),
            (Some(n), FreqOrder::Descending) => (0, -i64::from(n)),
            (None, _) => (1, 0),
        }
    });
}
