// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Meridian phase centres.
//!
//! A transit array points at a fixed declination; the direction it looks at
//! is the one on the local meridian (hour angle zero). All subbands of a
//! group must be phased to the same direction, so the direction is computed
//! once per group (or once per integration for drift-scan outputs) and then
//! shared.

mod error;
#[cfg(test)]
mod tests;

pub use error::PhaseCentreError;

use hifitime::{Duration, Epoch};
use log::debug;
use marlu::{
    precession::{get_lmst, precess_time},
    LatLngHeight, RADec, XyzGeodetic,
};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    constants::{TAU, TIME_MATCH_TOLERANCE_S},
    misc::mean_epoch,
};

/// How many phase centres a group gets.
#[derive(
    Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseCentreMode {
    /// One direction at the group's mean time, shared by every subband.
    #[strum(serialize = "shared")]
    Shared,

    /// One direction per integration; the output has many fields.
    #[strum(serialize = "per-integration")]
    PerIntegration,
}

/// Where the array is and how sidereal times are computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObservingSite {
    #[serde(with = "crate::antennas::lat_lng_height_serde")]
    pub array_position: LatLngHeight,

    /// UT1 - UTC \[seconds\].
    pub dut1_s: f64,

    /// Precess to J2000?
    pub precess: bool,
}

impl ObservingSite {
    pub fn dut1(&self) -> Duration {
        Duration::from_seconds(self.dut1_s)
    }
}

/// A named celestial direction that visibilities are phased to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseCentre {
    pub name: String,

    /// \[radians\]
    pub radec: RADec,

    /// e.g. "J2000".
    pub epoch: String,

    /// e.g. "icrs".
    pub frame: String,

    /// The time this direction was on the meridian \[GPS seconds\].
    pub time_gps_s: f64,
}

/// The phase centres of one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PhaseCentres {
    Shared(PhaseCentre),
    PerIntegration(Vec<PhaseCentre>),
}

impl PhaseCentres {
    /// All phase centres; the index of one is its field ID.
    pub fn fields(&self) -> &[PhaseCentre] {
        match self {
            PhaseCentres::Shared(pc) => std::slice::from_ref(pc),
            PhaseCentres::PerIntegration(pcs) => pcs,
        }
    }

    /// The field ID for an integration at `gps_time`.
    pub fn field_for_time(&self, gps_time: f64) -> Option<usize> {
        match self {
            PhaseCentres::Shared(_) => Some(0),
            PhaseCentres::PerIntegration(pcs) => pcs
                .iter()
                .position(|pc| (pc.time_gps_s - gps_time).abs() <= TIME_MATCH_TOLERANCE_S),
        }
    }
}

/// The J2000 (or, without precession, apparent) direction on the local
/// meridian at declination `dec_rad` at time `t`. This is a pure function of
/// its arguments.
pub fn meridian_direction(dec_rad: f64, t: Epoch, site: &ObservingSite) -> RADec {
    let pos = site.array_position;
    let lmst = get_lmst(pos.longitude_rad, t, site.dut1());
    if !site.precess {
        return RADec {
            ra: lmst.rem_euclid(TAU),
            dec: dec_rad,
        };
    }

    // Precess the unit vector of hour angle zero from the current epoch to
    // J2000 and read off its J2000 hour angle and declination.
    let info = precess_time(
        pos.longitude_rad,
        pos.latitude_rad,
        RADec {
            ra: lmst,
            dec: dec_rad,
        },
        t,
        site.dut1(),
    );
    let (s_dec, c_dec) = dec_rad.sin_cos();
    let direction = XyzGeodetic {
        x: c_dec,
        y: 0.0,
        z: s_dec,
    };
    let p = info.precess_xyz(&[direction])[0];
    let norm = (p.x * p.x + p.y * p.y + p.z * p.z).sqrt();
    let dec_j2000 = (p.z / norm).clamp(-1.0, 1.0).asin();
    let ha_j2000 = (-p.y).atan2(p.x);
    RADec {
        ra: (info.lmst_j2000 - ha_j2000).rem_euclid(TAU),
        dec: dec_j2000,
    }
}

/// Compute the phase centres of a group.
///
/// `subband_times` has the unique integration centroids of each subband.
/// In shared mode, the direction is computed at the mean of the subbands' mid
/// times. In per-integration mode, there's one direction per unique time.
pub fn compute_phase_centres(
    key: &str,
    pointing_dec_rad: Option<f64>,
    subband_times: &[Vec<Epoch>],
    mode: PhaseCentreMode,
    site: &ObservingSite,
) -> Result<PhaseCentres, PhaseCentreError> {
    let dec = pointing_dec_rad.ok_or_else(|| PhaseCentreError::MetadataMissing {
        key: key.to_string(),
    })?;
    let no_timestamps = || PhaseCentreError::NoTimestamps {
        key: key.to_string(),
    };

    let make = |name: String, t: Epoch| PhaseCentre {
        name,
        radec: meridian_direction(dec, t, site),
        epoch: if site.precess { "J2000" } else { "apparent" }.to_string(),
        frame: "icrs".to_string(),
        time_gps_s: t.to_gpst_seconds(),
    };

    match mode {
        PhaseCentreMode::Shared => {
            let mid_times = subband_times
                .iter()
                .filter_map(|times| mean_epoch(times.iter().copied()));
            let mean_time = mean_epoch(mid_times).ok_or_else(no_timestamps)?;
            let pc = make(format!("meridian_{key}"), mean_time);
            debug!(
                "Group {key}: shared phase centre RA {:.6}°, Dec {:.6}° at GPS {:.3}",
                pc.radec.ra.to_degrees(),
                pc.radec.dec.to_degrees(),
                pc.time_gps_s
            );
            Ok(PhaseCentres::Shared(pc))
        }

        PhaseCentreMode::PerIntegration => {
            let mut times: Vec<Epoch> = subband_times.iter().flatten().copied().collect();
            times.sort();
            times.dedup_by(|a, b| (*a - *b).abs().to_seconds() <= TIME_MATCH_TOLERANCE_S);
            if times.is_empty() {
                return Err(no_timestamps());
            }
            debug!(
                "Group {key}: {} per-integration phase centres",
                times.len()
            );
            Ok(PhaseCentres::PerIntegration(
                times
                    .into_iter()
                    .enumerate()
                    .map(|(i, t)| make(format!("meridian_{key}_{i}"), t))
                    .collect(),
            ))
        }
    }
}
