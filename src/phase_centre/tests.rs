// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use hifitime::{Duration, Epoch};
use marlu::{precession::get_lmst, LatLngHeight};

use super::*;
use crate::constants::{OVRO_HEIGHT_M, OVRO_LAT_RAD, OVRO_LONG_RAD, PI};

fn site(precess: bool) -> ObservingSite {
    ObservingSite {
        array_position: LatLngHeight {
            longitude_rad: OVRO_LONG_RAD,
            latitude_rad: OVRO_LAT_RAD,
            height_metres: OVRO_HEIGHT_M,
        },
        dut1_s: 0.0,
        precess,
    }
}

fn t0() -> Epoch {
    Epoch::from_gregorian_utc_at_midnight(2024, 3, 1) + Duration::from_seconds(3600.0)
}

#[test]
fn test_meridian_without_precession_is_lmst() {
    let s = site(false);
    let dec = 0.5;
    let pc = meridian_direction(dec, t0(), &s);
    let lmst = get_lmst(OVRO_LONG_RAD, t0(), Duration::from_seconds(0.0));
    assert_abs_diff_eq!(pc.ra, lmst.rem_euclid(TAU), epsilon = 1e-12);
    assert_abs_diff_eq!(pc.dec, dec);
    // Hour angle zero.
    let ha = pc.to_hadec(lmst).ha;
    assert_abs_diff_eq!(ha.sin(), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(ha.cos(), 1.0, epsilon = 1e-9);
}

#[test]
fn test_meridian_is_pure() {
    let s = site(true);
    let a = meridian_direction(0.3, t0(), &s);
    let b = meridian_direction(0.3, t0(), &s);
    assert_eq!(a.ra, b.ra);
    assert_eq!(a.dec, b.dec);
}

#[test]
fn test_meridian_precessed_is_close_to_apparent() {
    // Precession since J2000 is well under a degree.
    let apparent = meridian_direction(0.7, t0(), &site(false));
    let j2000 = meridian_direction(0.7, t0(), &site(true));
    assert_abs_diff_eq!(j2000.dec, apparent.dec, epsilon = 1.0_f64.to_radians());
    let mut dra = (j2000.ra - apparent.ra).abs();
    if dra > PI {
        dra = TAU - dra;
    }
    assert!(dra < 1.0_f64.to_radians(), "RA difference {dra}");
    assert!(dra > 0.0);
    assert!((0.0..TAU).contains(&j2000.ra));
}

#[test]
fn test_meridian_drifts_with_time() {
    let s = site(true);
    let a = meridian_direction(0.2, t0(), &s);
    let b = meridian_direction(0.2, t0() + Duration::from_seconds(3600.0), &s);
    // One hour of sidereal rotation is slightly more than 15 degrees.
    let d = (b.ra - a.ra).rem_euclid(TAU).to_degrees();
    assert_abs_diff_eq!(d, 15.041, epsilon = 0.01);
    // Precession isn't a rotation about the pole, so the J2000 declination of
    // the meridian moves a little with the hour angle.
    assert_abs_diff_eq!(a.dec, b.dec, epsilon = 2e-3);

    let s = site(false);
    let a = meridian_direction(0.2, t0(), &s);
    let b = meridian_direction(0.2, t0() + Duration::from_seconds(3600.0), &s);
    assert_abs_diff_eq!(a.dec, b.dec);
    let d = (b.ra - a.ra).rem_euclid(TAU).to_degrees();
    assert_abs_diff_eq!(d, 15.041, epsilon = 0.01);
}

#[test]
fn test_shared_phase_centre() {
    let s = site(true);
    let start = t0();
    let times: Vec<Epoch> = (0..4)
        .map(|i| start + Duration::from_seconds(10.0 * i as f64))
        .collect();
    let subband_times = vec![times.clone(), times];
    let pcs = compute_phase_centres(
        "2024-03-01T01:00:00",
        Some(0.4),
        &subband_times,
        PhaseCentreMode::Shared,
        &s,
    )
    .unwrap();
    let fields = pcs.fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name, "meridian_2024-03-01T01:00:00");
    assert_eq!(fields[0].epoch, "J2000");
    assert_abs_diff_eq!(
        fields[0].time_gps_s,
        start.to_gpst_seconds() + 15.0,
        epsilon = 1e-6
    );
    let expected = meridian_direction(0.4, start + Duration::from_seconds(15.0), &s);
    assert_abs_diff_eq!(fields[0].radec.ra, expected.ra, epsilon = 1e-9);
    assert_eq!(pcs.field_for_time(start.to_gpst_seconds() + 1234.0), Some(0));
}

#[test]
fn test_per_integration_phase_centres() {
    let s = site(false);
    let start = t0();
    let times: Vec<Epoch> = (0..3)
        .map(|i| start + Duration::from_seconds(10.0 * i as f64))
        .collect();
    // The second subband's times are off by less than the match tolerance.
    let jittered: Vec<Epoch> = times
        .iter()
        .map(|&t| t + Duration::from_seconds(1e-4))
        .collect();
    let pcs = compute_phase_centres(
        "k",
        Some(0.4),
        &[times.clone(), jittered],
        PhaseCentreMode::PerIntegration,
        &s,
    )
    .unwrap();
    let fields = pcs.fields();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[2].name, "meridian_k_2");
    assert_eq!(fields[0].epoch, "apparent");
    assert!(fields[1].radec.ra > fields[0].radec.ra);
    assert_eq!(pcs.field_for_time(times[1].to_gpst_seconds()), Some(1));
    assert_eq!(pcs.field_for_time(times[1].to_gpst_seconds() + 5.0), None);
}

#[test]
fn test_missing_metadata_is_an_error() {
    let result = compute_phase_centres(
        "k",
        None,
        &[vec![t0()]],
        PhaseCentreMode::Shared,
        &site(true),
    );
    assert!(matches!(
        result,
        Err(PhaseCentreError::MetadataMissing { key }) if key == "k"
    ));

    let result = compute_phase_centres("k", Some(0.1), &[], PhaseCentreMode::Shared, &site(true));
    assert!(matches!(result, Err(PhaseCentreError::NoTimestamps { .. })));
}

#[test]
fn test_mode_strings() {
    use std::str::FromStr;
    assert_eq!(PhaseCentreMode::PerIntegration.to_string(), "per-integration");
    assert_eq!(
        PhaseCentreMode::from_str("shared").unwrap(),
        PhaseCentreMode::Shared
    );
    let json = serde_json::to_string(&PhaseCentreMode::PerIntegration).unwrap();
    assert_eq!(json, "\"per-integration\"");
}
