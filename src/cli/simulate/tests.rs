// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use clap::Parser;
use indoc::formatdoc;
use serial_test::serial;
use tempfile::TempDir;

use super::SimulateArgs;
use crate::{config::FreqOrder, SubbandConvertError};

#[test]
fn test_parse_overrides() {
    #[rustfmt::skip]
    let args = vec![
        "simulate",
        "-o", "/tmp/raw",
        "--start-time", "2024-03-01T12:00:00",
        "--num-groups", "3",
        "--num-subbands", "4",
        "--freq-order", "ascending",
        "--num-antennas", "5",
        "--pointing-dec", "-30",
    ];
    let params = SimulateArgs::parse_from(args).parse().unwrap();
    assert_eq!(params.num_groups, 3);
    assert_eq!(params.subband_codes.len(), 4);
    assert_eq!(params.freq_order, FreqOrder::Ascending);
    assert_eq!(params.antennas.len(), 5);
    assert_abs_diff_eq!(params.pointing_dec_rad, (-30.0_f64).to_radians());
    let (y, mo, d, h, ..) = params.start_time.to_gregorian_utc();
    assert_eq!((y, mo, d, h), (2024, 3, 1, 12));
}

#[test]
fn test_parse_errors() {
    let result = SimulateArgs::parse_from(["simulate"]).parse();
    assert!(matches!(result, Err(SubbandConvertError::Simulate(_))));

    let result = SimulateArgs::parse_from(["simulate", "-o", "x", "--start-time", "noon"]).parse();
    assert!(matches!(result, Err(SubbandConvertError::Simulate(_))));
}

#[test]
#[serial]
fn test_simulate_from_args_file() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("raw");
    let args_file = tmp.path().join("sim.toml");
    std::fs::write(
        &args_file,
        formatdoc! {r#"
            output_dir = "{}"
            num_groups = 2
            num_subbands = 2
            chans_per_subband = 2
            num_timesteps = 1
            num_antennas = 3
        "#, out.display()},
    )
    .unwrap();

    let args_file = args_file.display().to_string();
    let args = SimulateArgs::parse_from(["simulate", &args_file]).merge().unwrap();
    args.clone().run(true).unwrap();
    assert!(!out.exists());

    args.run(false).unwrap();
    let num_files = std::fs::read_dir(&out).unwrap().count();
    assert_eq!(num_files, 4);
}
