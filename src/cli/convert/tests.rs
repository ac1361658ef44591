// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::Path;

use clap::Parser;
use indoc::indoc;
use marlu::LatLngHeight;
use serial_test::serial;
use tempfile::TempDir;

use super::ConvertArgs;
use crate::{
    config::default_subband_codes,
    constants::{OVRO_HEIGHT_M, OVRO_LAT_RAD, OVRO_LONG_RAD},
    io::container::container_path,
    simulate::{simulate, simulated_layout, SimulatedGroup, SimulationParams},
    SubbandConvertError,
};

fn simulate_groups(dir: &Path) -> Vec<SimulatedGroup> {
    let array_position = LatLngHeight {
        longitude_rad: OVRO_LONG_RAD,
        latitude_rad: OVRO_LAT_RAD,
        height_metres: OVRO_HEIGHT_M,
    };
    let mut params =
        SimulationParams::new(dir.to_path_buf(), simulated_layout(4, array_position).unwrap());
    params.num_groups = 2;
    params.subband_codes = default_subband_codes(4);
    params.chans_per_subband = 2;
    params.num_timesteps = 2;
    simulate(&params).unwrap()
}

#[test]
fn test_args_file_is_merged() {
    let tmp = TempDir::new().unwrap();
    let args_file = tmp.path().join("args.toml");
    std::fs::write(
        &args_file,
        indoc! {r#"
            output_dir = "/data/out"

            [input]
            input_dir = "/data/raw"
            start = "2024-01-01T00:00:00"

            [conversion]
            num_subbands = 4
            max_workers = 2
            no_rephase = true
        "#},
    )
    .unwrap();

    let args_file = args_file.display().to_string();
    #[rustfmt::skip]
    let args = vec![
        "convert",
        &args_file,
        "--max-workers", "6",
        "-o", "/elsewhere",
    ];
    let args = ConvertArgs::parse_from(args).merge().unwrap();
    assert!(args.args_file.is_none());
    assert_eq!(args.output_dir.as_deref(), Some(Path::new("/elsewhere")));
    assert_eq!(
        args.search_args.input_dir.as_deref(),
        Some(Path::new("/data/raw"))
    );
    assert_eq!(args.conversion_args.max_workers, Some(6));
    assert_eq!(args.conversion_args.num_subbands, Some(4));
    assert!(args.conversion_args.no_rephase);

    let params = args.parse().unwrap();
    assert_eq!(params.config.subband_codes.len(), 4);
    assert_eq!(params.config.max_workers, 6);
    assert!(!params.config.rephase);
    assert!(params.window.start.is_some());
}

#[test]
fn test_bad_args_file() {
    let tmp = TempDir::new().unwrap();
    let args_file = tmp.path().join("args.yaml");
    std::fs::write(&args_file, "output_dir: /data/out\n").unwrap();
    let args_file = args_file.display().to_string();
    let result = ConvertArgs::parse_from(["convert", &args_file]).merge();
    assert!(matches!(result, Err(SubbandConvertError::ArgFile(_))));

    let args_file = tmp.path().join("args.json");
    std::fs::write(&args_file, "{ not json").unwrap();
    let args_file = args_file.display().to_string();
    let result = ConvertArgs::parse_from(["convert", &args_file]).merge();
    assert!(matches!(result, Err(SubbandConvertError::ArgFile(_))));
}

#[test]
fn test_missing_output_dir() {
    let result = ConvertArgs::parse_from(["convert", "-i", "/data/raw"]).parse();
    assert!(matches!(result, Err(SubbandConvertError::Config(_))));
}

#[test]
#[serial]
fn test_dry_run_then_convert() {
    let raw = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let shm = TempDir::new().unwrap();
    let groups = simulate_groups(raw.path());
    let output_dir = out.path().join("containers");

    let raw_str = raw.path().display().to_string();
    let out_str = output_dir.display().to_string();
    let shm_str = shm.path().display().to_string();
    #[rustfmt::skip]
    let args = vec![
        "convert",
        "-i", &raw_str,
        "-o", &out_str,
        "--num-subbands", "4",
        "--staging-dir", &shm_str,
        "--in-process",
    ];
    let args = ConvertArgs::parse_from(args);

    // A dry run doesn't even make the output directory.
    args.clone().run(true).unwrap();
    assert!(!output_dir.exists());

    args.clone().run(false).unwrap();
    for group in &groups {
        assert!(container_path(&output_dir, &group.key).is_dir());
    }

    // Existing outputs are skipped without error.
    args.run(false).unwrap();
}

#[test]
#[serial]
fn test_failed_groups_give_an_error() {
    let raw = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let groups = simulate_groups(raw.path());
    std::fs::write(&groups[0].files[0], b"SIMPLE  =                    T").unwrap();

    let raw_str = raw.path().display().to_string();
    let out_str = out.path().display().to_string();
    #[rustfmt::skip]
    let args = vec![
        "convert",
        "-i", &raw_str,
        "-o", &out_str,
        "--num-subbands", "4",
        "--no-staging",
        "--in-process",
    ];
    let result = ConvertArgs::parse_from(args).run(false);
    match result {
        Err(SubbandConvertError::Conversion(msg)) => assert!(msg.contains("1 of 2"), "{msg}"),
        other => panic!("{other:?}"),
    }
    assert!(!container_path(out.path(), &groups[0].key).exists());
    assert!(container_path(out.path(), &groups[1].key).is_dir());
}
