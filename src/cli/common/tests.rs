// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests against command-line interfaces that aren't big enough to go in their
//! own modules.

use std::path::PathBuf;

use approx::assert_abs_diff_eq;

use super::*;
use crate::constants::DEFAULT_MAX_WORKERS;

#[test]
fn test_no_overrides_gives_defaults() {
    let config = ConversionArgs::default().parse().unwrap();
    assert_eq!(config, ConversionConfig::default());
}

#[test]
fn test_overrides_are_applied() {
    let config = ConversionArgs {
        num_subbands: Some(4),
        tolerance: Some(30.0),
        freq_order: Some("Ascending".to_string()),
        phase_centre_mode: Some("per-integration".to_string()),
        no_staging: true,
        no_rephase: true,
        dut1: Some(-0.2),
        array_position: Some(vec![116.67, -26.7, 377.8]),
        no_skip_existing: true,
        ..Default::default()
    }
    .parse()
    .unwrap();
    assert_eq!(config.subband_codes, ["sb00", "sb01", "sb02", "sb03"]);
    assert_abs_diff_eq!(config.tolerance_s, 30.0);
    assert_eq!(config.freq_order, FreqOrder::Ascending);
    assert_eq!(config.phase_centre_mode, PhaseCentreMode::PerIntegration);
    assert!(!config.staging.enabled);
    assert!(!config.rephase);
    assert!(config.precess);
    assert_abs_diff_eq!(config.dut1_s, -0.2);
    assert_abs_diff_eq!(config.array_position.latitude_deg, -26.7);
    assert!(!config.skip_existing);
    assert_eq!(config.max_workers, DEFAULT_MAX_WORKERS);
}

#[test]
fn test_bad_overrides_are_rejected() {
    let result = ConversionArgs {
        freq_order: Some("sideways".to_string()),
        ..Default::default()
    }
    .parse();
    assert!(matches!(result, Err(SubbandConvertError::Config(_))));

    let result = ConversionArgs {
        max_workers: Some(0),
        ..Default::default()
    }
    .parse();
    assert!(matches!(result, Err(SubbandConvertError::Config(_))));

    let result = ConversionArgs {
        array_position: Some(vec![1.0, 2.0]),
        ..Default::default()
    }
    .parse();
    assert!(matches!(result, Err(SubbandConvertError::Config(_))));
}

#[test]
fn test_cli_args_win_when_merging() {
    let cli = ConversionArgs {
        max_workers: Some(8),
        ..Default::default()
    };
    let file = ConversionArgs {
        max_workers: Some(2),
        tolerance: Some(10.0),
        no_precession: true,
        ..Default::default()
    };
    let merged = cli.merge(file);
    assert_eq!(merged.max_workers, Some(8));
    assert_eq!(merged.tolerance, Some(10.0));
    assert!(merged.no_precession);

    let merged = SearchArgs {
        input_dir: None,
        start: Some("2024-01-01T00:00:00".to_string()),
        end: None,
    }
    .merge(SearchArgs {
        input_dir: Some(PathBuf::from("raw")),
        start: Some("2023-01-01T00:00:00".to_string()),
        end: None,
    });
    assert_eq!(merged.input_dir, Some(PathBuf::from("raw")));
    assert_eq!(merged.start.as_deref(), Some("2024-01-01T00:00:00"));
}

#[test]
fn test_search_args_need_an_input_dir() {
    assert!(matches!(
        SearchArgs::default().parse(),
        Err(SubbandConvertError::Discovery(_))
    ));
    let result = SearchArgs {
        input_dir: Some(PathBuf::from("raw")),
        start: Some("yesterday".to_string()),
        end: None,
    }
    .parse();
    assert!(matches!(result, Err(SubbandConvertError::Discovery(_))));

    let (dir, window) = SearchArgs {
        input_dir: Some(PathBuf::from("raw")),
        start: Some("2024-01-01T00:00:00".to_string()),
        end: None,
    }
    .parse()
    .unwrap();
    assert_eq!(dir, PathBuf::from("raw"));
    assert!(window.start.is_some());
    assert!(window.end.is_none());
}
