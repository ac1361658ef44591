// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use clap::{CommandFactory, ErrorKind, Parser};

use super::*;

#[test]
fn test_command_line_is_well_formed() {
    SubbandConvert::command().debug_assert();
}

#[test]
fn test_subband_codes_and_count_conflict() {
    #[rustfmt::skip]
    let result = SubbandConvert::try_parse_from([
        "subband-convert",
        "convert",
        "-i", "/data/raw",
        "-o", "/data/out",
        "--num-subbands", "4",
        "--subband-codes", "sb00", "sb01",
    ]);
    match result {
        Err(e) => assert_eq!(e.kind(), ErrorKind::ArgumentConflict),
        Ok(args) => panic!("{args:?}"),
    }

    #[rustfmt::skip]
    let result = SubbandConvert::try_parse_from([
        "subband-convert",
        "discover",
        "-i", "/data/raw",
        "--subband-codes", "sb00", "sb01",
    ]);
    assert!(result.is_ok());
}
