// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use clap::Parser;
use tempfile::TempDir;

use super::ValidateArgs;
use crate::{
    dataset::tests::tiny_dataset,
    io::container::{container_path, write_container},
    SubbandConvertError,
};

#[test]
fn test_validate_globbed_containers() {
    let tmp = TempDir::new().unwrap();
    for key in ["a", "b"] {
        write_container(&container_path(tmp.path(), key), &tiny_dataset()).unwrap();
    }
    let glob = tmp.path().join("*.vis").display().to_string();

    #[rustfmt::skip]
    let args = vec![
        "validate",
        &glob,
        "--min-output-bytes", "1",
        "--expected-subbands", "1",
    ];
    ValidateArgs::parse_from(args).run().unwrap();

    // Both containers are missing a subband.
    #[rustfmt::skip]
    let args = vec![
        "validate",
        &glob,
        "--min-output-bytes", "1",
        "--expected-subbands", "2",
        "--json",
    ];
    match ValidateArgs::parse_from(args).run() {
        Err(SubbandConvertError::Validation(msg)) => assert!(msg.starts_with("2 of 2"), "{msg}"),
        other => panic!("{other:?}"),
    }
}

#[test]
fn test_validate_nothing_matched() {
    let tmp = TempDir::new().unwrap();
    let glob = tmp.path().join("*.vis").display().to_string();
    let result = ValidateArgs::parse_from(["validate", &glob]).run();
    assert!(matches!(result, Err(SubbandConvertError::Glob(_))));
}
