// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod convert;
mod discover;

use std::{
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};

fn subband_convert() -> Command {
    Command::cargo_bin("subband-convert").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

/// Simulate small groups of 4 subbands into `dir` and return the subband
/// files, sorted by name.
fn simulate_groups(dir: &Path, num_groups: usize) -> Vec<PathBuf> {
    let dir_str = dir.display().to_string();
    let num_groups = num_groups.to_string();
    #[rustfmt::skip]
    let cmd = subband_convert()
        .args([
            "simulate",
            "-o", &dir_str,
            "--num-groups", &num_groups,
            "--num-subbands", "4",
            "--chans-per-subband", "2",
            "--num-timesteps", "2",
            "--num-antennas", "4",
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "simulate failed: {:?}", get_cmd_output(cmd));

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
}

/// The finished containers in a directory, sorted by name.
fn containers(dir: &Path) -> Vec<PathBuf> {
    let mut containers: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("vis")
                && !p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(".")
                    .starts_with('.')
        })
        .collect();
    containers.sort();
    containers
}
