// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tempfile::TempDir;

use crate::{get_cmd_output, simulate_groups, subband_convert};

#[test]
fn test_discover_json() {
    let raw = TempDir::new().unwrap();
    let files = simulate_groups(raw.path(), 3);
    // Break the last group.
    std::fs::remove_file(files.last().unwrap()).unwrap();
    std::fs::write(raw.path().join("notes.uvfits"), b"not a subband").unwrap();

    let raw_str = raw.path().display().to_string();
    let cmd = subband_convert()
        .args(["discover", "-i", &raw_str, "--num-subbands", "4", "--json"])
        .ok();
    assert!(cmd.is_ok(), "discover failed: {:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    let json: serde_json::Value = stdout
        .lines()
        .find(|l| l.starts_with('{'))
        .map(|l| serde_json::from_str(l).unwrap())
        .unwrap();
    assert_eq!(json["groups"].as_array().unwrap().len(), 2);
    assert_eq!(json["incomplete"].as_array().unwrap().len(), 1);
    assert_eq!(json["skipped"].as_array().unwrap().len(), 1);
    for group in json["groups"].as_array().unwrap() {
        assert_eq!(group["files"].as_array().unwrap().len(), 4);
    }
}

#[test]
fn test_missing_input_dir() {
    let cmd = subband_convert()
        .args(["discover", "-i", "/this/does/not/exist"])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("/this/does/not/exist"), "{stderr}");
}
