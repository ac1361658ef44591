// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::Path;

use tempfile::TempDir;

use crate::{containers, get_cmd_output, simulate_groups, subband_convert};

fn convert(raw: &Path, out: &Path, staging: &Path, extra: &[&str]) -> assert_cmd::Command {
    let raw = raw.display().to_string();
    let out = out.display().to_string();
    let staging = staging.display().to_string();
    let mut cmd = subband_convert();
    #[rustfmt::skip]
    cmd.args([
        "convert",
        "-i", &raw,
        "-o", &out,
        "--num-subbands", "4",
        "--staging-dir", &staging,
        "-j", "2",
        "--no-progress-bars",
    ]);
    cmd.args(extra);
    cmd
}

#[test]
fn test_simulate_convert_validate_export() {
    let raw = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    simulate_groups(raw.path(), 2);

    let cmd = convert(raw.path(), out.path(), staging.path(), &[]).ok();
    assert!(cmd.is_ok(), "convert failed: {:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("converted: 2"), "{stdout}");

    let made = containers(out.path());
    assert_eq!(made.len(), 2);
    // Nothing but containers is left behind.
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 2);

    let glob = out.path().join("*.vis").display().to_string();
    let cmd = subband_convert()
        .args(["validate", &glob, "--expected-subbands", "4", "--json"])
        .ok();
    assert!(cmd.is_ok(), "validate failed: {:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    let reports: Vec<serde_json::Value> = stdout
        .lines()
        .filter(|l| l.starts_with('{'))
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(reports.len(), 2);
    for report in reports {
        assert_eq!(report["valid"], serde_json::json!(true));
        assert_eq!(report["num_subbands"], serde_json::json!(4));
        assert_eq!(report["num_channels"], serde_json::json!(8));
    }

    let exported = out.path().join("exported.uvfits");
    let container = made[0].display().to_string();
    let exported_str = exported.display().to_string();
    let cmd = subband_convert()
        .args(["export", &container, "-o", &exported_str])
        .ok();
    assert!(cmd.is_ok(), "export failed: {:?}", get_cmd_output(cmd));
    assert!(exported.is_file());
}

#[test]
fn test_convert_is_idempotent() {
    let raw = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    simulate_groups(raw.path(), 1);

    let cmd = convert(raw.path(), out.path(), staging.path(), &[]).ok();
    assert!(cmd.is_ok(), "convert failed: {:?}", get_cmd_output(cmd));
    let made = containers(out.path());
    assert_eq!(made.len(), 1);
    let main_table = made[0].join("MAIN.bin");
    let modified = std::fs::metadata(&main_table).unwrap().modified().unwrap();

    let cmd = convert(raw.path(), out.path(), staging.path(), &[]).ok();
    assert!(cmd.is_ok(), "convert failed: {:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("skipped (existing): 1"), "{stdout}");
    assert_eq!(
        std::fs::metadata(&main_table).unwrap().modified().unwrap(),
        modified
    );

    // Refusing to skip is a failure, and the container is untouched.
    let cmd = convert(raw.path(), out.path(), staging.path(), &["--no-skip-existing"]).ok();
    assert!(cmd.is_err());
    assert_eq!(
        std::fs::metadata(&main_table).unwrap().modified().unwrap(),
        modified
    );
}

#[test]
fn test_failure_is_contained() {
    let raw = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let files = simulate_groups(raw.path(), 2);
    // The first file belongs to the first group. Keep the FITS signature so
    // that discovery accepts it; the worker can't read it.
    std::fs::write(&files[0], b"SIMPLE  =                    T").unwrap();

    let cmd = convert(
        raw.path(),
        out.path(),
        staging.path(),
        &["--max-concurrent-groups", "2"],
    )
    .ok();
    assert!(cmd.is_err());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stdout.contains("converted: 1"), "{stdout}");
    assert!(stdout.contains("failed: 1"), "{stdout}");
    assert!(stderr.contains("1 of 2 group(s) failed"), "{stderr}");

    assert_eq!(containers(out.path()).len(), 1);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 1);
    let staged = staging.path().join("subband-convert");
    if staged.exists() {
        assert_eq!(std::fs::read_dir(staged).unwrap().count(), 0);
    }
}

#[test]
fn test_worker_failure_is_contained() {
    let raw = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let files = simulate_groups(raw.path(), 2);
    // Rename an antenna in one subband of the first group. Its header and
    // timestamps still read, so only its worker process fails.
    let bad = files[..4]
        .iter()
        .find(|f| f.to_string_lossy().ends_with("_sb00.uvfits"))
        .unwrap();
    let mut bytes = std::fs::read(bad).unwrap();
    let mut renamed = 0;
    for i in 0..bytes.len().saturating_sub(6) {
        if &bytes[i..i + 6] == b"ant003" {
            bytes[i..i + 3].copy_from_slice(b"zzz");
            renamed += 1;
        }
    }
    assert!(renamed > 0);
    std::fs::write(bad, bytes).unwrap();

    let cmd = convert(
        raw.path(),
        out.path(),
        staging.path(),
        &["--max-concurrent-groups", "2"],
    )
    .ok();
    assert!(cmd.is_err());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stdout.contains("converted: 1"), "{stdout}");
    assert!(stdout.contains("failed: 1"), "{stdout}");
    // The worker's own error message is passed on.
    let all = format!("{stdout}{stderr}");
    assert!(all.contains("sb00"), "{all}");
    assert!(all.contains("zzz003"), "{all}");

    assert_eq!(containers(out.path()).len(), 1);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 1);
    let staged = staging.path().join("subband-convert");
    if staged.exists() {
        assert_eq!(std::fs::read_dir(staged).unwrap().count(), 0);
    }
}

#[test]
fn test_dry_run_and_saved_arguments() {
    let raw = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    simulate_groups(raw.path(), 1);
    let output_dir = out.path().join("containers");
    let toml = out.path().join("convert.toml");
    let toml_str = toml.display().to_string();

    let cmd = convert(
        raw.path(),
        &output_dir,
        staging.path(),
        &["--dry-run", "--save-toml", &toml_str],
    )
    .ok();
    assert!(cmd.is_ok(), "dry run failed: {:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Dry run"), "{stdout}");
    assert!(!output_dir.exists());
    assert!(toml.is_file());

    // The saved arguments reproduce the run.
    let cmd = subband_convert()
        .args(["convert", &toml_str, "--no-progress-bars"])
        .ok();
    assert!(cmd.is_ok(), "convert failed: {:?}", get_cmd_output(cmd));
    assert_eq!(containers(&output_dir).len(), 1);
}
