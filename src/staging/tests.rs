// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tempfile::TempDir;

use super::*;

/// Reports a fixed amount of free space everywhere.
struct FixedGauge(Option<u64>);

impl SpaceGauge for FixedGauge {
    fn available_bytes(&self, _: &Path) -> Option<u64> {
        self.0
    }
}

fn staging_config(path: &Path) -> StagingConfig {
    StagingConfig {
        enabled: true,
        path: path.to_path_buf(),
        safety_factor: 2.0,
    }
}

/// Pretend to write a container in the workspace.
fn write_output(ws: &Workspace) {
    let output = ws.output_path();
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(output.join("MAIN.json"), b"{}").unwrap();
}

#[test]
fn test_staged_when_there_is_space() {
    let shm = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("2024-01-01T00:00:00.vis");

    let ws = Workspace::new(
        "2024-01-01T00:00:00",
        &dest,
        1000,
        &staging_config(shm.path()),
        &FixedGauge(Some(2000)),
    )
    .unwrap();
    assert!(ws.is_staged());
    assert!(ws.work_dir().starts_with(shm.path().join(STAGING_SUBDIR)));
    assert!(ws.work_dir().is_dir());
    assert!(ws.part_path("sb03").ends_with("sb03.part.vis"));

    write_output(&ws);
    let work_dir = ws.work_dir().to_path_buf();
    let finalised = ws.finalise().unwrap();
    assert_eq!(finalised, dest);
    assert!(dest.join("MAIN.json").is_file());
    assert!(!work_dir.exists());
}

#[test]
fn test_insufficient_space_writes_directly() {
    let shm = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("key.vis");

    let ws = Workspace::new(
        "key",
        &dest,
        1000,
        &staging_config(shm.path()),
        &FixedGauge(Some(1999)),
    )
    .unwrap();
    assert!(!ws.is_staged());
    assert_eq!(
        ws.direct_reason(),
        Some(&DirectReason::NotEnoughSpace {
            available: 1999,
            needed: 2000
        })
    );
    assert_eq!(ws.work_dir().parent(), Some(out.path()));
    let work_name = ws.work_dir().file_name().unwrap().to_string_lossy().to_string();
    assert!(work_name.starts_with(".key.work_"), "{work_name}");
    // Nothing was made in the staging area.
    assert!(!shm.path().join(STAGING_SUBDIR).exists());

    write_output(&ws);
    ws.finalise().unwrap();
    assert!(dest.join("MAIN.json").is_file());
    // Only the container is left in the output directory.
    let entries: Vec<_> = std::fs::read_dir(out.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_other_fallbacks() {
    let out = TempDir::new().unwrap();
    let dest = out.path().join("key.vis");

    let ws = Workspace::new(
        "key",
        &dest,
        10,
        &staging_config(&out.path().join("missing")),
        &FixedGauge(Some(u64::MAX)),
    )
    .unwrap();
    assert_eq!(ws.direct_reason(), Some(&DirectReason::NotWritable));

    let shm = TempDir::new().unwrap();
    let ws = Workspace::new(
        "key",
        &dest,
        10,
        &staging_config(shm.path()),
        &FixedGauge(None),
    )
    .unwrap();
    assert_eq!(ws.direct_reason(), Some(&DirectReason::UnknownSpace));

    let mut config = staging_config(shm.path());
    config.enabled = false;
    let ws = Workspace::new("key", &dest, 10, &config, &FixedGauge(Some(u64::MAX))).unwrap();
    assert_eq!(ws.direct_reason(), Some(&DirectReason::Disabled));
}

#[test]
fn test_work_dirs_are_unique() {
    let shm = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("key.vis");
    let config = staging_config(shm.path());
    let gauge = FixedGauge(Some(u64::MAX));
    let ws1 = Workspace::new("key", &dest, 10, &config, &gauge).unwrap();
    let ws2 = Workspace::new("key", &dest, 10, &config, &gauge).unwrap();
    assert_ne!(ws1.work_dir(), ws2.work_dir());
}

#[test]
fn test_dropping_removes_the_work_dir() {
    let shm = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("key.vis");
    let ws = Workspace::new(
        "key",
        &dest,
        10,
        &staging_config(shm.path()),
        &FixedGauge(Some(u64::MAX)),
    )
    .unwrap();
    write_output(&ws);
    let work_dir = ws.work_dir().to_path_buf();
    drop(ws);
    assert!(!work_dir.exists());
    assert!(!dest.exists());
}

#[test]
fn test_finalise_never_replaces() {
    let shm = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("key.vis");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("old"), b"old").unwrap();

    let ws = Workspace::new(
        "key",
        &dest,
        10,
        &staging_config(shm.path()),
        &FixedGauge(Some(u64::MAX)),
    )
    .unwrap();
    write_output(&ws);
    assert!(matches!(
        ws.finalise(),
        Err(StagingError::DestinationExists(_))
    ));
    assert!(dest.join("old").is_file());
    assert!(!dest.join("MAIN.json").exists());

    // Nothing written, nothing to finalise.
    let dest2 = out.path().join("key2.vis");
    let ws = Workspace::new(
        "key2",
        &dest2,
        10,
        &staging_config(shm.path()),
        &FixedGauge(Some(u64::MAX)),
    )
    .unwrap();
    assert!(matches!(
        ws.finalise(),
        Err(StagingError::NothingToFinalise(_))
    ));
    assert!(!dest2.exists());
}

#[test]
fn test_copy_into_place() {
    let src_dir = TempDir::new().unwrap();
    let src = src_dir.path().join("c.vis");
    std::fs::create_dir_all(src.join("nested")).unwrap();
    std::fs::write(src.join("MAIN.bin"), [1_u8, 2, 3]).unwrap();
    std::fs::write(src.join("nested").join("x"), b"x").unwrap();

    let out = TempDir::new().unwrap();
    let dest = out.path().join("c.vis");
    copy_into_place(&src, &dest).unwrap();
    assert_eq!(std::fs::read(dest.join("MAIN.bin")).unwrap(), vec![1, 2, 3]);
    assert!(dest.join("nested").join("x").is_file());
    assert!(!src.exists());
    // No partial copies are left behind.
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 1);

    // A missing source leaves nothing at the destination.
    let dest2 = out.path().join("d.vis");
    assert!(matches!(
        copy_into_place(&src, &dest2),
        Err(StagingError::Copy { .. })
    ));
    assert!(!dest2.exists());
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 1);
}

#[test]
fn test_sysinfo_gauge() {
    // Paths that can't be resolved have unknown space.
    let gauge = SysinfoGauge;
    assert!(gauge
        .available_bytes(Path::new("/definitely/not/a/real/path"))
        .is_none());
}
