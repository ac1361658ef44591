// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{sync::Mutex, time::Duration as StdDuration};

use approx::assert_abs_diff_eq;
use hifitime::Epoch;
use marlu::LatLngHeight;
use ndarray::Axis;
use serial_test::serial;
use tempfile::TempDir;

use super::{concat::concatenate_with_retry_inner, *};
use crate::{
    config::{default_subband_codes, ConversionConfig},
    constants::{OVRO_HEIGHT_M, OVRO_LAT_RAD, OVRO_LONG_RAD},
    dataset::tests::tiny_dataset,
    discovery::{discover, TimeWindow},
    io::{
        container::{read_container, write_container, ContainerError},
        read::UvfitsReader,
    },
    phase_centre::{compute_phase_centres, ObservingSite, PhaseCentreMode, PhaseCentres},
    simulate::{simulate, simulated_layout, SimulationParams},
};

/// The tiny dataset, moved up in frequency by `index` subbands.
fn tiny_part(index: usize) -> VisibilityDataset {
    let mut dataset = tiny_dataset();
    let offset = index as f64 * 4e7;
    for f in dataset.freqs_hz.iter_mut() {
        *f += offset;
    }
    dataset
}

fn tiny_jobs(dir: &Path, num_jobs: usize) -> Vec<SubbandJob> {
    let dataset = tiny_dataset();
    (0..num_jobs)
        .map(|index| SubbandJob {
            index,
            code: format!("sb{index:02}"),
            input: dir.join(format!("input_{index}.uvfits")),
            part: dir.join(format!("part_{index}.vis")),
            antennas: dataset.antennas.clone(),
            phase_centres: PhaseCentres::Shared(dataset.phase_centres[0].clone()),
            site: ObservingSite {
                array_position: dataset.antennas.array_position,
                dut1_s: 0.0,
                precess: true,
            },
            rephase: true,
        })
        .collect()
}

/// Writes tiny parts. Earlier jobs take longer, so they finish last. Jobs in
/// `fail` return an error instead.
struct TinyWorker {
    num_jobs: usize,
    fail: Vec<usize>,
    finished: Mutex<Vec<usize>>,
}

impl TinyWorker {
    fn new(num_jobs: usize, fail: Vec<usize>) -> TinyWorker {
        TinyWorker {
            num_jobs,
            fail,
            finished: Mutex::new(vec![]),
        }
    }
}

impl SubbandWorker for TinyWorker {
    fn run(&self, job: &SubbandJob, cancel: &AtomicCell<bool>) -> Result<(), WriteError> {
        std::thread::sleep(StdDuration::from_millis(
            30 * (self.num_jobs - job.index) as u64,
        ));
        if cancel.load() {
            return Err(WriteError::Cancelled {
                code: job.code.clone(),
            });
        }
        if self.fail.contains(&job.index) {
            return Err(WriteError::WorkerFailed {
                code: job.code.clone(),
                input: job.input.clone(),
                status: "1".to_string(),
                stderr: "bad subband".to_string(),
            });
        }
        write_container(&job.part, &tiny_part(job.index))?;
        self.finished.lock().unwrap().push(job.index);
        Ok(())
    }
}

#[test]
fn test_parts_keep_submission_order() {
    let tmp = TempDir::new().unwrap();
    let jobs = tiny_jobs(tmp.path(), 4);
    let worker = TinyWorker::new(4, vec![]);

    let parts = write_parts(&jobs, &worker, 4).unwrap();
    // With all four running at once, the last job finishes first.
    let finished = worker.finished.lock().unwrap().clone();
    assert_eq!(finished.first(), Some(&3));

    assert_eq!(parts.len(), 4);
    for (i, part) in parts.iter().enumerate() {
        assert_eq!(part.index, i);
        assert_eq!(part.code, format!("sb{i:02}"));
        assert_eq!(part.path, jobs[i].part);
        assert_eq!(part.num_rows, 12);
        assert_eq!(part.num_channels, 4);
        assert_abs_diff_eq!(part.first_freq_hz, 1.40e9 + i as f64 * 4e7);
        assert_abs_diff_eq!(part.last_freq_hz, 1.43e9 + i as f64 * 4e7);
    }
}

#[test]
fn test_single_worker() {
    let tmp = TempDir::new().unwrap();
    let jobs = tiny_jobs(tmp.path(), 3);
    let worker = TinyWorker::new(3, vec![]);
    let parts = write_parts(&jobs, &worker, 1).unwrap();
    assert_eq!(*worker.finished.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(parts.iter().map(|p| p.index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn test_failure_removes_every_part() {
    let tmp = TempDir::new().unwrap();
    let jobs = tiny_jobs(tmp.path(), 4);
    let worker = TinyWorker::new(4, vec![1]);

    let result = write_parts(&jobs, &worker, 4);
    assert!(matches!(
        result,
        Err(WriteError::WorkerFailed { code, .. }) if code == "sb01"
    ));
    // Jobs 2 and 3 finished before job 1 failed; their parts are gone too.
    for job in &jobs {
        assert!(!job.part.exists(), "{} still exists", job.part.display());
    }
}

#[test]
fn test_lowest_failure_is_reported() {
    let tmp = TempDir::new().unwrap();
    let jobs = tiny_jobs(tmp.path(), 3);
    // One thread runs the jobs in order, so job 2 is cancelled.
    let worker = TinyWorker::new(3, vec![0, 2]);
    let result = write_parts(&jobs, &worker, 1);
    assert!(matches!(
        result,
        Err(WriteError::WorkerFailed { code, .. }) if code == "sb00"
    ));
    assert!(worker.finished.lock().unwrap().is_empty());
}

#[test]
fn test_write_group_concatenates_and_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let jobs = tiny_jobs(tmp.path(), 3);
    let worker = TinyWorker::new(3, vec![]);
    let output = tmp.path().join("merged.vis");
    let policy = RetryPolicy {
        attempts: 2,
        initial_delay: StdDuration::from_millis(1),
    };

    let merged = write_group(&jobs, &worker, 2, &output, policy).unwrap();
    assert_eq!(merged.num_channels(), 12);
    assert_eq!(merged.num_subbands, 3);
    assert!(merged.freqs_ascending());
    assert!(jobs.iter().all(|job| !job.part.exists()));

    let read = read_container(&output).unwrap();
    assert_eq!(read.freqs_hz, merged.freqs_hz);
    // Each part's channels keep their values: (channel + 1) in every part.
    for (i_chan, vis_chan) in read.vis.axis_iter(Axis(1)).enumerate() {
        let expected = (i_chan % 4) as f32 + 1.0;
        assert!(vis_chan.iter().all(|j| (j[0].re - expected).abs() < 1e-6));
    }
}

#[test]
fn test_merge_rejects_descending_parts() {
    let result = merge_datasets(vec![
        (Path::new("b"), tiny_part(1)),
        (Path::new("a"), tiny_part(0)),
    ]);
    assert!(matches!(
        result,
        Err(ConcatError::NotAscending { part, .. }) if part == Path::new("a")
    ));

    // Overlapping frequencies are no better.
    let mut overlapping = tiny_part(1);
    overlapping.freqs_hz[0] = 1.43e9;
    assert!(matches!(
        merge_datasets(vec![(Path::new("a"), tiny_part(0)), (Path::new("b"), overlapping)]),
        Err(ConcatError::NotAscending { .. })
    ));
}

#[test]
fn test_merge_rejects_geometry_mismatch() {
    let mut other_times = tiny_part(1);
    other_times.timestamps[1] = Epoch::from_gpst_seconds(1e9 + 11.0);
    assert!(matches!(
        merge_datasets(vec![(Path::new("a"), tiny_part(0)), (Path::new("b"), other_times)]),
        Err(ConcatError::GeometryMismatch { part, .. }) if part == Path::new("b")
    ));

    let mut other_centre = tiny_part(1);
    other_centre.phase_centres[0].radec.ra += 1e-6;
    assert!(matches!(
        merge_datasets(vec![(Path::new("a"), tiny_part(0)), (Path::new("b"), other_centre)]),
        Err(ConcatError::GeometryMismatch { .. })
    ));

    assert!(matches!(merge_datasets(vec![]), Err(ConcatError::NoParts)));
}

fn transient_error() -> ConcatError {
    ConcatError::Container(ContainerError::IO {
        file: PathBuf::from("MAIN.bin"),
        err: std::io::Error::from(std::io::ErrorKind::Interrupted),
    })
}

#[test]
fn test_concat_retries_transient_errors() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("out.vis");
    let policy = RetryPolicy {
        attempts: 3,
        initial_delay: StdDuration::from_millis(1),
    };

    let mut calls = 0;
    let merged = concatenate_with_retry_inner(&output, policy, || {
        calls += 1;
        if calls < 3 {
            // Leave something behind, as a failed write would.
            std::fs::create_dir_all(&output).unwrap();
            Err(transient_error())
        } else {
            assert!(!output.exists());
            Ok(tiny_dataset())
        }
    })
    .unwrap();
    assert_eq!(calls, 3);
    assert_eq!(merged.num_channels(), 4);

    let mut calls = 0;
    let result = concatenate_with_retry_inner(&output, policy, || {
        calls += 1;
        Err(transient_error())
    });
    assert_eq!(calls, 3);
    assert!(matches!(
        result,
        Err(ConcatError::RetriesExhausted { attempts: 3, .. })
    ));
}

#[test]
fn test_concat_doesnt_retry_other_errors() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("out.vis");
    let policy = RetryPolicy {
        attempts: 5,
        initial_delay: StdDuration::from_millis(1),
    };
    let mut calls = 0;
    let result = concatenate_with_retry_inner(&output, policy, || {
        calls += 1;
        Err(ConcatError::NoParts)
    });
    assert_eq!(calls, 1);
    assert!(matches!(result, Err(ConcatError::NoParts)));

    // An existing output is never touched.
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(output.join("keep"), b"x").unwrap();
    let result = concatenate_with_retry_inner(&output, policy, || Ok(tiny_dataset()));
    assert!(matches!(
        result,
        Err(ConcatError::Container(ContainerError::Exists(_)))
    ));
    assert!(output.join("keep").exists());
}

#[test]
fn test_transient_io_errors() {
    use std::io::{Error, ErrorKind};

    use super::error::is_transient_io;

    assert!(transient_error().is_transient());
    assert!(ConcatError::Container(ContainerError::IO {
        file: PathBuf::new(),
        err: Error::from_raw_os_error(libc::EBUSY),
    })
    .is_transient());
    assert!(!ConcatError::Container(ContainerError::IO {
        file: PathBuf::new(),
        err: Error::from(ErrorKind::NotFound),
    })
    .is_transient());
    assert!(!ConcatError::NoParts.is_transient());

    for errno in [libc::EBUSY, libc::EXDEV, libc::ETXTBSY, libc::ENOTEMPTY] {
        assert!(is_transient_io(&Error::from_raw_os_error(errno)), "{errno}");
    }
    assert!(!is_transient_io(&Error::from_raw_os_error(libc::EACCES)));
}

#[test]
fn test_job_json() {
    let tmp = TempDir::new().unwrap();
    let job = tiny_jobs(tmp.path(), 1).remove(0);
    let json = serde_json::to_string(&job).unwrap();
    let decoded: SubbandJob = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.code, job.code);
    assert_eq!(decoded.part, job.part);
    assert_eq!(decoded.antennas.names, job.antennas.names);
    assert!(decoded.rephase);

    // The input doesn't exist.
    assert!(matches!(
        run_job_from_reader(json.as_bytes()),
        Err(WriteError::Read(_))
    ));
    assert!(matches!(
        run_job_from_reader(&b"{"[..]),
        Err(WriteError::DecodeJob(_))
    ));
}

/// A stand-in for the worker executable: it checks its subcommand, swallows
/// the job and then runs `body`.
#[cfg(unix)]
fn fake_worker_exe(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let exe = dir.join(name);
    std::fs::write(
        &exe,
        format!("#!/bin/sh\n[ \"$1\" = write-subband ] || exit 9\ncat > /dev/null\n{body}\n"),
    )
    .unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
    exe
}

#[cfg(unix)]
#[test]
#[serial]
fn test_process_worker_exit_status() {
    let tmp = TempDir::new().unwrap();
    let job = tiny_jobs(tmp.path(), 1).remove(0);
    let cancel = AtomicCell::new(false);

    let worker = ProcessWorker::new(fake_worker_exe(tmp.path(), "ok", "exit 0"));
    worker.run(&job, &cancel).unwrap();

    let worker = ProcessWorker::new(fake_worker_exe(
        tmp.path(),
        "corrupt",
        "echo 'the data is corrupt' >&2\nexit 3",
    ));
    match worker.run(&job, &cancel) {
        Err(WriteError::WorkerFailed {
            code,
            input,
            status,
            stderr,
        }) => {
            assert_eq!(code, "sb00");
            assert_eq!(input, job.input);
            assert_eq!(status, "3");
            assert_eq!(stderr, "the data is corrupt");
        }
        other => panic!("{other:?}"),
    }

    // A cancelled job doesn't even start.
    cancel.store(true);
    assert!(matches!(
        worker.run(&job, &cancel),
        Err(WriteError::Cancelled { .. })
    ));

    let missing = ProcessWorker::new(tmp.path().join("missing-exe"));
    assert!(matches!(
        missing.run(&job, &AtomicCell::new(false)),
        Err(WriteError::Spawn { .. })
    ));
}

#[cfg(unix)]
#[test]
#[serial]
fn test_process_worker_is_killed_when_cancelled() {
    let tmp = TempDir::new().unwrap();
    let job = tiny_jobs(tmp.path(), 1).remove(0);
    let worker = ProcessWorker::new(fake_worker_exe(tmp.path(), "slow", "exec sleep 30"));
    let cancel = AtomicCell::new(false);

    let start = std::time::Instant::now();
    let result = std::thread::scope(|s| {
        s.spawn(|| {
            std::thread::sleep(StdDuration::from_millis(200));
            cancel.store(true);
        });
        worker.run(&job, &cancel)
    });
    assert!(matches!(result, Err(WriteError::Cancelled { .. })), "{result:?}");
    assert!(start.elapsed() < StdDuration::from_secs(10));
}

/// A failing subband of one group cancels its siblings and removes their
/// parts.
#[test]
fn test_failed_subband_fails_the_group() {
    let tmp = TempDir::new().unwrap();
    let jobs = tiny_jobs(tmp.path(), 4);
    let worker = TinyWorker::new(4, vec![2]);
    let output = tmp.path().join("merged.vis");
    let policy = RetryPolicy {
        attempts: 1,
        initial_delay: StdDuration::from_millis(1),
    };
    let result = write_group(&jobs, &worker, 2, &output, policy);
    assert!(matches!(
        result,
        Err(GroupWriteError::Write(WriteError::WorkerFailed { .. }))
    ));
    assert!(!output.exists());
    for job in &jobs {
        assert!(!job.part.exists(), "{}", job.part.display());
    }
}

#[test]
#[serial]
fn test_convert_simulated_group_in_process() {
    let tmp = TempDir::new().unwrap();
    let raw_dir = tmp.path().join("raw");
    let array_position = LatLngHeight {
        longitude_rad: OVRO_LONG_RAD,
        latitude_rad: OVRO_LAT_RAD,
        height_metres: OVRO_HEIGHT_M,
    };
    let mut params =
        SimulationParams::new(raw_dir.clone(), simulated_layout(5, array_position).unwrap());
    params.subband_codes = default_subband_codes(4);
    params.chans_per_subband = 2;
    params.num_timesteps = 2;
    simulate(&params).unwrap();

    let config = ConversionConfig {
        subband_codes: default_subband_codes(4),
        ..Default::default()
    };
    let discovery = discover(&raw_dir, TimeWindow::default(), &config).unwrap();
    let group = &discovery.groups[0];
    let site = ObservingSite {
        array_position,
        dut1_s: 0.0,
        precess: true,
    };

    // Ascending frequency order is the reverse of the code order.
    let mut readers = vec![];
    for file in group.files.iter().rev() {
        readers.push(UvfitsReader::new(&file.path).unwrap());
    }
    let antennas = readers[0].read_antennas(Some(array_position)).unwrap();
    let times: Vec<Vec<Epoch>> = readers
        .iter()
        .map(|r| r.read_timestamps().unwrap())
        .collect();
    let phase_centres = compute_phase_centres(
        &group.key,
        readers[0].header.pointing_dec_rad,
        &times,
        PhaseCentreMode::Shared,
        &site,
    )
    .unwrap();

    let work = tmp.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    let jobs: Vec<SubbandJob> = group
        .files
        .iter()
        .rev()
        .enumerate()
        .map(|(index, file)| SubbandJob {
            index,
            code: file.code.clone(),
            input: file.path.clone(),
            part: work.join(format!("{}.vis", file.code)),
            antennas: antennas.clone(),
            phase_centres: phase_centres.clone(),
            site,
            rephase: true,
        })
        .collect();

    let output = tmp.path().join("out.vis");
    let policy = RetryPolicy {
        attempts: 1,
        initial_delay: StdDuration::from_millis(1),
    };
    let merged = write_group(&jobs, &InProcessWorker, 2, &output, policy).unwrap();
    merged.check().unwrap();
    assert_eq!(merged.num_channels(), 8);
    assert_eq!(merged.num_subbands, 4);
    assert!(merged.freqs_ascending());
    assert_abs_diff_eq!(merged.freqs_hz[0], params.lowest_freq_hz, epsilon = 1.0);
    assert_eq!(merged.phase_centres.len(), 1);
    assert!(merged.field_ids.iter().all(|&f| f == 0));

    // Phased to the source, every correlation is real.
    for jones in merged.vis.iter() {
        assert_abs_diff_eq!(jones[0].re, 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(jones[0].im, 0.0, epsilon = 1e-2);
    }
    assert!(std::fs::read_dir(&work).unwrap().next().is_none());
}
