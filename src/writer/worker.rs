// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Converting one raw subband into a part, either in this process or in a
//! child process.

use std::{
    io::{Read, Write},
    path::PathBuf,
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use crossbeam_utils::atomic::AtomicCell;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::WriteError;
use crate::{
    antennas::AntennaLayout,
    geometry::update_geometry,
    io::{container::write_container, read::UvfitsReader},
    phase_centre::{ObservingSite, PhaseCentres},
};

/// How often a running child is checked on.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Everything a worker needs to turn one raw subband into a part. Jobs are
/// passed to worker processes as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubbandJob {
    /// The position of this subband in ascending frequency order.
    pub index: usize,

    pub code: String,

    pub input: PathBuf,

    /// Where the part container is written. It must not exist yet.
    pub part: PathBuf,

    pub antennas: AntennaLayout,

    /// Shared by every job of a group.
    pub phase_centres: PhaseCentres,

    pub site: ObservingSite,

    /// Rotate visibilities to the new phase centres?
    pub rephase: bool,
}

/// Something that can run subband jobs. Implementors must be usable from
/// several pool threads at once.
pub trait SubbandWorker: Sync {
    /// Run the job to completion. Implementors should give up as soon as
    /// practical once `cancel` is set.
    fn run(&self, job: &SubbandJob, cancel: &AtomicCell<bool>) -> Result<(), WriteError>;
}

/// Read a raw subband, put it on the shared phase centre(s), recompute its
/// geometry and write it as a part.
pub fn convert_subband(job: &SubbandJob) -> Result<(), WriteError> {
    debug!("Converting {} ({})", job.input.display(), job.code);
    let reader = UvfitsReader::new(&job.input)?;
    let mut dataset = reader.read(&job.antennas)?;

    let phase_centres = &job.phase_centres;
    if let Some(t) = dataset
        .timestamps
        .iter()
        .find(|t| phase_centres.field_for_time(t.to_gpst_seconds()).is_none())
    {
        return Err(WriteError::NoFieldForTime {
            input: job.input.clone(),
            gps: t.to_gpst_seconds(),
        });
    }
    dataset.assign_fields(phase_centres.fields().to_vec(), |t| {
        phase_centres
            .field_for_time(t.to_gpst_seconds())
            .unwrap_or(0) as u32
    });

    update_geometry(&mut dataset, &job.site, job.rephase)?;
    write_container(&job.part, &dataset)?;
    trace!("Wrote {}", job.part.display());
    Ok(())
}

/// Runs jobs on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessWorker;

impl SubbandWorker for InProcessWorker {
    fn run(&self, job: &SubbandJob, cancel: &AtomicCell<bool>) -> Result<(), WriteError> {
        if cancel.load() {
            return Err(WriteError::Cancelled {
                code: job.code.clone(),
            });
        }
        convert_subband(job)
    }
}

/// Runs each job in a child process: an executable that accepts the hidden
/// `write-subband` subcommand and reads the job from its stdin. The child's
/// exit status and stderr are the result.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    exe: PathBuf,
}

impl ProcessWorker {
    pub fn new(exe: PathBuf) -> ProcessWorker {
        ProcessWorker { exe }
    }

    /// Use the currently-running executable.
    pub fn current_exe() -> Result<ProcessWorker, WriteError> {
        let exe = std::env::current_exe().map_err(WriteError::CurrentExe)?;
        Ok(ProcessWorker { exe })
    }
}

impl SubbandWorker for ProcessWorker {
    fn run(&self, job: &SubbandJob, cancel: &AtomicCell<bool>) -> Result<(), WriteError> {
        if cancel.load() {
            return Err(WriteError::Cancelled {
                code: job.code.clone(),
            });
        }

        let mut child = Command::new(&self.exe)
            .arg("write-subband")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| WriteError::Spawn {
                exe: self.exe.clone(),
                err,
            })?;
        trace!("Started worker {} for {}", child.id(), job.code);

        // Closing stdin tells the child the whole job has arrived.
        if let Some(mut stdin) = child.stdin.take() {
            let sent = serde_json::to_vec(job)
                .map_err(|e| e.to_string())
                .and_then(|bytes| stdin.write_all(&bytes).map_err(|e| e.to_string()));
            if let Err(err) = sent {
                let _ = child.kill();
                let _ = child.wait();
                return Err(WriteError::SendJob {
                    code: job.code.clone(),
                    err,
                });
            }
        }

        // Drain stderr on another thread so that a chatty child can't block.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut s = String::new();
                let _ = stderr.read_to_string(&mut s);
                s
            })
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => (),
                Err(err) => {
                    let _ = child.kill();
                    return Err(WriteError::WorkerIO {
                        code: job.code.clone(),
                        err,
                    });
                }
            }
            if cancel.load() {
                debug!("Killing the {} worker", job.code);
                let _ = child.kill();
                let _ = child.wait();
                return Err(WriteError::Cancelled {
                    code: job.code.clone(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(WriteError::WorkerFailed {
                code: job.code.clone(),
                input: job.input.clone(),
                status: status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none (killed by a signal)".to_string()),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

/// The worker side of [`ProcessWorker`]: read a job from `input` and run it.
pub fn run_job_from_reader<R: Read>(input: R) -> Result<(), WriteError> {
    let job: SubbandJob = serde_json::from_reader(input).map_err(WriteError::DecodeJob)?;
    convert_subband(&job)
}
