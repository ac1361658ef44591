// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Writing all of a group's subbands in parallel, then concatenating them.
//!
//! Each subband becomes a "part" container written by a worker (normally a
//! child process). Parts are collected by their submission index, which is
//! their position in ascending frequency order, so the order in which
//! workers finish doesn't matter. If any worker fails, the remaining jobs are
//! cancelled and every part of the group is deleted before the failure is
//! returned.

mod concat;
mod error;
#[cfg(test)]
mod tests;
mod worker;

pub use concat::{concatenate_parts, concatenate_with_retry, merge_datasets, RetryPolicy};
pub use error::{ConcatError, WriteError};
pub use worker::{
    convert_subband, run_job_from_reader, InProcessWorker, ProcessWorker, SubbandJob,
    SubbandWorker,
};

use std::{
    path::{Path, PathBuf},
    thread::{self, ScopedJoinHandle},
};

use crossbeam_channel::bounded;
use crossbeam_utils::atomic::AtomicCell;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, trace, warn};
use scopeguard::defer_on_unwind;

use crate::{dataset::VisibilityDataset, io::container::read_container_header, PROGRESS_BARS};

/// What a finished part holds, from re-reading its header.
#[derive(Debug, Clone)]
pub struct PartSummary {
    /// The submission index (position in ascending frequency order).
    pub index: usize,
    pub code: String,
    pub path: PathBuf,
    pub num_rows: usize,
    pub num_channels: usize,
    pub first_freq_hz: f64,
    pub last_freq_hz: f64,
}

/// Run every job on a pool of `max_workers` threads, each driving one
/// worker at a time. The summaries are returned in submission-index order.
///
/// On failure, remaining jobs are cancelled, all parts are deleted and the
/// error of the lowest-indexed failed job is returned.
pub fn write_parts(
    jobs: &[SubbandJob],
    worker: &dyn SubbandWorker,
    max_workers: usize,
) -> Result<Vec<PartSummary>, WriteError> {
    let num_threads = max_workers.clamp(1, jobs.len().max(1));
    debug!("Writing {} parts with {num_threads} workers", jobs.len());

    let progress = ProgressBar::with_draw_target(
        Some(jobs.len() as _),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:18}: [{wide_bar:.blue}] {pos:2}/{len:2} subbands ({elapsed_precise}<{eta_precise})")
            .expect("template is valid")
            .progress_chars("=> "),
    )
    .with_message("Writing subbands");

    // Set as soon as any job fails; no new jobs start after that, and
    // running ones are abandoned.
    let cancel = AtomicCell::new(false);
    let (tx_job, rx_job) = bounded::<&SubbandJob>(num_threads);

    let mut results: Vec<(usize, Result<(), WriteError>)> = thread::scope(|scope| {
        let handles: Vec<ScopedJoinHandle<Vec<(usize, Result<(), WriteError>)>>> = (0
            ..num_threads)
            .map(|i_thread| {
                let rx_job = rx_job.clone();
                let cancel = &cancel;
                let progress = &progress;
                thread::Builder::new()
                    .name(format!("subband-writer-{i_thread}"))
                    .spawn_scoped(scope, move || {
                        // If a panic happens, update our atomic error.
                        defer_on_unwind! { cancel.store(true); }

                        let mut done = vec![];
                        for job in rx_job.iter() {
                            let result = if cancel.load() {
                                Err(WriteError::Cancelled {
                                    code: job.code.clone(),
                                })
                            } else {
                                worker.run(job, cancel)
                            };
                            match &result {
                                Ok(()) => progress.inc(1),
                                Err(WriteError::Cancelled { .. }) => (),
                                Err(e) => {
                                    warn!("{e}");
                                    cancel.store(true);
                                }
                            }
                            done.push((job.index, result));
                        }
                        done
                    })
                    .expect("OS can create threads")
            })
            .collect();
        drop(rx_job);

        for job in jobs {
            if cancel.load() {
                break;
            }
            // The receivers only hang up if every worker thread panicked.
            if tx_job.send(job).is_err() {
                break;
            }
        }
        drop(tx_job);

        handles
            .into_iter()
            .zip(0..)
            .flat_map(|(handle, i_thread)| match handle.join() {
                Ok(done) => done,
                Err(_) => {
                    warn!("Subband writer thread {i_thread} panicked");
                    vec![]
                }
            })
            .collect()
    });
    results.sort_unstable_by_key(|(index, _)| *index);

    // The lowest-indexed real failure wins. Failing that, a job whose result
    // is missing was lost to a panicking thread.
    let lost = jobs
        .iter()
        .filter(|job| {
            !results
                .iter()
                .any(|(index, r)| *index == job.index && r.is_ok())
        })
        .min_by_key(|job| job.index)
        .map(|job| WriteError::WorkerPanicked {
            code: job.code.clone(),
        });
    let first_failure = results
        .into_iter()
        .filter_map(|(_, r)| r.err())
        .find(|e| !matches!(e, WriteError::Cancelled { .. }))
        .or(lost);
    if let Some(e) = first_failure {
        progress.abandon_with_message("Failed");
        remove_parts(jobs);
        return Err(e);
    }
    progress.abandon_with_message("Finished subbands");

    // Re-read each part's header for its summary, in submission order.
    let mut summaries = Vec::with_capacity(jobs.len());
    let mut sorted_jobs: Vec<&SubbandJob> = jobs.iter().collect();
    sorted_jobs.sort_unstable_by_key(|job| job.index);
    for job in sorted_jobs {
        match read_container_header(&job.part) {
            Ok(header) => summaries.push(PartSummary {
                index: job.index,
                code: job.code.clone(),
                path: job.part.clone(),
                num_rows: header.main.num_rows,
                num_channels: header.main.num_channels,
                first_freq_hz: header
                    .spectral_window
                    .freqs_hz
                    .first()
                    .copied()
                    .unwrap_or_default(),
                last_freq_hz: header
                    .spectral_window
                    .freqs_hz
                    .last()
                    .copied()
                    .unwrap_or_default(),
            }),
            Err(e) => {
                remove_parts(jobs);
                return Err(e.into());
            }
        }
    }
    Ok(summaries)
}

/// Delete the parts of these jobs, whether or not they were finished.
pub fn remove_parts(jobs: &[SubbandJob]) {
    for job in jobs {
        remove_part(&job.part);
    }
}

fn remove_part(part: &Path) {
    if part.exists() {
        trace!("Removing {}", part.display());
        if let Err(e) = std::fs::remove_dir_all(part) {
            warn!("Couldn't remove {}: {e}", part.display());
        }
    }
}

/// Errors from [`write_group`]: either a part failed, or merging them did.
#[derive(thiserror::Error, Debug)]
pub enum GroupWriteError {
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Concat(#[from] ConcatError),
}

/// Write all of the parts, concatenate them into `output` and delete the
/// parts. Parts are deleted whether or not this succeeds.
pub fn write_group(
    jobs: &[SubbandJob],
    worker: &dyn SubbandWorker,
    max_workers: usize,
    output: &Path,
    retry_policy: RetryPolicy,
) -> Result<VisibilityDataset, GroupWriteError> {
    let parts = write_parts(jobs, worker, max_workers)?;
    let result = concatenate_with_retry(&parts, output, retry_policy);
    remove_parts(jobs);
    Ok(result?)
}
