// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Merging single-subband parts along the frequency axis.

use std::{path::Path, thread, time::Duration};

use log::{debug, warn};
use ndarray::{concatenate, prelude::*};

use super::{ConcatError, PartSummary};
use crate::{
    constants::{TIME_MATCH_TOLERANCE_S, UVW_MATCH_TOLERANCE_M},
    dataset::VisibilityDataset,
    io::container::{read_container, write_container, ContainerError},
};

/// Merge datasets (already in ascending frequency order) into one. Every
/// dataset must have the same rows, fields and UVWs as the first.
pub fn merge_datasets(
    parts: Vec<(&Path, VisibilityDataset)>,
) -> Result<VisibilityDataset, ConcatError> {
    let mut parts = parts.into_iter();
    let (first_path, mut merged) = parts.next().ok_or(ConcatError::NoParts)?;
    trace_part(first_path, &merged);
    let mut vis = vec![merged.vis.clone()];
    let mut weights = vec![merged.weights.clone()];

    for (path, part) in parts {
        trace_part(path, &part);
        check_same_rows(path, &merged, &part)?;
        let previous_hz = *merged
            .freqs_hz
            .last()
            .expect("datasets always have channels");
        let freq_hz = part.freqs_hz[0];
        if freq_hz <= previous_hz {
            return Err(ConcatError::NotAscending {
                part: path.to_path_buf(),
                freq_hz,
                previous_hz,
            });
        }
        merged.freqs_hz.extend_from_slice(&part.freqs_hz);
        merged.num_subbands += part.num_subbands;
        vis.push(part.vis);
        weights.push(part.weights);
    }

    let vis_views: Vec<_> = vis.iter().map(|v| v.view()).collect();
    let weight_views: Vec<_> = weights.iter().map(|w| w.view()).collect();
    let mismatch = |e: ndarray::ShapeError| ConcatError::GeometryMismatch {
        part: first_path.to_path_buf(),
        reason: e.to_string(),
    };
    merged.vis = concatenate(Axis(1), &vis_views).map_err(mismatch)?;
    merged.weights = concatenate(Axis(1), &weight_views).map_err(mismatch)?;
    if !merged.freqs_ascending() {
        return Err(ConcatError::GeometryMismatch {
            part: first_path.to_path_buf(),
            reason: "the merged frequencies aren't strictly ascending".to_string(),
        });
    }
    Ok(merged)
}

fn trace_part(path: &Path, part: &VisibilityDataset) {
    log::trace!(
        "{}: {} channels from {:.0} Hz",
        path.display(),
        part.num_channels(),
        part.freqs_hz.first().copied().unwrap_or_default()
    );
}

fn check_same_rows(
    path: &Path,
    first: &VisibilityDataset,
    part: &VisibilityDataset,
) -> Result<(), ConcatError> {
    let mismatch = |reason: String| {
        Err(ConcatError::GeometryMismatch {
            part: path.to_path_buf(),
            reason,
        })
    };

    if part.antennas.names != first.antennas.names {
        return mismatch("the antennas are different".to_string());
    }
    if part.baselines != first.baselines {
        return mismatch("the baselines are different".to_string());
    }
    if part.num_timesteps() != first.num_timesteps() {
        return mismatch(format!(
            "{} timesteps instead of {}",
            part.num_timesteps(),
            first.num_timesteps()
        ));
    }
    for (t1, t2) in first.timestamps.iter().zip(part.timestamps.iter()) {
        if (t1.to_gpst_seconds() - t2.to_gpst_seconds()).abs() > TIME_MATCH_TOLERANCE_S {
            return mismatch(format!(
                "timestamp GPS {} instead of {}",
                t2.to_gpst_seconds(),
                t1.to_gpst_seconds()
            ));
        }
    }
    if part.field_ids != first.field_ids {
        return mismatch("the rows have different field IDs".to_string());
    }
    if part.phase_centres.len() != first.phase_centres.len()
        || part
            .phase_centres
            .iter()
            .zip(first.phase_centres.iter())
            .any(|(a, b)| {
                a.name != b.name
                    || (a.radec.ra - b.radec.ra).abs() > 1e-12
                    || (a.radec.dec - b.radec.dec).abs() > 1e-12
            })
    {
        return mismatch("the phase centres are different".to_string());
    }

    match (first.uvws.as_ref(), part.uvws.as_ref()) {
        (Some(uvws1), Some(uvws2)) => {
            if let Some((i_time, i_bl)) = uvws1
                .indexed_iter()
                .zip(uvws2.iter())
                .find(|((_, a), b)| {
                    (a.u - b.u).abs() > UVW_MATCH_TOLERANCE_M
                        || (a.v - b.v).abs() > UVW_MATCH_TOLERANCE_M
                        || (a.w - b.w).abs() > UVW_MATCH_TOLERANCE_M
                })
                .map(|((index, _), _)| index)
            {
                return mismatch(format!(
                    "the UVWs of timestep {i_time} baseline {i_bl} are different"
                ));
            }
        }
        (None, None) => (),
        _ => return mismatch("only some parts have UVWs".to_string()),
    }

    Ok(())
}

/// Read the parts (in the given order), merge them and write the result as a
/// new container at `output`.
pub fn concatenate_parts(
    parts: &[PartSummary],
    output: &Path,
) -> Result<VisibilityDataset, ConcatError> {
    if parts.is_empty() {
        return Err(ConcatError::NoParts);
    }
    debug!(
        "Concatenating {} parts into {}",
        parts.len(),
        output.display()
    );
    let mut datasets = Vec::with_capacity(parts.len());
    for part in parts {
        datasets.push((part.path.as_path(), read_container(&part.path)?));
    }
    let merged = merge_datasets(datasets)?;
    write_container(output, &merged)?;
    Ok(merged)
}

/// How concatenation is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// The total number of attempts.
    pub attempts: usize,

    /// The delay before the first retry; it doubles for every further retry.
    pub initial_delay: Duration,
}

/// [`concatenate_parts`], retrying transient failures. Anything written to
/// `output` by a failed attempt is removed before trying again, and after the
/// final failure.
pub fn concatenate_with_retry(
    parts: &[PartSummary],
    output: &Path,
    policy: RetryPolicy,
) -> Result<VisibilityDataset, ConcatError> {
    concatenate_with_retry_inner(output, policy, || concatenate_parts(parts, output))
}

pub(super) fn concatenate_with_retry_inner<F>(
    output: &Path,
    policy: RetryPolicy,
    mut attempt_fn: F,
) -> Result<VisibilityDataset, ConcatError>
where
    F: FnMut() -> Result<VisibilityDataset, ConcatError>,
{
    // Anything at `output` after a failed attempt is then ours to remove.
    if output.exists() {
        return Err(ContainerError::Exists(output.to_path_buf()).into());
    }

    let attempts = policy.attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 1;
    loop {
        match attempt_fn() {
            Ok(merged) => return Ok(merged),
            Err(e) => {
                remove_partial_output(output);
                if !e.is_transient() {
                    return Err(e);
                }
                if attempt >= attempts {
                    return Err(ConcatError::RetriesExhausted {
                        attempts,
                        last: Box::new(e),
                    });
                }
                warn!(
                    "Concatenation attempt {attempt}/{attempts} failed ({e}); retrying in {:.1}s",
                    delay.as_secs_f64()
                );
                thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

fn remove_partial_output(output: &Path) {
    if output.exists() {
        if let Err(e) = std::fs::remove_dir_all(output) {
            warn!("Couldn't remove {}: {e}", output.display());
        }
    }
}
