// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to export converted visibilities to other formats.

mod error;
pub use error::{FileWriteError, VisWriteError};

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use hifitime::Duration;
use itertools::Itertools;
use log::{debug, trace};
use marlu::{
    History, MeasurementSetWriter, ObsContext as MarluObsContext, UvfitsWriter, VisContext,
    VisWrite,
};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use vec1::Vec1;

use crate::{cli::Warn, dataset::VisibilityDataset};

#[derive(Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq)]
/// All write-supported visibility formats.
pub enum VisOutputType {
    #[strum(serialize = "uvfits")]
    Uvfits,
    #[strum(serialize = "ms")]
    MeasurementSet,
}

lazy_static::lazy_static! {
    pub(crate) static ref VIS_OUTPUT_EXTENSIONS: String = VisOutputType::iter().join(", ");
}

impl VisOutputType {
    /// Work out the output type from a file's extension.
    pub fn from_path(path: &Path) -> Result<VisOutputType, VisWriteError> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.to_lowercase().parse().ok())
            .ok_or_else(|| VisWriteError::InvalidOutputFormat(path.to_path_buf()))
    }
}

/// Write a whole dataset to each of the outputs with `marlu`'s writers.
///
/// The dataset must have a single phase centre, regular timestamps and a
/// regular, ascending frequency axis. `marlu` computes its own UVWs for the
/// phase centre. These match the UVWs of a converted container when `precess`
/// is the same as the conversion's precession setting.
///
/// # Returns
///
/// * A neatly-formatted string reporting all of the files that got written out.
pub fn export_dataset(
    dataset: &VisibilityDataset,
    outputs: &Vec1<(PathBuf, VisOutputType)>,
    dut1: Duration,
    precess: bool,
) -> Result<String, VisWriteError> {
    dataset.check()?;
    let phase_centre = match dataset.phase_centres.as_slice() {
        [pc] => pc,
        pcs => return Err(VisWriteError::MultipleFields(pcs.len())),
    };

    // Ensure our timestamps are regularly spaced in terms of the integration
    // time.
    let first_timestamp = dataset.timestamps[0];
    let time_res = dataset.int_time;
    for &t in &dataset.timestamps {
        let diff = (t - first_timestamp).total_nanoseconds();
        // Allow for timestamps that were rounded to the nearest millisecond.
        let remainder = diff.rem_euclid(time_res.total_nanoseconds());
        let slop = 1_000_000;
        if remainder > slop && time_res.total_nanoseconds() - remainder > slop {
            return Err(VisWriteError::IrregularTimestamps {
                first: first_timestamp.to_gpst_seconds(),
                bad: t.to_gpst_seconds(),
                time_res: time_res.to_seconds(),
            });
        }
    }

    // Output formats describe the frequency axis with a start and a step.
    let first_freq = dataset.freqs_hz[0];
    let freq_res = dataset.freq_res_hz;
    for (chan, &freq) in dataset.freqs_hz.iter().enumerate() {
        let expected = first_freq + chan as f64 * freq_res;
        if (freq - expected).abs() > freq_res * 1e-3 {
            return Err(VisWriteError::IrregularFrequencies {
                chan,
                freq,
                first: first_freq,
                freq_res,
            });
        }
    }

    let vis_ctx = VisContext {
        num_sel_timesteps: dataset.num_timesteps(),
        // Marlu wants the leading edge of the first integration.
        start_timestamp: first_timestamp - time_res / 2,
        int_time: time_res,
        num_sel_chans: dataset.num_channels(),
        start_freq_hz: first_freq,
        freq_resolution_hz: freq_res,
        sel_baselines: dataset.baselines.clone(),
        avg_time: 1,
        avg_freq: 1,
        num_vis_pols: 4,
    };

    let array_pos = dataset.antennas.array_position;
    let (s_lat, c_lat) = array_pos.latitude_rad.sin_cos();
    let last_timestamp = dataset.timestamps[dataset.num_timesteps() - 1];
    let marlu_obs_ctx = MarluObsContext {
        sched_start_timestamp: vis_ctx.start_timestamp,
        sched_duration: last_timestamp + time_res / 2 - vis_ctx.start_timestamp,
        name: dataset.obs_name.clone(),
        phase_centre: phase_centre.radec,
        pointing_centre: None,
        array_pos,
        ant_positions_enh: dataset
            .antennas
            .positions
            .iter()
            .map(|xyz| xyz.to_enh_inner(s_lat, c_lat))
            .collect(),
        ant_names: dataset.antennas.names.clone(),
        field_name: Some(phase_centre.name.clone()),
        project_id: None,
        observer: None,
    };

    // Prepare history for the output vis files. It's possible that the
    // command-line call has invalid UTF-8. So use args_os and attempt to
    // convert to UTF-8 strings. If there are problems on the way, don't bother
    // trying to write the CMDLINE key.
    let cmd_line = std::env::args_os()
        .map(|a| a.into_string())
        .collect::<Result<Vec<String>, _>>()
        .map(|v| v.join(" "))
        .ok();
    let history = History {
        application: Some("subband-convert"),
        cmd_line: cmd_line.as_deref(),
        message: None,
    };

    for (output, vis_type) in outputs {
        debug!("Setting up {} ({vis_type})", output.display());
        let mut vis_writer: Box<dyn VisWrite> = match vis_type {
            VisOutputType::Uvfits => {
                let uvfits = UvfitsWriter::from_marlu(
                    output,
                    &vis_ctx,
                    array_pos,
                    phase_centre.radec,
                    dut1,
                    dataset.obs_name.as_deref(),
                    dataset.antennas.names.clone(),
                    dataset.antennas.positions.clone(),
                    precess,
                    Some(&history),
                )?;
                Box::new(uvfits)
            }

            VisOutputType::MeasurementSet => {
                let ms = MeasurementSetWriter::new(
                    output,
                    phase_centre.radec,
                    array_pos,
                    dataset.antennas.positions.clone(),
                    dut1,
                    precess,
                );
                ms.initialize(&vis_ctx, &marlu_obs_ctx, Some(&history))?;
                Box::new(ms)
            }
        };

        trace!("Writing {} rows", dataset.num_rows());
        vis_writer.write_vis(dataset.vis.view(), dataset.weights.view(), &vis_ctx)?;
        vis_writer.finalise()?;
    }
    debug!("Finished writing");

    let output_vis_str = if outputs.len() == 1 {
        format!("Visibilities written to {}", outputs.first().0.display())
    } else {
        format!(
            "Visibilities written to: {}",
            outputs.iter().map(|(o, _)| o.display()).join(", ")
        )
    };
    Ok(output_vis_str)
}

/// Check that `path` could be written to without touching it. Missing parent
/// directories are created. An existing file or directory is only a warning,
/// because exporting replaces it.
pub fn can_write_to_file(path: &Path) -> Result<(), FileWriteError> {
    trace!("Testing whether we can write to {}", path.display());
    let existed = if path.is_dir() {
        check_dir_writable(path)?;
        true
    } else {
        check_file_writable(path)?
    };
    if existed {
        format!("Will overwrite '{}'", path.display()).warn();
    }
    Ok(())
}

/// Permissions on directories say little, so every file inside is checked too.
fn check_dir_writable(dir: &Path) -> Result<(), FileWriteError> {
    if std::fs::metadata(dir)?.permissions().readonly() {
        return Err(FileWriteError::FileNotWritable {
            file: dir.display().to_string(),
        });
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            check_dir_writable(&path)?;
        } else if path.is_file() {
            check_file_writable(&path)?;
        }
    }
    Ok(())
}

/// Open `file` for writing without truncating it, and say whether it already
/// existed. A file created by the check is removed again.
fn check_file_writable(file: &Path) -> Result<bool, FileWriteError> {
    let existed = file.exists();
    let opened = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(file);
    match opened {
        Ok(_) => {
            if !existed {
                std::fs::remove_file(file)?;
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).map_err(|e| match e.kind() {
                    ErrorKind::PermissionDenied => {
                        FileWriteError::NewDirectory(parent.to_path_buf())
                    }
                    _ => FileWriteError::IO(e),
                })?;
            }
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(FileWriteError::FileNotWritable {
                file: file.display().to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    }
    Ok(existed)
}
