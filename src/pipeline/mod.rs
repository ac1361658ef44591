// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Converting discovered groups into containers.
//!
//! Each group goes through its own state machine:
//!
//! ```text
//! DISCOVERED -> PHASE_COMPUTED -> GEOMETRY_UPDATED -> WRITTEN -> CONCATENATED
//!            -> STAGED_OR_DIRECT -> FINALIZED -> VALIDATED -> DONE
//! ```
//!
//! Any stage can end in FAILED, after its interim outputs are removed. A
//! group whose valid container already exists is SKIPPED_EXISTING, and
//! incomplete clusters never get here (they are REJECTED_INCOMPLETE at
//! discovery). Groups don't affect each other.

mod error;

pub use error::{GroupError, GroupFailure};

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;
use strum_macros::{Display, EnumIter};

use crate::{
    antennas::AntennaLayout,
    config::ConversionConfig,
    discovery::{Discovery, SubbandGroup},
    io::{container::container_path, read::UvfitsReader},
    phase_centre::compute_phase_centres,
    staging::{SpaceGauge, Workspace},
    validation::{validate_container, Expectations, ValidationReport, ValidationThresholds},
    writer::{write_group, GroupWriteError, RetryPolicy, SubbandJob, SubbandWorker},
};

/// The states of a group's conversion.
#[derive(Debug, Display, EnumIter, Clone, Copy, PartialEq, Eq)]
pub enum GroupStage {
    #[strum(serialize = "DISCOVERED")]
    Discovered,

    #[strum(serialize = "REJECTED_INCOMPLETE")]
    RejectedIncomplete,

    #[strum(serialize = "SKIPPED_EXISTING")]
    SkippedExisting,

    #[strum(serialize = "PHASE_COMPUTED")]
    PhaseComputed,

    #[strum(serialize = "GEOMETRY_UPDATED")]
    GeometryUpdated,

    #[strum(serialize = "WRITTEN")]
    Written,

    #[strum(serialize = "CONCATENATED")]
    Concatenated,

    #[strum(serialize = "STAGED_OR_DIRECT")]
    StagedOrDirect,

    #[strum(serialize = "FINALIZED")]
    Finalized,

    #[strum(serialize = "VALIDATED")]
    Validated,

    #[strum(serialize = "DONE")]
    Done,

    #[strum(serialize = "FAILED")]
    Failed,
}

/// How a group's conversion ended.
#[derive(Debug)]
pub enum GroupOutcome {
    Converted {
        key: String,
        path: PathBuf,
        report: ValidationReport,
    },
    SkippedExisting {
        key: String,
        path: PathBuf,
    },
    Failed(GroupError),
}

/// The counts of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub found: usize,
    pub converted: usize,
    pub skipped_incomplete: usize,
    pub skipped_existing: usize,
    pub failed: usize,

    /// Why each failed group failed.
    pub failures: Vec<GroupError>,
}

impl BatchSummary {
    pub fn log(&self) {
        info!(
            "Groups found: {}, converted: {}, skipped (incomplete): {}, skipped (existing): {}, failed: {}",
            self.found, self.converted, self.skipped_incomplete, self.skipped_existing, self.failed
        );
        for failure in &self.failures {
            warn!("{failure}");
        }
    }
}

/// Converts groups with a fixed configuration.
pub struct Pipeline<'a> {
    config: &'a ConversionConfig,
    output_dir: PathBuf,
    worker: &'a dyn SubbandWorker,
    gauge: &'a dyn SpaceGauge,
}

/// Tracks where a group is, for errors and logging.
struct GroupProgress<'k> {
    key: &'k str,
    stage: GroupStage,
}

impl<'k> GroupProgress<'k> {
    fn new(key: &'k str) -> GroupProgress<'k> {
        debug!("Group {key}: {}", GroupStage::Discovered);
        GroupProgress {
            key,
            stage: GroupStage::Discovered,
        }
    }

    fn advance(&mut self, stage: GroupStage) {
        debug!("Group {}: {} -> {stage}", self.key, self.stage);
        self.stage = stage;
    }

    /// The error for a failure that happens while moving to `stage`.
    fn fail<E: Into<GroupFailure>>(&self, stage: GroupStage, e: E) -> GroupError {
        debug!("Group {}: {} -> {}", self.key, self.stage, GroupStage::Failed);
        GroupError {
            key: self.key.to_string(),
            stage,
            source: e.into(),
        }
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a ConversionConfig,
        output_dir: &Path,
        worker: &'a dyn SubbandWorker,
        gauge: &'a dyn SpaceGauge,
    ) -> Pipeline<'a> {
        Pipeline {
            config,
            output_dir: output_dir.to_path_buf(),
            worker,
            gauge,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn thresholds(&self) -> ValidationThresholds {
        ValidationThresholds::from(self.config)
    }

    /// Convert every group of a discovery. Failures are collected, never
    /// propagated.
    pub fn run(&self, discovery: &Discovery) -> BatchSummary {
        for cluster in &discovery.incomplete {
            debug!("Group {}: {}", cluster.key, GroupStage::RejectedIncomplete);
        }

        let num_threads = self.config.max_concurrent_groups;
        let outcomes: Vec<GroupOutcome> = if num_threads > 1 && discovery.groups.len() > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("group-{i}"))
                .build()
            {
                Ok(pool) => pool.install(|| {
                    discovery
                        .groups
                        .par_iter()
                        .map(|group| self.convert_group(group))
                        .collect()
                }),
                Err(e) => {
                    warn!("Couldn't make a thread pool for groups ({e}); converting them one at a time");
                    discovery
                        .groups
                        .iter()
                        .map(|group| self.convert_group(group))
                        .collect()
                }
            }
        } else {
            discovery
                .groups
                .iter()
                .map(|group| self.convert_group(group))
                .collect()
        };

        let mut summary = BatchSummary {
            found: discovery.groups.len() + discovery.incomplete.len(),
            skipped_incomplete: discovery.incomplete.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                GroupOutcome::Converted { .. } => summary.converted += 1,
                GroupOutcome::SkippedExisting { .. } => summary.skipped_existing += 1,
                GroupOutcome::Failed(e) => {
                    summary.failed += 1;
                    summary.failures.push(e);
                }
            }
        }
        summary
    }

    /// Take one group all the way through to a validated container.
    pub fn convert_group(&self, group: &SubbandGroup) -> GroupOutcome {
        let key = group.key.as_str();
        let destination = container_path(&self.output_dir, key);
        let mut progress = GroupProgress::new(key);

        if destination.exists() {
            if !self.config.skip_existing {
                return GroupOutcome::Failed(progress.fail(
                    GroupStage::Discovered,
                    GroupFailure::ExistingOutput(destination),
                ));
            }
            let report = validate_container(
                &destination,
                &self.thresholds(),
                &Expectations {
                    num_subbands: Some(group.files.len()),
                    ..Default::default()
                },
            );
            if report.valid {
                info!("Group {key}: {} is already valid; skipping", destination.display());
                progress.advance(GroupStage::SkippedExisting);
                return GroupOutcome::SkippedExisting {
                    key: key.to_string(),
                    path: destination,
                };
            }
            report.alert(key);
            return GroupOutcome::Failed(progress.fail(
                GroupStage::Validated,
                GroupFailure::ExistingInvalid(destination),
            ));
        }

        match self.convert_new_group(group, &destination, &mut progress) {
            Ok(report) => {
                progress.advance(GroupStage::Done);
                info!("Group {key}: wrote {}", destination.display());
                GroupOutcome::Converted {
                    key: key.to_string(),
                    path: destination,
                    report,
                }
            }
            Err(e) => GroupOutcome::Failed(e),
        }
    }

    fn convert_new_group(
        &self,
        group: &SubbandGroup,
        destination: &Path,
        progress: &mut GroupProgress,
    ) -> Result<ValidationReport, GroupError> {
        let config = self.config;
        let site = config.site();
        let key = group.key.as_str();

        // Subbands in ascending frequency order.
        let files: Vec<_> = config
            .codes_in_freq_order()
            .into_iter()
            .filter_map(|code| group.files.iter().find(|f| f.code == code))
            .collect();
        if files.is_empty() || files.len() != group.files.len() {
            return Err(progress.fail(
                GroupStage::Discovered,
                GroupFailure::UnexpectedCodes {
                    expected: config.subband_codes.len(),
                    got: group.files.iter().map(|f| f.code.clone()).collect(),
                },
            ));
        }
        let readers = files
            .iter()
            .map(|f| UvfitsReader::new(&f.path))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| progress.fail(GroupStage::PhaseComputed, e))?;
        let first = &readers[0];

        let antennas = match config.antenna_file.as_deref() {
            Some(file) => AntennaLayout::read_csv(file, site.array_position)
                .map_err(|e| progress.fail(GroupStage::PhaseComputed, e))?,
            None => first
                .read_antennas(Some(site.array_position))
                .map_err(|e| progress.fail(GroupStage::PhaseComputed, e))?,
        };
        let subband_times = readers
            .iter()
            .map(|r| r.read_timestamps())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| progress.fail(GroupStage::PhaseComputed, e))?;
        let phase_centres = compute_phase_centres(
            key,
            first.header.pointing_dec_rad,
            &subband_times,
            config.phase_centre_mode,
            &site,
        )
        .map_err(|e| progress.fail(GroupStage::PhaseComputed, e))?;
        progress.advance(GroupStage::PhaseComputed);

        let workspace = Workspace::new(
            key,
            destination,
            group.total_size(),
            &config.staging,
            self.gauge,
        )
        .map_err(|e| progress.fail(GroupStage::StagedOrDirect, e))?;
        let jobs: Vec<SubbandJob> = files
            .iter()
            .enumerate()
            .map(|(index, file)| SubbandJob {
                index,
                code: file.code.clone(),
                input: file.path.clone(),
                part: workspace.part_path(&file.code),
                antennas: antennas.clone(),
                phase_centres: phase_centres.clone(),
                site,
                rephase: config.rephase,
            })
            .collect();

        let retry_policy = RetryPolicy {
            attempts: config.concat_retries,
            initial_delay: std::time::Duration::from_millis(config.concat_retry_delay_ms),
        };
        let merged = write_group(
            &jobs,
            self.worker,
            config.max_workers,
            &workspace.output_path(),
            retry_policy,
        )
        .map_err(|e| match e {
            GroupWriteError::Write(e) => progress.fail(GroupStage::Written, e),
            GroupWriteError::Concat(e) => progress.fail(GroupStage::Concatenated, e),
        })?;
        progress.advance(GroupStage::GeometryUpdated);
        progress.advance(GroupStage::Written);
        progress.advance(GroupStage::Concatenated);
        progress.advance(GroupStage::StagedOrDirect);

        workspace
            .finalise()
            .map_err(|e| progress.fail(GroupStage::Finalized, e))?;
        progress.advance(GroupStage::Finalized);

        let expected_channels = readers.iter().map(|r| r.header.freqs_hz.len()).sum();
        let report = validate_container(
            destination,
            &self.thresholds(),
            &Expectations {
                num_subbands: Some(config.subband_codes.len()),
                num_channels: Some(expected_channels),
                num_rows: Some(merged.num_rows()),
            },
        );
        if !report.valid {
            report.alert(key);
            return Err(progress.fail(
                GroupStage::Validated,
                GroupFailure::Invalid(report.errors),
            ));
        }
        progress.advance(GroupStage::Validated);
        Ok(report)
    }
}
