// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Find raw subband files and regroup them into complete observations.
//!
//! Files are named `<timestamp>_<subband code>.<ext>`, but the timestamps of
//! the subbands of one observation jitter by a few seconds. Files are sorted
//! by time and swept: each unclaimed file anchors a cluster of all unclaimed
//! files within the tolerance of it, and the cluster becomes a group only if
//! it contains every expected subband code exactly once.

mod error;

pub use error::{DiscoveryDirError, DiscoveryError};

use std::{
    collections::{BTreeMap, HashSet},
    io::Read,
    path::{Path, PathBuf},
};

use chrono::{Datelike, NaiveDateTime, Timelike};
use hifitime::Epoch;
use log::{debug, trace};
use regex::Regex;
use serde::Serialize;

use crate::config::ConversionConfig;

lazy_static::lazy_static! {
    static ref FILE_NAME_REGEX: Regex =
        Regex::new(r"^(?P<timestamp>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?)_(?P<code>[^.]+)\.(?P<ext>.+)$")
            .expect("regex is valid");
}

/// The timestamp format used in file names.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A raw subband file that has a parseable name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubbandFile {
    pub path: PathBuf,

    /// The timestamp text exactly as it appears in the file name.
    pub timestamp_text: String,

    /// The timestamp as GPS seconds.
    pub gps_time: f64,

    pub code: String,

    /// Did the file pass the structural check (or was the check disabled)?
    pub valid: bool,
}

impl SubbandFile {
    pub fn epoch(&self) -> Epoch {
        Epoch::from_gpst_seconds(self.gps_time)
    }
}

/// A complete set of subband files for one observation.
#[derive(Debug, Clone, Serialize)]
pub struct SubbandGroup {
    /// The timestamp text of the earliest file; this names the output.
    pub key: String,

    /// Exactly one file per expected code, sorted by code.
    pub files: Vec<SubbandFile>,
}

impl SubbandGroup {
    /// The summed size of all files in the group \[bytes\].
    pub fn total_size(&self) -> u64 {
        self.files
            .iter()
            .filter_map(|f| std::fs::metadata(&f.path).ok())
            .map(|m| m.len())
            .sum()
    }

    /// The mean of the file-name timestamps.
    pub fn nominal_time(&self) -> Epoch {
        crate::misc::mean_epoch(self.files.iter().map(SubbandFile::epoch))
            .unwrap_or_else(|| Epoch::from_gpst_seconds(0.0))
    }
}

/// A cluster that didn't have exactly the expected codes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncompleteCluster {
    /// The timestamp text of the cluster's anchor file.
    pub key: String,
    pub present: Vec<String>,
    pub missing: Vec<String>,
    pub duplicated: Vec<String>,
}

/// An inclusive time window; either end may be open.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindow {
    pub start: Option<Epoch>,
    pub end: Option<Epoch>,
}

impl TimeWindow {
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<TimeWindow, DiscoveryDirError> {
        let parse = |s: &str| {
            parse_timestamp(s).ok_or_else(|| DiscoveryDirError::BadWindowTime(s.to_string()))
        };
        Ok(TimeWindow {
            start: start.map(parse).transpose()?,
            end: end.map(parse).transpose()?,
        })
    }

    pub fn contains(&self, t: Epoch) -> bool {
        self.start.map(|s| t >= s).unwrap_or(true) && self.end.map(|e| t <= e).unwrap_or(true)
    }
}

/// Everything discovery found.
#[derive(Debug, Default)]
pub struct Discovery {
    pub groups: Vec<SubbandGroup>,

    /// Clusters whose anchor file never made it into a group.
    pub incomplete: Vec<IncompleteCluster>,

    /// Files that were skipped, with the reason.
    pub skipped: Vec<DiscoveryError>,
}

/// Parse an ISO-8601 UTC timestamp without a time zone.
pub fn parse_timestamp(s: &str) -> Option<Epoch> {
    let dt = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()?;
    Some(Epoch::from_gregorian_utc(
        dt.year(),
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        dt.nanosecond(),
    ))
}

/// Parse a subband file name. The file's validity isn't checked.
pub fn parse_file_name(path: &Path) -> Result<SubbandFile, DiscoveryError> {
    let file_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| DiscoveryError::BadFileName(path.to_path_buf()))?;
    let captures = FILE_NAME_REGEX
        .captures(file_name)
        .ok_or_else(|| DiscoveryError::BadFileName(path.to_path_buf()))?;
    let timestamp_text = captures["timestamp"].to_string();
    let epoch = parse_timestamp(&timestamp_text).ok_or_else(|| DiscoveryError::BadTimestamp {
        path: path.to_path_buf(),
        timestamp: timestamp_text.clone(),
    })?;

    Ok(SubbandFile {
        path: path.to_path_buf(),
        timestamp_text,
        gps_time: epoch.to_gpst_seconds(),
        code: captures["code"].to_string(),
        valid: true,
    })
}

/// A cheap structural test: is this a non-empty regular file starting with a
/// FITS primary header?
pub fn looks_like_fits(path: &Path) -> Result<bool, std::io::Error> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() || metadata.len() == 0 {
        return Ok(false);
    }
    let mut magic = [0; 9];
    let mut f = std::fs::File::open(path)?;
    match f.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == b"SIMPLE  ="),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Scan `dir` (not recursively) for subband files and group them.
pub fn discover(
    dir: &Path,
    window: TimeWindow,
    config: &ConversionConfig,
) -> Result<Discovery, DiscoveryDirError> {
    if !dir.is_dir() {
        return Err(DiscoveryDirError::NotADirectory(dir.to_path_buf()));
    }
    let pattern = dir.join(format!("*.{}", config.extension()));
    let pattern = pattern.to_string_lossy();
    debug!("Looking for subband files with {pattern}");
    let paths = glob::glob(&pattern).map_err(|err| DiscoveryDirError::Pattern {
        dir: dir.to_path_buf(),
        err,
    })?;

    let expected: HashSet<&str> = config.subband_codes.iter().map(|s| s.as_str()).collect();
    let mut skipped = vec![];
    let mut candidates = vec![];
    for entry in paths {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                let path = e.path().to_path_buf();
                skipped.push(DiscoveryError::IO {
                    path,
                    err: e.into_error(),
                });
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let file = match parse_file_name(&path) {
            Ok(f) => f,
            Err(e) => {
                trace!("{e}");
                skipped.push(e);
                continue;
            }
        };
        if !window.contains(file.epoch()) {
            trace!("{} is outside the time window", path.display());
            continue;
        }
        if !expected.contains(file.code.as_str()) {
            skipped.push(DiscoveryError::UnknownCode {
                path,
                code: file.code,
            });
            continue;
        }
        if config.structural_checks {
            match looks_like_fits(&file.path) {
                Ok(true) => (),
                Ok(false) => {
                    skipped.push(DiscoveryError::NotFits(file.path));
                    continue;
                }
                Err(err) => {
                    skipped.push(DiscoveryError::IO {
                        path: file.path,
                        err,
                    });
                    continue;
                }
            }
        }
        candidates.push(file);
    }
    debug!(
        "Found {} candidate subband files ({} skipped)",
        candidates.len(),
        skipped.len()
    );

    let (groups, incomplete) = group_files(candidates, &config.subband_codes, config.tolerance_s);
    debug!(
        "Formed {} complete groups; {} incomplete clusters",
        groups.len(),
        incomplete.len()
    );
    Ok(Discovery {
        groups,
        incomplete,
        skipped,
    })
}

/// Group files by time. Each unclaimed file, in time order, anchors a cluster
/// of every unclaimed file within `tolerance_s` of it (either side). A cluster
/// becomes a group only if its codes are exactly `expected_codes`; otherwise
/// its files stay unclaimed and may join a later cluster. Groups are keyed by
/// their earliest file.
pub fn group_files(
    mut files: Vec<SubbandFile>,
    expected_codes: &[String],
    tolerance_s: f64,
) -> (Vec<SubbandGroup>, Vec<IncompleteCluster>) {
    files.sort_by(|a, b| {
        a.gps_time
            .total_cmp(&b.gps_time)
            .then_with(|| a.code.cmp(&b.code))
    });
    let expected: HashSet<&str> = expected_codes.iter().map(|s| s.as_str()).collect();

    let mut claimed = vec![false; files.len()];
    // Keyed by anchor index so that rejections are only reported for anchors
    // that never end up in a group.
    let mut rejected: BTreeMap<usize, IncompleteCluster> = BTreeMap::new();
    // The same set of files is only reported once.
    let mut rejected_member_sets: HashSet<Vec<usize>> = HashSet::new();
    let mut groups = vec![];
    for i_anchor in 0..files.len() {
        if claimed[i_anchor] {
            continue;
        }
        let anchor_time = files[i_anchor].gps_time;
        let lo = files.partition_point(|f| f.gps_time < anchor_time - tolerance_s);
        let hi = files.partition_point(|f| f.gps_time <= anchor_time + tolerance_s);
        let members: Vec<usize> = (lo..hi).filter(|&i| !claimed[i]).collect();

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for &i in &members {
            *counts.entry(files[i].code.as_str()).or_default() += 1;
        }
        let duplicated: Vec<String> = counts
            .iter()
            .filter(|(_, &n)| n > 1)
            .map(|(c, _)| c.to_string())
            .collect();
        let missing: Vec<String> = expected_codes
            .iter()
            .filter(|c| !counts.contains_key(c.as_str()))
            .cloned()
            .collect();
        let complete = duplicated.is_empty()
            && missing.is_empty()
            && counts.len() == expected.len()
            && counts.keys().all(|c| expected.contains(c));

        // `members` is sorted by time, so the first is the earliest.
        let key = files[members[0]].timestamp_text.clone();
        if complete {
            let mut group_files: Vec<SubbandFile> =
                members.iter().map(|&i| files[i].clone()).collect();
            group_files.sort_by(|a, b| a.code.cmp(&b.code));
            for &i in &members {
                claimed[i] = true;
                rejected.remove(&i);
            }
            trace!("Group {key} formed from {} files", members.len());
            groups.push(SubbandGroup {
                key,
                files: group_files,
            });
        } else if rejected_member_sets.insert(members) {
            trace!(
                "Cluster anchored at {} is incomplete (missing {missing:?}, duplicated {duplicated:?})",
                files[i_anchor].timestamp_text
            );
            rejected.insert(
                i_anchor,
                IncompleteCluster {
                    key,
                    present: counts.keys().map(|c| c.to_string()).collect(),
                    missing,
                    duplicated,
                },
            );
        }
    }

    (groups, rejected.into_values().collect())
}
