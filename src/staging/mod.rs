// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Choosing where a group is written, and moving the result into place.
//!
//! Every group gets its own uniquely-named work directory, either on the
//! ephemeral (RAM-backed) filesystem or hidden next to the final output. Parts
//! and the concatenated container are written there; only a complete
//! container is moved to the destination. Whatever is left in a work
//! directory is removed when its [`Workspace`] is dropped.

mod error;
#[cfg(test)]
mod tests;

pub use error::StagingError;

use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use sysinfo::Disks;
use uuid::Uuid;

use crate::{config::StagingConfig, constants::CONTAINER_EXTENSION};

/// The name of the directory made under the staging root.
const STAGING_SUBDIR: &str = "subband-convert";

/// Reports free space on filesystems. One is shared by groups being
/// converted at the same time.
pub trait SpaceGauge: Sync {
    /// The bytes available to us on the filesystem holding `path`, if known.
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

/// Free space according to the OS's list of mounted disks. The disk with the
/// longest mount point that prefixes the path is the one used.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoGauge;

impl SpaceGauge for SysinfoGauge {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        let path = path.canonicalize().ok()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Why a group isn't staged.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectReason {
    Disabled,
    NotWritable,
    UnknownSpace,
    NotEnoughSpace { available: u64, needed: u64 },
}

impl std::fmt::Display for DirectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectReason::Disabled => write!(f, "staging is disabled"),
            DirectReason::NotWritable => write!(f, "the staging area isn't writable"),
            DirectReason::UnknownSpace => {
                write!(f, "the staging area's free space is unknown")
            }
            DirectReason::NotEnoughSpace { available, needed } => write!(
                f,
                "the staging area has {available} bytes free but {needed} are wanted"
            ),
        }
    }
}

/// A group's work directory and where its container ends up.
#[derive(Debug)]
pub struct Workspace {
    key: String,
    work_dir: PathBuf,
    destination: PathBuf,

    /// `None` if the work directory is on the ephemeral filesystem.
    direct_reason: Option<DirectReason>,
}

impl Workspace {
    /// Decide where the group `key` is written. `destination` is the final
    /// container path, and `estimated_bytes` the expected size of the data.
    ///
    /// Staging only happens if it's enabled, the staging area is writable and
    /// has at least `safety_factor` times the estimated size free. Otherwise,
    /// the work directory is a hidden sibling of `destination`; that isn't an
    /// error. An error is only returned if no work directory can be made at
    /// all.
    pub fn new(
        key: &str,
        destination: &Path,
        estimated_bytes: u64,
        config: &StagingConfig,
        gauge: &dyn SpaceGauge,
    ) -> Result<Workspace, StagingError> {
        let id = short_id();

        let direct_reason = if config.enabled {
            match try_stage(key, &id, estimated_bytes, config, gauge) {
                Ok(work_dir) => {
                    debug!("Group {key}: staging in {}", work_dir.display());
                    return Ok(Workspace {
                        key: key.to_string(),
                        work_dir,
                        destination: destination.to_path_buf(),
                        direct_reason: None,
                    });
                }
                Err(reason) => reason,
            }
        } else {
            DirectReason::Disabled
        };
        debug!("Group {key}: writing directly, because {direct_reason}");

        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let work_dir = parent.join(format!(".{key}.work_{id}"));
        std::fs::create_dir_all(&work_dir).map_err(|err| StagingError::CreateWorkDir {
            dir: work_dir.clone(),
            err,
        })?;
        Ok(Workspace {
            key: key.to_string(),
            work_dir,
            destination: destination.to_path_buf(),
            direct_reason: Some(direct_reason),
        })
    }

    pub fn is_staged(&self) -> bool {
        self.direct_reason.is_none()
    }

    pub fn direct_reason(&self) -> Option<&DirectReason> {
        self.direct_reason.as_ref()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Where the part for a subband code is written.
    pub fn part_path(&self, code: &str) -> PathBuf {
        self.work_dir.join(format!("{code}.part.{CONTAINER_EXTENSION}"))
    }

    /// Where the concatenated container is written before finalising.
    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.{CONTAINER_EXTENSION}", self.key))
    }

    /// Move the concatenated container to its destination and remove the work
    /// directory. The destination never holds a partial container: either
    /// the move is a single rename, or the container is copied next to the
    /// destination first and then renamed into place. An existing destination
    /// is never replaced.
    pub fn finalise(self) -> Result<PathBuf, StagingError> {
        let output = self.output_path();
        if !output.is_dir() {
            return Err(StagingError::NothingToFinalise(output));
        }
        if self.destination.exists() {
            return Err(StagingError::DestinationExists(self.destination.clone()));
        }
        if let Some(parent) = self.destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| StagingError::CreateWorkDir {
                    dir: parent.to_path_buf(),
                    err,
                })?;
            }
        }

        match std::fs::rename(&output, &self.destination) {
            Ok(()) => trace!("Renamed {} into place", output.display()),
            // The staging area is on another filesystem.
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                debug!(
                    "{} is on another filesystem; copying it into place",
                    output.display()
                );
                copy_into_place(&output, &self.destination)?;
            }
            Err(err) => {
                return Err(StagingError::Move {
                    from: output,
                    to: self.destination.clone(),
                    err,
                })
            }
        }
        Ok(self.destination.clone())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.work_dir.exists() {
            trace!("Removing {}", self.work_dir.display());
            if let Err(e) = std::fs::remove_dir_all(&self.work_dir) {
                warn!("Couldn't remove {}: {e}", self.work_dir.display());
            }
        }
    }
}

/// Make a staging directory for this group, or say why not.
fn try_stage(
    key: &str,
    id: &str,
    estimated_bytes: u64,
    config: &StagingConfig,
    gauge: &dyn SpaceGauge,
) -> Result<PathBuf, DirectReason> {
    if !config.path.is_dir() {
        return Err(DirectReason::NotWritable);
    }
    let needed = (estimated_bytes as f64 * config.safety_factor).ceil() as u64;
    let available = gauge
        .available_bytes(&config.path)
        .ok_or(DirectReason::UnknownSpace)?;
    if available < needed {
        return Err(DirectReason::NotEnoughSpace { available, needed });
    }

    let dir = config.path.join(STAGING_SUBDIR).join(format!("{key}_{id}"));
    match std::fs::create_dir_all(&dir) {
        Ok(()) => Ok(dir),
        Err(e) => {
            debug!("Couldn't create {}: {e}", dir.display());
            Err(DirectReason::NotWritable)
        }
    }
}

/// The first 8 characters of a random UUID.
fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Copy a directory tree to a hidden sibling of `dest`, rename it to `dest`,
/// then remove the original. If anything fails, the copy is removed and
/// `dest` is untouched.
pub(crate) fn copy_into_place(src: &Path, dest: &Path) -> Result<(), StagingError> {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let partial = dest.with_file_name(format!(".{file_name}.partial_{}", short_id()));

    let copied = copy_dir_all(src, &partial).and_then(|()| {
        std::fs::rename(&partial, dest).map_err(|err| StagingError::Move {
            from: partial.clone(),
            to: dest.to_path_buf(),
            err,
        })
    });
    if let Err(e) = copied {
        if partial.exists() {
            let _ = std::fs::remove_dir_all(&partial);
        }
        return Err(e);
    }

    if let Err(e) = std::fs::remove_dir_all(src) {
        warn!("Couldn't remove the staged {}: {e}", src.display());
    }
    Ok(())
}

fn copy_dir_all(src: &Path, dest: &Path) -> Result<(), StagingError> {
    let copy_err = |err| StagingError::Copy {
        from: src.to_path_buf(),
        to: dest.to_path_buf(),
        err,
    };
    std::fs::create_dir_all(dest).map_err(copy_err)?;
    for entry in std::fs::read_dir(src).map_err(copy_err)? {
        let entry = entry.map_err(copy_err)?;
        let target = dest.join(entry.file_name());
        if entry.file_type().map_err(copy_err)?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|err| StagingError::Copy {
                from: entry.path(),
                to: target.clone(),
                err,
            })?;
        }
    }
    Ok(())
}
