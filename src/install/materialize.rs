//! Archive materialization and target removal.
//!
//! A component blob is a gzip-compressed tar archive. [`extract`] stages it
//! under the project scratch directory, unpacks it, and moves the top-level
//! entries into the resolved target, merging into whatever is already there
//! and overwriting same-named entries. [`delete_target`] is the uninstall
//! side: remove the target, its sidecar marker, and any parent directories
//! the removal left empty.
//!
//! Staging lives inside the project tree so the final moves are renames on
//! one filesystem. Scratch state is torn down on every exit path.

use std::fs::{self, File};
use std::path::Path;

use flate2::read::GzDecoder;
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{KitbagError, Result};
use crate::paths::{self, ProjectPaths};

fn step_failed(target: &Path, step: &str, err: impl std::fmt::Display) -> KitbagError {
    KitbagError::Materialize {
        path: target.to_path_buf(),
        reason: format!("{step}: {err}"),
    }
}

/// Unpacks one blob into `target`.
///
/// A failed step reports [`KitbagError::Materialize`] naming the target and
/// the step; the target is only touched once the archive has unpacked
/// cleanly, so a corrupt blob leaves the tree as it was.
pub fn extract(project: &ProjectPaths, data: &[u8], target: &Path) -> Result<()> {
    let scratch = project.scratch_dir();
    fs::create_dir_all(&scratch)
        .map_err(|err| step_failed(target, "create scratch directory", err))?;
    let result = extract_via_scratch(&scratch, data, target);
    // only succeeds once nothing else is staged in it
    let _ = fs::remove_dir(&scratch);
    result
}

fn extract_via_scratch(scratch: &Path, data: &[u8], target: &Path) -> Result<()> {
    let archive_path = scratch.join(format!("{}.tar.gz", Uuid::new_v4()));
    fs::write(&archive_path, data).map_err(|err| step_failed(target, "write archive", err))?;
    let result = unpack_and_place(scratch, &archive_path, target);
    if let Err(err) = fs::remove_file(&archive_path) {
        warn!(
            "temporary archive {} left behind: {err}",
            archive_path.display()
        );
    }
    result
}

fn unpack_and_place(scratch: &Path, archive_path: &Path, target: &Path) -> Result<()> {
    let staging =
        TempDir::new_in(scratch).map_err(|err| step_failed(target, "create staging", err))?;
    let archive = File::open(archive_path).map_err(|err| step_failed(target, "open archive", err))?;
    tar::Archive::new(GzDecoder::new(archive))
        .unpack(staging.path())
        .map_err(|err| step_failed(target, "unpack archive", err))?;

    place_entries(staging.path(), target)?;
    flatten_single_file(target)?;
    debug!("materialized {}", target.display());
    Ok(())
}

/// Moves every top-level staged entry under `target`, replacing same-named
/// entries and leaving unrelated ones in place.
fn place_entries(staging: &Path, target: &Path) -> Result<()> {
    if target.is_file() {
        // a previous single-file install flattened the target; start over
        fs::remove_file(target).map_err(|err| step_failed(target, "replace flattened file", err))?;
    }
    fs::create_dir_all(target).map_err(|err| step_failed(target, "create target", err))?;

    let entries = fs::read_dir(staging).map_err(|err| step_failed(target, "list staging", err))?;
    for entry in entries {
        let entry = entry.map_err(|err| step_failed(target, "list staging", err))?;
        let dest = target.join(entry.file_name());
        remove_existing(&dest)?;
        fs::rename(entry.path(), &dest)
            .map_err(|err| step_failed(&dest, "move into place", err))?;
    }
    Ok(())
}

fn remove_existing(dest: &Path) -> Result<()> {
    if dest.is_dir() {
        fs::remove_dir_all(dest).map_err(|err| step_failed(dest, "clear old directory", err))?;
    } else if dest.symlink_metadata().is_ok() {
        fs::remove_file(dest).map_err(|err| step_failed(dest, "clear old file", err))?;
    }
    Ok(())
}

/// If `target` holds exactly one file and nothing else, the file takes the
/// target's place: a single-payload component installs as a plain file, not
/// a one-entry folder. The hoist goes through a uniquely named sibling so
/// the directory can be dropped before the file assumes its name.
fn flatten_single_file(target: &Path) -> Result<()> {
    if !target.is_dir() {
        return Ok(());
    }
    let mut entries = Vec::new();
    let listing = fs::read_dir(target).map_err(|err| step_failed(target, "list target", err))?;
    for entry in listing {
        entries.push(entry.map_err(|err| step_failed(target, "list target", err))?);
        if entries.len() > 1 {
            return Ok(());
        }
    }
    let [only] = entries.as_slice() else {
        return Ok(());
    };
    if !only.path().is_file() {
        return Ok(());
    }
    let Some(parent) = target.parent() else {
        return Ok(());
    };

    let staged = parent.join(format!("{}.hoist", Uuid::new_v4()));
    fs::rename(only.path(), &staged).map_err(|err| step_failed(target, "stage hoist", err))?;
    fs::remove_dir(target).map_err(|err| step_failed(target, "drop hoisted directory", err))?;
    fs::rename(&staged, target).map_err(|err| step_failed(target, "finish hoist", err))?;
    debug!("flattened {} to a single file", target.display());
    Ok(())
}

/// Removes an installed target (file or directory tree), its sidecar
/// marker, and any parents the removal emptied out, stopping at the first
/// non-empty directory or the project root. A target that is already gone
/// still gets its marker cleared.
pub fn delete_target(project: &ProjectPaths, target: &Path) -> Result<()> {
    if target.is_dir() {
        fs::remove_dir_all(target).map_err(|source| KitbagError::Delete {
            path: target.to_path_buf(),
            source,
        })?;
        debug!("removed directory {}", target.display());
    } else if target.symlink_metadata().is_ok() {
        fs::remove_file(target).map_err(|source| KitbagError::Delete {
            path: target.to_path_buf(),
            source,
        })?;
        debug!("removed file {}", target.display());
    }
    remove_marker(target);
    ascend_empty_parents(project, target);
    Ok(())
}

/// Clears the `.meta` sidecar next to `path`, if any. Best effort.
fn remove_marker(path: &Path) {
    let marker = paths::meta_marker(path);
    if marker.symlink_metadata().is_ok() {
        if let Err(err) = fs::remove_file(&marker) {
            warn!("marker {} not removed: {err}", marker.display());
        }
    }
}

/// Iterative leaf-to-root walk deleting directories the removal emptied,
/// each with its marker. Never leaves the project tree and never removes
/// the project root itself.
fn ascend_empty_parents(project: &ProjectPaths, target: &Path) {
    let mut current = target.parent();
    while let Some(dir) = current {
        if dir == project.root.as_path() || !dir.starts_with(&project.root) {
            break;
        }
        match fs::read_dir(dir) {
            Ok(mut listing) => {
                if listing.next().is_some() {
                    break;
                }
            }
            Err(_) => break,
        }
        if let Err(err) = fs::remove_dir(dir) {
            warn!("empty directory {} not removed: {err}", dir.display());
            break;
        }
        debug!("removed empty directory {}", dir.display());
        remove_marker(dir);
        current = dir.parent();
    }
}
