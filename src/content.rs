// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Filesystem housekeeping inside content directories.

use std::io;
use std::path::Path;

use tracing::debug;

use crate::episode::PARTIAL_SUFFIX;
use crate::error::StorageError;

/// Remove `.partial` leftovers of interrupted downloads to `destination`.
///
/// Only partial files of `destination` itself and of its `-N` collision
/// variants are touched; other files in the directory are left alone.
/// Returns the number of files removed.
pub fn cleanup_partial_files(destination: &Path) -> Result<usize, StorageError> {
    let (Some(dir), Some(stem)) = (
        destination.parent(),
        destination.file_stem().and_then(|s| s.to_str()),
    ) else {
        return Ok(0);
    };
    let ext = destination.extension().and_then(|e| e.to_str());

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(StorageError::ReadFailed {
                path: dir.to_path_buf(),
                source: e,
            });
        }
    };

    let mut cleaned = 0;
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::ReadFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let is_own_partial = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(PARTIAL_SUFFIX))
            .is_some_and(|name| is_collision_variant(name, stem, ext));

        if is_own_partial && path.is_file() && std::fs::remove_file(&path).is_ok() {
            debug!(path = %path.display(), "Removed partial download");
            cleaned += 1;
        }
    }

    Ok(cleaned)
}

/// Whether `name` is `<stem>.<ext>` or `<stem>-N.<ext>`
fn is_collision_variant(name: &str, stem: &str, ext: Option<&str>) -> bool {
    let base = match ext {
        Some(ext) => match name.strip_suffix(ext).and_then(|n| n.strip_suffix('.')) {
            Some(base) => base,
            None => return false,
        },
        None => name,
    };
    match base.strip_prefix(stem) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('-')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

/// Remove empty directories from `start` upward, staying inside `root`.
///
/// `root` itself is only removed when `include_root` is set. Stops at the
/// first directory that is not empty or cannot be removed.
pub fn prune_empty_dirs(start: &Path, root: &Path, include_root: bool) {
    let mut current = Some(start);

    while let Some(dir) = current {
        if !dir.starts_with(root) || (dir == root && !include_root) {
            break;
        }
        let is_empty = std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
        if !is_empty || std::fs::remove_dir(dir).is_err() {
            break;
        }
        debug!(path = %dir.display(), "Removed empty directory");
        if dir == root {
            break;
        }
        current = dir.parent();
    }
}

/// Delete a file; returns `false` if it was already gone
pub fn remove_file(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Move a file, creating the target directory. Falls back to copy and
/// delete when a plain rename is not possible (e.g. across filesystems).
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}
