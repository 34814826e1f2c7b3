// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persisted per-subscription state: the episode index, the conditional
//! fetch cache and the subscription registry. Every artifact is keyed by the
//! subscription name.

mod cache;
mod index;
mod registry;

pub use cache::{CacheEntry, CacheKey, ConditionalCache};
pub use index::EpisodeIndex;
pub use registry::{SubscriptionRegistry, is_valid_name};

use std::path::Path;

use crate::error::StorageError;

/// Read a file, treating a missing file as `None`
fn read_optional(path: &Path) -> Result<Option<String>, StorageError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Write `content` next to `path` and rename it into place
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectoryFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let write_failed = |e: std::io::Error| StorageError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    std::fs::write(&tmp, content).map_err(write_failed)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        write_failed(e)
    })
}

/// Remove a file; a missing file is not an error
fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::DeleteFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
