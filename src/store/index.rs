// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::model::Episode;

use super::{read_optional, remove_if_exists, write_atomic};

/// Per-subscription episode lists, stored as `<dir>/<name>.json`.
///
/// The file for a subscription exists if and only if it has episodes.
#[derive(Debug, Clone)]
pub struct EpisodeIndex {
    dir: PathBuf,
}

impl EpisodeIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Episodes of `name`, empty if the subscription has no index yet
    pub fn load(&self, name: &str) -> Result<Vec<Episode>, StorageError> {
        let path = self.path(name);
        match read_optional(&path)? {
            None => Ok(Vec::new()),
            Some(content) => {
                serde_json::from_str(&content).map_err(|e| StorageError::JsonParseFailed {
                    path: path.clone(),
                    source: e,
                })
            }
        }
    }

    /// Persist the episode list; an empty list removes the index file
    pub fn save(&self, name: &str, episodes: &[Episode]) -> Result<(), StorageError> {
        if episodes.is_empty() {
            return self.delete(name);
        }
        let json = serde_json::to_string_pretty(episodes)?;
        write_atomic(&self.path(name), json.as_bytes())
    }

    pub fn delete(&self, name: &str) -> Result<(), StorageError> {
        remove_if_exists(&self.path(name))
    }
}
