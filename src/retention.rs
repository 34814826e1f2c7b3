// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::app::{Podfetch, delete_episode_files};
use crate::error::SyncError;
use crate::model::Episode;

/// Indices of the episodes retention would evict, oldest first.
///
/// Episodes with equal pubdates keep their index order. A negative limit
/// keeps everything.
pub fn select_excess(episodes: &[Episode], max_episodes: i64) -> Vec<usize> {
    if max_episodes < 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..episodes.len()).collect();
    order.sort_by_key(|&i| episodes[i].pubdate);

    let keep = usize::try_from(max_episodes).unwrap_or(usize::MAX);
    let excess = episodes.len().saturating_sub(keep);
    order.truncate(excess);
    order
}

impl Podfetch {
    /// Evict the oldest episodes beyond the subscription's `max_episodes`.
    ///
    /// Returns the files of the evicted episodes. With `simulate` nothing is
    /// touched. Directories emptied by the deletion are pruned, but never the
    /// content directory itself.
    pub fn purge(&self, name: &str, simulate: bool) -> Result<Vec<PathBuf>, SyncError> {
        let subscription = self.subscription(name)?;
        let mut episodes = self.index.load(name)?;

        let selected = select_excess(&episodes, subscription.max_episodes);
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let paths: Vec<PathBuf> = selected
            .iter()
            .flat_map(|&i| episodes[i].local_paths().map(PathBuf::from))
            .collect();

        if simulate {
            debug!(name, count = selected.len(), "Simulated purge");
            return Ok(paths);
        }

        let content_dir = self.content_dir(&subscription);
        let mut evict = vec![false; episodes.len()];
        for &i in &selected {
            match delete_episode_files(&mut episodes[i], &content_dir, false) {
                Ok(()) => evict[i] = true,
                Err(e) => warn!(
                    name,
                    episode = %episodes[i].id,
                    error = %e,
                    "Keeping episode whose files could not be deleted"
                ),
            }
        }

        let evicted = evict.iter().filter(|&&e| e).count();
        let mut flags = evict.into_iter();
        episodes.retain(|_| !flags.next().unwrap_or(false));

        self.index.save(name, &episodes)?;
        info!(name, evicted, files = paths.len(), "Purged old episodes");
        Ok(paths)
    }
}
