// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::app::Podfetch;
use crate::content::{move_file, prune_empty_dirs};
use crate::episode::resolve_collision;
use crate::error::SyncError;
use crate::model::{Episode, Subscription};
use crate::store::is_valid_name;

impl Podfetch {
    /// Give a subscription a new name, migrating its cache and index.
    ///
    /// With `move_files`, downloads are moved to where the new identity puts
    /// them. Records under the old name are only removed once everything was
    /// written under the new one.
    pub fn rename(&self, name: &str, new_name: &str, move_files: bool) -> Result<(), SyncError> {
        let mut subscription = self.subscription(name)?;
        if !is_valid_name(new_name) {
            return Err(SyncError::InvalidName(new_name.to_string()));
        }
        if self.registry.exists(new_name) {
            return Err(SyncError::NameTaken(new_name.to_string()));
        }

        let cached = self.cache.get(name)?;
        let mut episodes = self.index.load(name)?;
        let old_content_dir = self.content_dir(&subscription);

        subscription.name = new_name.to_string();

        if move_files
            && let Err(e) = self.relocate_files(&subscription, &mut episodes, &old_content_dir)
        {
            // Keep the index in line with whatever was already moved
            self.index.save(name, &episodes)?;
            return Err(e);
        }

        self.index.save(new_name, &episodes)?;
        self.cache.put(new_name, &cached)?;
        self.registry.save(&subscription)?;

        self.index.delete(name)?;
        self.cache.forget(name, None)?;
        self.registry.delete(name)?;

        let new_content_dir = self.content_dir(&subscription);
        if move_files && new_content_dir != old_content_dir {
            prune_empty_dirs(&old_content_dir, &old_content_dir, true);
        }

        info!(from = name, to = new_name, move_files, "Renamed subscription");
        Ok(())
    }

    /// Move downloaded files to the destinations `subscription` renders now.
    ///
    /// Updates the recorded paths in `episodes` as files move and prunes
    /// directories left empty below `old_content_dir`. Attachments whose new
    /// name cannot be rendered stay where they are. Stops at the first file
    /// that cannot be moved; `episodes` then reflects the moves done so far.
    pub(crate) fn relocate_files(
        &self,
        subscription: &Subscription,
        episodes: &mut [Episode],
        old_content_dir: &Path,
    ) -> Result<usize, SyncError> {
        let content_dir = self.content_dir(subscription);
        let mut moved = 0;

        for episode in episodes.iter_mut() {
            for idx in 0..episode.files.len() {
                let Some(current) = episode.files[idx].local_path.clone() else {
                    continue;
                };
                if !current.is_file() {
                    continue;
                }

                let destination = match self
                    .filenames
                    .destination(subscription, &content_dir, episode, idx)
                    .and_then(|dest| resolve_collision(&dest, Some(&current)))
                {
                    Ok(dest) => dest,
                    Err(e) => {
                        warn!(path = %current.display(), error = %e, "Cannot rename file, leaving it in place");
                        continue;
                    }
                };
                if destination == current {
                    continue;
                }

                move_file(&current, &destination).map_err(|source| SyncError::MoveFailed {
                    from: current.clone(),
                    to: destination.clone(),
                    source,
                })?;
                debug!(from = %current.display(), to = %destination.display(), "Moved file");
                episode.files[idx].local_path = Some(destination);
                moved += 1;

                if let Some(parent) = current.parent() {
                    prune_empty_dirs(parent, old_content_dir, false);
                }
            }
        }

        if moved > 0 {
            info!(name = %subscription.name, moved, "Relocated downloaded files");
        }
        Ok(moved)
    }
}
