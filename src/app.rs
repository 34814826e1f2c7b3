// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::content::{prune_empty_dirs, remove_file};
use crate::episode::{ContentTypes, Downloader, FilenameGenerator};
use crate::error::{FeedError, StorageError, SyncError};
use crate::feed::{FeedSource, HttpFeedSource};
use crate::http::HttpClient;
use crate::model::{Episode, Subscription};
use crate::predicate::Filter;
use crate::progress::SharedProgressReporter;
use crate::store::{ConditionalCache, EpisodeIndex, SubscriptionRegistry, is_valid_name};

/// The subscription manager: owns the stores and drives updates, purges,
/// renames and registry maintenance.
///
/// Cheap to clone; clones share the same collaborators.
#[derive(Clone)]
pub struct Podfetch {
    pub(crate) config: Arc<AppConfig>,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) index: EpisodeIndex,
    pub(crate) cache: ConditionalCache,
    pub(crate) feeds: Arc<dyn FeedSource>,
    pub(crate) downloader: Downloader,
    pub(crate) filenames: FilenameGenerator,
    pub(crate) reporter: SharedProgressReporter,
}

/// Parameters for [`Podfetch::add`]
#[derive(Debug, Clone, Default)]
pub struct NewSubscription {
    pub url: String,
    /// Derived from the URL host when absent
    pub name: Option<String>,
    pub title: Option<String>,
    pub content_dir: Option<PathBuf>,
    pub max_episodes: Option<i64>,
    pub filename_template: Option<String>,
}

impl NewSubscription {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Changes for [`Podfetch::edit`]; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct SubscriptionEdit {
    pub name: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub enabled: Option<bool>,
    pub max_episodes: Option<i64>,
    pub filename_template: Option<String>,
    pub content_dir: Option<PathBuf>,
}

/// Subscription name derived from a feed URL: the host without `www.`
pub fn name_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "subscription".to_string())
}

impl Podfetch {
    /// Manager fetching feeds and attachments through `client`
    pub fn new(config: AppConfig, client: Arc<dyn HttpClient>, reporter: SharedProgressReporter) -> Self {
        let feeds = Arc::new(HttpFeedSource::new(client.clone()));
        Self::with_feed_source(config, feeds, client, reporter)
    }

    pub fn with_feed_source(
        config: AppConfig,
        feeds: Arc<dyn FeedSource>,
        client: Arc<dyn HttpClient>,
        reporter: SharedProgressReporter,
    ) -> Self {
        let filenames = FilenameGenerator::new(
            config.filename_template.clone(),
            ContentTypes::new(&config.content_types),
        );

        Self {
            registry: SubscriptionRegistry::new(config.subscriptions_dir()),
            index: EpisodeIndex::new(config.index_dir.clone()),
            cache: ConditionalCache::new(config.cache_dir.clone()),
            downloader: Downloader::new(client, reporter.clone()),
            config: Arc::new(config),
            feeds,
            filenames,
            reporter,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn index(&self) -> &EpisodeIndex {
        &self.index
    }

    pub fn cache(&self) -> &ConditionalCache {
        &self.cache
    }

    /// Directory holding the subscription's downloads
    pub fn content_dir(&self, subscription: &Subscription) -> PathBuf {
        subscription.content_dir(&self.config.content_dir)
    }

    pub fn subscription(&self, name: &str) -> Result<Subscription, SyncError> {
        self.registry
            .get(name)?
            .ok_or_else(|| SyncError::NoSubscription(name.to_string()))
    }

    /// Subscriptions matching `predicate`, minus those on the ignore list
    pub fn subscriptions(&self, predicate: &Filter) -> Result<Vec<Subscription>, SyncError> {
        let mut filter = predicate.clone();
        if !self.config.ignore.is_empty() {
            let ignore = Filter::wildcard(&self.config.ignore).map_err(|e| {
                SyncError::InvalidName(format!("ignore pattern: {}", e))
            })?;
            filter = filter.and_not(ignore);
        }
        Ok(self.registry.list(&filter)?)
    }

    /// Episodes of `name` matching `predicate`, oldest first
    pub fn episodes(&self, name: &str, predicate: &Filter) -> Result<Vec<Episode>, SyncError> {
        self.subscription(name)?;
        let mut episodes: Vec<_> = self
            .index
            .load(name)?
            .into_iter()
            .filter(|e| predicate.matches(e))
            .collect();
        episodes.sort_by_key(|e| e.pubdate);
        Ok(episodes)
    }

    /// Episodes across all subscriptions matching `subscriptions`, newest
    /// first. With a `limit` only that many of the newest are returned.
    pub fn recent_episodes(
        &self,
        subscriptions: &Filter,
        episodes: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<(Subscription, Episode)>, SyncError> {
        let mut listed = Vec::new();
        for subscription in self.subscriptions(subscriptions)? {
            for episode in self.episodes(&subscription.name, episodes)? {
                listed.push((subscription.clone(), episode));
            }
        }

        listed.sort_by(|(_, a), (_, b)| b.pubdate.cmp(&a.pubdate));
        if let Some(limit) = limit {
            listed.truncate(limit);
        }
        Ok(listed)
    }

    /// Register a new subscription.
    ///
    /// Without an explicit name one is derived from the URL host; derived
    /// names are made unique by appending `-1`, `-2`, ...
    pub fn add(&self, new: NewSubscription) -> Result<Subscription, SyncError> {
        Url::parse(&new.url).map_err(FeedError::from)?;

        let name = match new.name {
            Some(name) => {
                if !is_valid_name(&name) {
                    return Err(SyncError::InvalidName(name));
                }
                if self.registry.exists(&name) {
                    return Err(SyncError::NameTaken(name));
                }
                name
            }
            None => self.unique_name(&name_from_url(&new.url))?,
        };

        let mut subscription = Subscription::new(name, new.url);
        subscription.title = new.title;
        subscription.content_dir = new.content_dir;
        subscription.filename_template = new.filename_template;
        if let Some(max_episodes) = new.max_episodes {
            subscription.max_episodes = max_episodes;
        }

        self.registry.save(&subscription)?;
        info!(name = %subscription.name, url = %subscription.url, "Added subscription");
        Ok(subscription)
    }

    fn unique_name(&self, base: &str) -> Result<String, SyncError> {
        let base = sanitize_filename::sanitize(base);
        if !is_valid_name(&base) {
            return Err(SyncError::InvalidName(base));
        }
        let mut name = base.clone();
        let mut counter = 1;
        while self.registry.exists(&name) {
            name = format!("{}-{}", base, counter);
            counter += 1;
        }
        if name != base {
            info!(from = %base, to = %name, "Changed subscription name to keep it unique");
        }
        Ok(name)
    }

    /// Change subscription properties.
    ///
    /// With `move_files`, already downloaded files are moved to where the new
    /// title, template or content directory would put them. A new name goes
    /// through [`Podfetch::rename`].
    pub fn edit(
        &self,
        name: &str,
        changes: SubscriptionEdit,
        move_files: bool,
    ) -> Result<Subscription, SyncError> {
        let mut subscription = self.subscription(name)?;
        let old_content_dir = self.content_dir(&subscription);
        let mut affects_files = false;

        if let Some(url) = changes.url {
            Url::parse(&url).map_err(FeedError::from)?;
            subscription.url = url;
        }
        if let Some(title) = changes.title {
            subscription.title = Some(title).filter(|t| !t.is_empty());
            affects_files = true;
        }
        if let Some(enabled) = changes.enabled {
            subscription.enabled = enabled;
        }
        if let Some(max_episodes) = changes.max_episodes {
            subscription.max_episodes = max_episodes;
        }
        if let Some(template) = changes.filename_template {
            subscription.filename_template = Some(template).filter(|t| !t.is_empty());
            affects_files = true;
        }
        if let Some(content_dir) = changes.content_dir {
            subscription.content_dir = Some(content_dir).filter(|d| !d.as_os_str().is_empty());
            affects_files = true;
        }

        if affects_files && move_files {
            let mut episodes = self.index.load(&subscription.name)?;
            let relocated = self.relocate_files(&subscription, &mut episodes, &old_content_dir);
            self.index.save(&subscription.name, &episodes)?;
            relocated?;
            if self.content_dir(&subscription) != old_content_dir {
                prune_empty_dirs(&old_content_dir, &old_content_dir, true);
            }
        }
        self.registry.save(&subscription)?;

        match changes.name.filter(|n| *n != subscription.name) {
            Some(new_name) => {
                self.rename(&subscription.name, &new_name, move_files)?;
                self.subscription(&new_name)
            }
            None => Ok(subscription),
        }
    }

    /// Remove a subscription with its index and cache entries.
    ///
    /// Unless `keep_episodes` is set, downloaded files are deleted too and
    /// the emptied content directory is removed.
    pub fn delete(&self, name: &str, keep_episodes: bool) -> Result<(), SyncError> {
        let subscription = self.subscription(name)?;

        if !keep_episodes {
            let content_dir = self.content_dir(&subscription);
            let mut episodes = self.index.load(name)?;
            let mut failure = None;
            for episode in &mut episodes {
                if let Err(e) = delete_episode_files(episode, &content_dir, true) {
                    failure.get_or_insert(e);
                }
            }
            if let Some(e) = failure {
                // Keep the subscription; its index now lists only the files left over
                self.index.save(name, &episodes)?;
                return Err(e.into());
            }
            prune_empty_dirs(&content_dir, &content_dir, true);
        }

        self.index.delete(name)?;
        self.cache.forget(name, None)?;
        self.registry.delete(name)?;
        info!(name, keep_episodes, "Deleted subscription");
        Ok(())
    }

    /// Apply retention to every subscription; see [`Podfetch::purge`]
    pub fn purge_all(&self, simulate: bool) -> Result<Vec<PathBuf>, SyncError> {
        let mut deleted = Vec::new();
        for subscription in self.subscriptions(&Filter::All)? {
            deleted.extend(self.purge(&subscription.name, simulate)?);
        }
        Ok(deleted)
    }
}

/// Delete the downloaded files of an episode, pruning directories left
/// empty below `content_dir` (the root itself only if `include_root`).
///
/// Removed files are forgotten in the episode; files that cannot be removed
/// stay recorded and the first such failure is returned.
pub(crate) fn delete_episode_files(
    episode: &mut Episode,
    content_dir: &Path,
    include_root: bool,
) -> Result<(), StorageError> {
    let mut failure = None;

    for attachment in &mut episode.files {
        let Some(path) = attachment.local_path.clone() else {
            continue;
        };
        match remove_file(&path) {
            Ok(_) => {
                attachment.local_path = None;
                if let Some(parent) = path.parent() {
                    prune_empty_dirs(parent, content_dir, include_root);
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete episode file");
                failure.get_or_insert(StorageError::DeleteFailed { path, source: e });
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
