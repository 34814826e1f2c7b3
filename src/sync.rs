// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::VecDeque;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::Podfetch;
use crate::content::cleanup_partial_files;
use crate::episode::{DownloadContext, DownloadOutcome};
use crate::error::SyncError;
use crate::feed::FeedEntry;
use crate::model::{Attachment, Episode, Pubdate, Subscription};
use crate::predicate::Filter;
use crate::progress::ProgressEvent;
use crate::store::CacheEntry;

/// Result of one subscription's update cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// The feed reported no changes; nothing was reconciled
    pub not_modified: bool,
    pub new_episodes: usize,
    pub downloaded: usize,
    /// Attachments that could not be named or downloaded
    pub failed: usize,
}

/// Outcome for one subscription in a batch
#[derive(Debug)]
pub struct SubscriptionOutcome {
    pub name: String,
    pub result: Result<UpdateSummary, SyncError>,
}

/// Per-subscription outcomes of a batch update
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Sorted by subscription name
    pub outcomes: Vec<SubscriptionOutcome>,
    /// Disabled subscriptions that were not updated
    pub skipped: Vec<String>,
    /// Due subscriptions not started because of shutdown
    pub pending: Vec<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn downloaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.downloaded)
            .sum()
    }

    /// Attachments that failed across all successful cycles
    pub fn failed_attachments(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.failed)
            .sum()
    }
}

/// Identity for feed entries without an explicit id: hex SHA-256 of the
/// feed-supplied timestamp and the title.
///
/// Not unique for entries sharing both.
pub fn synthesize_id(published: Option<&DateTime<FixedOffset>>, title: Option<&str>) -> String {
    let canonical = format!(
        "{}\n{}",
        published.map(|p| p.to_rfc3339()).unwrap_or_default(),
        title.unwrap_or_default()
    );
    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

impl Podfetch {
    /// Update a single subscription by name.
    ///
    /// Feed failures are returned to the caller; attachment failures are
    /// counted in the summary.
    pub async fn update(&self, name: &str, force: bool) -> Result<UpdateSummary, SyncError> {
        let mut subscription = self.subscription(name)?;
        self.update_subscription(&mut subscription, force, 0).await
    }

    /// Update all enabled subscriptions matching `predicate`.
    ///
    /// Subscriptions are spread over up to `update_threads` workers. A
    /// failing subscription does not affect the others.
    pub async fn update_all(&self, predicate: &Filter, force: bool) -> Result<BatchReport, SyncError> {
        self.update_all_until(predicate, force, &CancellationToken::new())
            .await
    }

    /// [`Podfetch::update_all`] that stops handing out subscriptions once
    /// `shutdown` is cancelled.
    ///
    /// Cycles already running are finished; subscriptions that were not
    /// started end up in [`BatchReport::pending`].
    pub async fn update_all_until(
        &self,
        predicate: &Filter,
        force: bool,
        shutdown: &CancellationToken,
    ) -> Result<BatchReport, SyncError> {
        let mut report = BatchReport::default();
        let mut due = VecDeque::new();

        for subscription in self.subscriptions(predicate)? {
            if subscription.enabled {
                due.push_back(subscription);
            } else {
                warn!(name = %subscription.name, "Subscription is disabled and will not be updated");
                report.skipped.push(subscription.name);
            }
        }

        let workers = self.config.update_threads.min(due.len());
        if workers < 2 {
            for subscription in due {
                if shutdown.is_cancelled() {
                    report.pending.push(subscription.name);
                    continue;
                }
                report.outcomes.push(self.run_one(subscription, force, 0).await);
            }
        } else {
            debug!(workers, due = due.len(), "Dispatching updates");
            let (outcomes, pending) = self.run_parallel(due, force, workers, shutdown).await;
            report.outcomes = outcomes;
            report.pending = pending;
        }

        report.outcomes.sort_by(|a, b| a.name.cmp(&b.name));
        if !report.pending.is_empty() {
            info!(pending = report.pending.len(), "Batch interrupted by shutdown");
        }

        self.reporter.report(ProgressEvent::BatchCompleted {
            succeeded: report.succeeded(),
            failed: report.failed(),
            downloaded: report.downloaded(),
        });

        Ok(report)
    }

    /// Drain `due` with `workers` tasks; each subscription goes to exactly one
    /// worker. Returns the outcomes and the names never started.
    ///
    /// Workers live in a [`JoinSet`], so dropping this future aborts them.
    async fn run_parallel(
        &self,
        due: VecDeque<Subscription>,
        force: bool,
        workers: usize,
        shutdown: &CancellationToken,
    ) -> (Vec<SubscriptionOutcome>, Vec<String>) {
        let queue = Arc::new(Mutex::new(due));
        let mut tasks = JoinSet::new();

        for worker in 0..workers {
            let app = self.clone();
            let queue = queue.clone();
            let shutdown = shutdown.clone();

            tasks.spawn(async move {
                let mut outcomes = Vec::new();
                while !shutdown.is_cancelled() {
                    let next = queue.lock().await.pop_front();
                    let Some(subscription) = next else {
                        break;
                    };
                    outcomes.push(app.run_one(subscription, force, worker).await);
                }
                outcomes
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(worker_outcomes) => outcomes.extend(worker_outcomes),
                Err(e) => error!(error = %e, "Update worker panicked"),
            }
        }

        let pending = queue.lock().await.drain(..).map(|s| s.name).collect();
        (outcomes, pending)
    }

    async fn run_one(&self, mut subscription: Subscription, force: bool, worker: usize) -> SubscriptionOutcome {
        let result = self.update_subscription(&mut subscription, force, worker).await;

        if let Err(e) = &result {
            error!(name = %subscription.name, error = %e, "Failed to update subscription");
            self.reporter.report(ProgressEvent::SubscriptionFailed {
                worker,
                name: subscription.name.clone(),
                error: e.to_string(),
            });
        }

        SubscriptionOutcome {
            name: subscription.name,
            result,
        }
    }

    /// One full update cycle: conditional fetch, reconcile, persist.
    ///
    /// The conditional cache only moves forward after the index was written.
    pub(crate) async fn update_subscription(
        &self,
        subscription: &mut Subscription,
        force: bool,
        worker: usize,
    ) -> Result<UpdateSummary, SyncError> {
        info!(name = %subscription.name, force, "Updating subscription");
        self.reporter.report(ProgressEvent::SubscriptionStarted {
            worker,
            name: subscription.name.clone(),
        });

        let content_dir = self.content_dir(subscription);

        let cached = if force {
            CacheEntry::default()
        } else {
            self.cache.get(&subscription.name)?
        };

        let fetched = self
            .feeds
            .fetch(
                &subscription.url,
                cached.etag.as_deref(),
                cached.modified.as_deref(),
            )
            .await?;

        let mut changed = false;
        if let Some(new_url) = fetched.redirected_to.as_ref().filter(|u| **u != subscription.url) {
            info!(name = %subscription.name, from = %subscription.url, to = %new_url, "Feed moved permanently");
            subscription.url = new_url.clone();
            changed = true;
        }
        if subscription.title.is_none()
            && let Some(title) = &fetched.title
        {
            subscription.title = Some(title.clone());
            changed = true;
        }
        if changed {
            self.registry.save(subscription)?;
        }

        if fetched.is_not_modified() && !force {
            debug!(name = %subscription.name, "Feed not modified");
            self.reporter.report(ProgressEvent::FeedNotModified {
                worker,
                name: subscription.name.clone(),
            });
            return Ok(UpdateSummary {
                not_modified: true,
                ..UpdateSummary::default()
            });
        }

        let summary = self
            .reconcile(subscription, &fetched.entries, &content_dir, force, worker)
            .await?;

        if summary.failed == 0 {
            self.cache.put(
                &subscription.name,
                &CacheEntry {
                    etag: fetched.etag,
                    modified: fetched.modified,
                },
            )?;
        } else {
            // Next cycle must fetch the full feed to retry the failed attachments
            self.cache.forget(&subscription.name, None)?;
        }

        info!(
            name = %subscription.name,
            new_episodes = summary.new_episodes,
            downloaded = summary.downloaded,
            failed = summary.failed,
            "Subscription updated"
        );
        self.reporter.report(ProgressEvent::SubscriptionFinished {
            worker,
            name: subscription.name.clone(),
            new_episodes: summary.new_episodes,
            downloaded: summary.downloaded,
            failed: summary.failed,
        });

        Ok(summary)
    }

    /// Merge feed entries into the episode index and download what is missing.
    ///
    /// Entries are processed in feed order. Attachment failures are counted
    /// and never stop the loop; the index is always persisted at the end.
    pub(crate) async fn reconcile(
        &self,
        subscription: &Subscription,
        entries: &[FeedEntry],
        content_dir: &Path,
        force: bool,
        worker: usize,
    ) -> Result<UpdateSummary, SyncError> {
        let mut episodes = self.index.load(&subscription.name)?;
        let mut summary = UpdateSummary::default();
        let now = Utc::now();

        let cleaned = self.cleanup_stale_partials(subscription, &episodes, content_dir)?;
        if cleaned > 0 {
            self.reporter.report(ProgressEvent::PartialFilesCleanedUp {
                name: subscription.name.clone(),
                count: cleaned,
            });
        }

        for entry in entries {
            let id = entry
                .id
                .clone()
                .unwrap_or_else(|| synthesize_id(entry.published.as_ref(), entry.title.as_deref()));

            let position = match episodes.iter().position(|e| e.id == id) {
                Some(position) => position,
                None => {
                    episodes.push(self.new_episode(id, entry, now));
                    summary.new_episodes += 1;
                    episodes.len() - 1
                }
            };

            self.download_episode(
                subscription,
                &mut episodes[position],
                content_dir,
                force,
                worker,
                &mut summary,
            )
            .await;
        }

        self.index.save(&subscription.name, &episodes)?;
        Ok(summary)
    }

    /// Remove `.partial` leftovers of this subscription's own attachments.
    ///
    /// Other files in the content directory may belong to a subscription
    /// sharing it and are never touched.
    fn cleanup_stale_partials(
        &self,
        subscription: &Subscription,
        episodes: &[Episode],
        content_dir: &Path,
    ) -> Result<usize, SyncError> {
        let mut cleaned = 0;
        for episode in episodes {
            for index in 0..episode.files.len() {
                if let Ok(destination) =
                    self.filenames
                        .destination(subscription, content_dir, episode, index)
                {
                    cleaned += cleanup_partial_files(&destination)?;
                }
            }
        }
        Ok(cleaned)
    }

    fn new_episode(&self, id: String, entry: &FeedEntry, now: DateTime<Utc>) -> Episode {
        let content_types = self.filenames.content_types();
        let files = entry
            .enclosures
            .iter()
            .filter(|enclosure| {
                let supported = content_types.is_supported(&enclosure.mime_type);
                if !supported {
                    debug!(href = %enclosure.href, mime_type = %enclosure.mime_type, "Dropping unsupported enclosure");
                }
                supported
            })
            .map(|enclosure| Attachment::new(&enclosure.href, enclosure.mime_type.to_lowercase()))
            .collect();

        Episode {
            id,
            title: entry.title.clone(),
            description: entry.description.clone(),
            pubdate: entry
                .published
                .map(|published| Pubdate::clamped(&published, now))
                .unwrap_or_else(|| Pubdate::from_utc(now)),
            files,
        }
    }

    async fn download_episode(
        &self,
        subscription: &Subscription,
        episode: &mut Episode,
        content_dir: &Path,
        force: bool,
        worker: usize,
        summary: &mut UpdateSummary,
    ) {
        let context = DownloadContext {
            worker,
            subscription: subscription.name.clone(),
            episode_title: episode.title.clone().unwrap_or_else(|| episode.id.clone()),
        };

        for index in 0..episode.files.len() {
            let destination = match self
                .filenames
                .destination(subscription, content_dir, episode, index)
            {
                Ok(destination) => destination,
                Err(e) => {
                    warn!(name = %subscription.name, episode = %episode.id, error = %e, "Cannot name attachment");
                    summary.failed += 1;
                    continue;
                }
            };

            match self
                .downloader
                .download(&mut episode.files[index], &destination, force, &context)
                .await
            {
                Ok(DownloadOutcome::Downloaded { bytes }) => {
                    debug!(path = %destination.display(), bytes, "Attachment downloaded");
                    summary.downloaded += 1;
                }
                Ok(DownloadOutcome::Skipped) => {}
                Err(e) => {
                    warn!(name = %subscription.name, url = %episode.files[index].url, error = %e, "Attachment download failed");
                    summary.failed += 1;
                }
            }
        }
    }
}
