// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mocks and a temp-dir harness shared by the engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use tempfile::TempDir;

use crate::app::Podfetch;
use crate::config::AppConfig;
use crate::error::FeedError;
use crate::feed::{Enclosure, FeedEntry, FeedSource, FetchResult};
use crate::http::{ByteStream, ConditionalResponse, HttpClient, HttpResponse};
use crate::model::Subscription;
use crate::progress::NoopReporter;

/// Feed entry with one enclosure per MIME type
pub fn audio_entry(id: &str, published: &str, mime_types: &[&str]) -> FeedEntry {
    FeedEntry {
        id: Some(id.to_string()),
        title: Some(format!("Episode {}", id)),
        description: None,
        published: Some(DateTime::parse_from_rfc3339(published).unwrap()),
        enclosures: mime_types
            .iter()
            .enumerate()
            .map(|(i, mime)| Enclosure {
                href: format!("https://cdn.example.com/{}/{}", id, i),
                mime_type: mime.to_string(),
            })
            .collect(),
    }
}

#[derive(Default)]
struct FeedState {
    entries: Vec<FeedEntry>,
    etag: Option<String>,
    modified: Option<String>,
    not_modified_for: Option<String>,
    redirect: Option<String>,
    fail_status: Option<u16>,
    failing_urls: HashMap<String, u16>,
    last_etag: Option<String>,
}

/// Serves the same configurable feed for every URL
#[derive(Default)]
pub struct MockFeedSource {
    state: Mutex<FeedState>,
    pub calls: AtomicUsize,
}

impl MockFeedSource {
    pub fn set_entries(&self, entries: Vec<FeedEntry>) {
        self.state.lock().unwrap().entries = entries;
    }

    pub fn entries(&self) -> Vec<FeedEntry> {
        self.state.lock().unwrap().entries.clone()
    }

    pub fn set_validators(&self, etag: Option<&str>, modified: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.etag = etag.map(String::from);
        state.modified = modified.map(String::from);
    }

    /// Answer 304 when the request carries this ETag
    pub fn set_not_modified_for(&self, etag: Option<&str>) {
        self.state.lock().unwrap().not_modified_for = etag.map(String::from);
    }

    pub fn set_redirect(&self, url: Option<&str>) {
        self.state.lock().unwrap().redirect = url.map(String::from);
    }

    pub fn fail_with_status(&self, status: u16) {
        self.state.lock().unwrap().fail_status = Some(status);
    }

    pub fn fail_url_with_status(&self, url: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .failing_urls
            .insert(url.to_string(), status);
    }

    /// ETag sent with the most recent fetch
    pub fn last_etag(&self) -> Option<String> {
        self.state.lock().unwrap().last_etag.clone()
    }
}

#[async_trait]
impl FeedSource for MockFeedSource {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        _modified: Option<&str>,
    ) -> Result<FetchResult, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.last_etag = etag.map(String::from);

        if let Some(status) = state.failing_urls.get(url).copied().or(state.fail_status) {
            let url = url.to_string();
            return Err(match status {
                404 | 410 => FeedError::Unavailable { url, status },
                _ => FeedError::Status { url, status },
            });
        }

        if etag.is_some() && state.not_modified_for.as_deref() == etag {
            return Ok(FetchResult {
                status: 304,
                etag: state.etag.clone(),
                modified: state.modified.clone(),
                ..FetchResult::default()
            });
        }

        Ok(FetchResult {
            status: 200,
            title: Some("Mock Feed".to_string()),
            entries: state.entries.clone(),
            etag: state.etag.clone(),
            modified: state.modified.clone(),
            redirected_to: state.redirect.clone(),
        })
    }
}

/// Serves the URL itself as the attachment body; counts downloads
#[derive(Default)]
pub struct MockHttpClient {
    /// Requests started
    pub downloads: AtomicUsize,
    /// Responses delivered
    pub completed: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockHttpClient {
    /// Hold every response back for `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing.lock().unwrap().contains(url);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        let status = if failing { 404 } else { 200 };
        let data = Bytes::from(url.to_string());
        let len = data.len() as u64;
        let body: ByteStream = Box::pin(futures::stream::once(async move { Ok(data) }));

        Ok(HttpResponse {
            status,
            content_length: Some(len),
            body,
        })
    }

    async fn get_conditional(
        &self,
        _url: &str,
        _etag: Option<&str>,
        _modified: Option<&str>,
    ) -> Result<ConditionalResponse, reqwest::Error> {
        unreachable!("feeds come from MockFeedSource")
    }
}

/// An engine rooted in a temp dir, wired to the mocks
pub struct Harness {
    pub app: Podfetch,
    pub feeds: Arc<MockFeedSource>,
    pub http: Arc<MockHttpClient>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_threads(threads: usize) -> Self {
        Self::with_config(|config| config.update_threads = threads)
    }

    pub fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::with_root(dir.path());
        configure(&mut config);

        let feeds = Arc::new(MockFeedSource::default());
        let http = Arc::new(MockHttpClient::default());
        let app = Podfetch::with_feed_source(config, feeds.clone(), http.clone(), NoopReporter::shared());

        Self {
            app,
            feeds,
            http,
            dir,
        }
    }

    /// Register a subscription with feed URL `https://feeds.example.com/<name>`
    pub fn add_subscription(&self, name: &str, max_episodes: i64) -> Subscription {
        let mut subscription = Subscription::new(name, format!("https://feeds.example.com/{}", name));
        subscription.max_episodes = max_episodes;
        self.app.registry().save(&subscription).unwrap();
        subscription
    }
}
