// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{FeedEntry, parse_feed};

/// Maximum number of redirect hops followed for a single fetch
pub const MAX_REDIRECTS: usize = 5;

pub const STATUS_NOT_MODIFIED: u16 = 304;

/// Outcome of a conditional feed fetch
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Status of the final response in the redirect chain
    pub status: u16,
    pub title: Option<String>,
    pub entries: Vec<FeedEntry>,
    pub etag: Option<String>,
    pub modified: Option<String>,
    /// New feed location if the original URL moved permanently
    pub redirected_to: Option<String>,
}

impl FetchResult {
    pub fn is_not_modified(&self) -> bool {
        self.status == STATUS_NOT_MODIFIED
    }
}

/// Something that can fetch and parse a feed, honoring cached validators
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        modified: Option<&str>,
    ) -> Result<FetchResult, FeedError>;
}

/// [`FeedSource`] backed by an [`HttpClient`]
pub struct HttpFeedSource {
    client: Arc<dyn HttpClient>,
}

impl HttpFeedSource {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

fn is_permanent_redirect(status: u16) -> bool {
    matches!(status, 301 | 308)
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        modified: Option<&str>,
    ) -> Result<FetchResult, FeedError> {
        let mut current = Url::parse(url)?;
        // Only an unbroken chain of permanent redirects moves the subscription
        let mut permanent = true;
        let mut redirected_to = None;

        for _ in 0..=MAX_REDIRECTS {
            let response = self
                .client
                .get_conditional(current.as_str(), etag, modified)
                .await
                .map_err(|e| FeedError::FetchFailed {
                    url: current.to_string(),
                    source: e,
                })?;

            if is_redirect(response.status) {
                let location =
                    response
                        .location
                        .as_deref()
                        .ok_or_else(|| FeedError::InvalidRedirect {
                            url: current.to_string(),
                        })?;
                let next = current
                    .join(location)
                    .map_err(|_| FeedError::InvalidRedirect {
                        url: current.to_string(),
                    })?;

                permanent &= is_permanent_redirect(response.status);
                if permanent {
                    redirected_to = Some(next.to_string());
                }
                debug!(from = %current, to = %next, status = response.status, "Following redirect");
                current = next;
                continue;
            }

            match response.status {
                404 | 410 => {
                    return Err(FeedError::Unavailable {
                        url: current.to_string(),
                        status: response.status,
                    });
                }
                status if status >= 400 => {
                    return Err(FeedError::Status {
                        url: current.to_string(),
                        status,
                    });
                }
                _ => {}
            }

            let mut result = FetchResult {
                status: response.status,
                etag: response.etag,
                modified: response.last_modified,
                redirected_to,
                ..FetchResult::default()
            };

            if !result.is_not_modified() {
                let feed = parse_feed(&response.body, current.as_str())?;
                result.title = feed.title;
                result.entries = feed.entries;
            }

            return Ok(result);
        }

        Err(FeedError::TooManyRedirects {
            url: url.to_string(),
        })
    }
}
