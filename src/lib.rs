// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod app;
pub mod config;
pub mod content;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod model;
pub mod predicate;
pub mod progress;
pub mod rename;
pub mod retention;
pub mod scheduler;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use app::{NewSubscription, Podfetch, SubscriptionEdit, name_from_url};
pub use config::AppConfig;
pub use error::{ConfigError, DownloadError, FeedError, FilenameError, StorageError, SyncError};
pub use feed::{FeedSource, FetchResult, HttpFeedSource};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use model::{Attachment, Episode, Pubdate, Subscription};
pub use predicate::{AsCandidate, Candidate, Filter};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use retention::select_excess;
pub use scheduler::{PeriodicUpdate, Service, ServiceSet};
pub use sync::{BatchReport, SubscriptionOutcome, UpdateSummary, synthesize_id};
