// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching or parsing a subscription's feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed {url} is gone (HTTP {status})")]
    Unavailable { url: String, status: u16 },

    #[error("HTTP error {status} for feed {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse feed {url}: {reason}")]
    ParseFailed { url: String, reason: String },

    #[error("Redirect from {url} without a usable Location header")]
    InvalidRedirect { url: String },

    #[error("Too many redirects while fetching {url}")]
    TooManyRedirects { url: String },

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl FeedError {
    /// Whether the feed is permanently gone rather than temporarily failing
    pub fn is_unavailable(&self) -> bool {
        matches!(self, FeedError::Unavailable { .. })
    }
}

/// Errors that can occur while rendering a destination filename
#[derive(Error, Debug)]
pub enum FilenameError {
    #[error("Unknown placeholder '{{{name}}}' in filename template")]
    UnknownPlaceholder { name: String },

    #[error("Unbalanced brace in filename template '{template}'")]
    MalformedTemplate { template: String },

    #[error("Unsupported content type '{mime_type}'")]
    UnsupportedContentType { mime_type: String },

    #[error("No free filename for {path} after {attempts} attempts")]
    TooManyCollisions { path: PathBuf, attempts: u32 },

    #[error("Filename template '{template}' rendered an empty name")]
    EmptyName { template: String },
}

/// Errors that can occur while downloading a single attachment
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to move download into place at {path}: {source}")]
    FinalizeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Filename error: {0}")]
    Filename(#[from] FilenameError),
}

/// Errors that can occur when reading or writing persisted state
/// (episode index, conditional cache, subscription registry)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {path}: {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize state: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),
}

/// Errors that can occur when loading the application configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level errors for subscription operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No subscription named '{0}'")]
    NoSubscription(String),

    #[error("A subscription named '{0}' already exists")]
    NameTaken(String),

    #[error("'{0}' is not a valid subscription name")]
    InvalidName(String),

    #[error("Failed to move {from} to {to}: {source}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
