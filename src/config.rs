// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Application configuration.
//!
//! Every field has a documented default so a partial (or missing) config file
//! is valid. The struct knows nothing about the file format beyond `serde`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fallback template used when neither the subscription nor the app defines one
pub const FALLBACK_FILENAME_TEMPLATE: &str = "{pub_date}_{title}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base config directory (default: `$HOME/.config/podfetch`).
    /// Subscription records are stored in its `subscriptions` subdirectory.
    pub config_dir: PathBuf,

    /// Episode index files (default: `$HOME/.local/share/podfetch/index`)
    pub index_dir: PathBuf,

    /// Root for downloaded files (default: `$HOME/Podcasts`)
    pub content_dir: PathBuf,

    /// ETag / Last-Modified values (default: `$HOME/.cache/podfetch`)
    pub cache_dir: PathBuf,

    /// App-wide filename template (default: none, see [`FALLBACK_FILENAME_TEMPLATE`])
    pub filename_template: Option<String>,

    /// Number of subscriptions updated in parallel (default: 1)
    pub update_threads: usize,

    /// Shell wildcard patterns of subscription names to never enumerate (default: empty)
    pub ignore: Vec<String>,

    /// Accepted MIME types mapped to their file extension
    pub content_types: BTreeMap<String, String>,

    /// Minutes between scheduled updates in daemon mode (default: 60)
    pub update_interval_minutes: u64,

    /// Episodes shown by `ls` without `--newest`, `--all` or a date range (default: 20)
    pub ls_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            config_dir: home.join(".config").join("podfetch"),
            index_dir: home.join(".local/share/podfetch/index"),
            content_dir: home.join("Podcasts"),
            cache_dir: home.join(".cache").join("podfetch"),
            filename_template: None,
            update_threads: 1,
            ignore: Vec::new(),
            content_types: default_content_types(),
            update_interval_minutes: 60,
            ls_limit: 20,
        }
    }
}

impl AppConfig {
    /// Config with all directories placed below `root`; used by tests and
    /// portable setups.
    pub fn with_root(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            index_dir: root.join("index"),
            content_dir: root.join("content"),
            cache_dir: root.join("cache"),
            ..Self::default()
        }
    }

    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        home_dir().join(".config/podfetch/config.json")
    }

    /// Load the config from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn subscriptions_dir(&self) -> PathBuf {
        self.config_dir.join("subscriptions")
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes.max(1) * 60)
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_content_types() -> BTreeMap<String, String> {
    [
        ("audio/mpeg", "mp3"),
        ("audio/mp3", "mp3"),
        ("audio/ogg", "ogg"),
        ("audio/opus", "opus"),
        ("audio/flac", "flac"),
        ("audio/x-flac", "flac"),
        ("audio/mp4", "m4a"),
        ("audio/x-m4a", "m4a"),
        ("audio/aac", "aac"),
        ("video/mp4", "mp4"),
    ]
    .into_iter()
    .map(|(mime, ext)| (mime.to_string(), ext.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"update_threads": 4, "ignore": ["old-*"], "filename_template": "{title}"}"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.update_threads, 4);
        assert_eq!(config.ignore, vec!["old-*".to_string()]);
        assert_eq!(config.filename_template.as_deref(), Some("{title}"));
        assert_eq!(config.content_types, default_content_types());
        assert_eq!(config.update_interval_minutes, 60);
        assert_eq!(config.ls_limit, 20);
    }

    #[test]
    fn invalid_json_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn with_root_places_all_dirs_below_root() {
        let config = AppConfig::with_root(Path::new("/tmp/pf"));
        assert_eq!(config.subscriptions_dir(), PathBuf::from("/tmp/pf/config/subscriptions"));
        assert_eq!(config.index_dir, PathBuf::from("/tmp/pf/index"));
        assert_eq!(config.content_dir, PathBuf::from("/tmp/pf/content"));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/pf/cache"));
    }
}
