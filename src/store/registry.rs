// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::StorageError;
use crate::model::Subscription;
use crate::predicate::Filter;

use super::{read_optional, remove_if_exists, write_atomic};

/// Subscription records, stored as `<dir>/<name>.json`
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    dir: PathBuf,
}

/// Whether `name` can serve as a subscription name (and thus a file name)
pub fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name.trim() == name
        && !name.starts_with('.')
        && sanitize_filename::is_sanitized(name)
}

impl SubscriptionRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    pub fn get(&self, name: &str) -> Result<Option<Subscription>, StorageError> {
        let path = self.path(name);
        let Some(content) = read_optional(&path)? else {
            return Ok(None);
        };

        let mut subscription: Subscription =
            serde_json::from_str(&content).map_err(|e| StorageError::JsonParseFailed {
                path: path.clone(),
                source: e,
            })?;
        subscription.name = name.to_string();
        Ok(Some(subscription))
    }

    pub fn save(&self, subscription: &Subscription) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(subscription)?;
        write_atomic(&self.path(&subscription.name), json.as_bytes())
    }

    pub fn delete(&self, name: &str) -> Result<(), StorageError> {
        remove_if_exists(&self.path(name))
    }

    /// All subscription names, sorted
    pub fn names(&self) -> Result<Vec<String>, StorageError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    path: self.dir.clone(),
                    source: e,
                });
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::ReadFailed {
                path: self.dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && path.is_file()
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Subscriptions accepted by `predicate`, sorted by name.
    ///
    /// Unreadable records are logged and skipped.
    pub fn list(&self, predicate: &Filter) -> Result<Vec<Subscription>, StorageError> {
        let mut subscriptions = Vec::new();
        for name in self.names()? {
            match self.get(&name) {
                Ok(Some(subscription)) if predicate.matches(&subscription) => {
                    subscriptions.push(subscription)
                }
                Ok(_) => {}
                Err(e) => warn!(name = %name, error = %e, "Skipping unreadable subscription"),
            }
        }
        Ok(subscriptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn registry() -> (tempfile::TempDir, SubscriptionRegistry) {
        let dir = tempdir().unwrap();
        let registry = SubscriptionRegistry::new(dir.path().join("subscriptions"));
        (dir, registry)
    }

    #[test]
    fn saved_subscription_loads_with_name() {
        let (_dir, registry) = registry();
        let mut sub = Subscription::new("news", "https://example.com/feed");
        sub.max_episodes = 3;

        registry.save(&sub).unwrap();

        assert!(registry.exists("news"));
        assert_eq!(registry.get("news").unwrap(), Some(sub));
    }

    #[test]
    fn missing_subscription_is_none() {
        let (_dir, registry) = registry();
        assert_eq!(registry.get("nope").unwrap(), None);
        assert!(registry.names().unwrap().is_empty());
    }

    #[test]
    fn names_are_sorted_and_ignore_other_files() {
        let (_dir, registry) = registry();
        registry.save(&Subscription::new("b", "http://b")).unwrap();
        registry.save(&Subscription::new("a", "http://a")).unwrap();
        std::fs::write(registry.dir().join("notes.txt"), "x").unwrap();

        assert_eq!(registry.names().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn delete_removes_record() {
        let (_dir, registry) = registry();
        registry.save(&Subscription::new("a", "http://a")).unwrap();

        registry.delete("a").unwrap();

        assert!(!registry.exists("a"));
    }

    #[test]
    fn list_applies_predicate_and_skips_broken_records() {
        let (_dir, registry) = registry();
        let mut off = Subscription::new("off", "http://off");
        off.enabled = false;
        registry.save(&off).unwrap();
        registry.save(&Subscription::new("on", "http://on")).unwrap();
        std::fs::write(registry.dir().join("broken.json"), "{").unwrap();

        let enabled: Vec<_> = registry
            .list(&Filter::Enabled(true))
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(enabled, vec!["on"]);

        let named: Vec<_> = registry
            .list(&Filter::name("off"))
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(named, vec!["off"]);
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("plan-b"));
        assert!(is_valid_name("example.com-1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name(" padded "));
        assert!(!is_valid_name(".hidden"));
        assert!(!is_valid_name("a/b"));
        assert!(!is_valid_name("a:b"));
    }
}
