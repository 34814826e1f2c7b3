// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use crate::error::StorageError;

use super::{read_optional, remove_if_exists, write_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
    Etag,
    Modified,
}

impl CacheKey {
    pub const ALL: [CacheKey; 2] = [CacheKey::Etag, CacheKey::Modified];

    fn extension(self) -> &'static str {
        match self {
            CacheKey::Etag => "etag",
            CacheKey::Modified => "modified",
        }
    }
}

/// Validators from the last successful feed fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub etag: Option<String>,
    pub modified: Option<String>,
}

impl CacheEntry {
    fn value(&self, key: CacheKey) -> Option<&str> {
        match key {
            CacheKey::Etag => self.etag.as_deref(),
            CacheKey::Modified => self.modified.as_deref(),
        }
    }
}

/// ETag / Last-Modified values per subscription, one small file per value
#[derive(Debug, Clone)]
pub struct ConditionalCache {
    dir: PathBuf,
}

impl ConditionalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str, key: CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{}", name, key.extension()))
    }

    fn read(&self, name: &str, key: CacheKey) -> Result<Option<String>, StorageError> {
        Ok(read_optional(&self.path(name, key))?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    pub fn get(&self, name: &str) -> Result<CacheEntry, StorageError> {
        Ok(CacheEntry {
            etag: self.read(name, CacheKey::Etag)?,
            modified: self.read(name, CacheKey::Modified)?,
        })
    }

    /// Store both values; an absent or empty value forgets that key
    pub fn put(&self, name: &str, entry: &CacheEntry) -> Result<(), StorageError> {
        for key in CacheKey::ALL {
            match entry.value(key).map(str::trim).filter(|v| !v.is_empty()) {
                Some(value) => write_atomic(&self.path(name, key), value.as_bytes())?,
                None => remove_if_exists(&self.path(name, key))?,
            }
        }
        Ok(())
    }

    /// Forget the given keys, or all of them
    pub fn forget(&self, name: &str, keys: Option<&[CacheKey]>) -> Result<(), StorageError> {
        for key in keys.unwrap_or(&CacheKey::ALL) {
            remove_if_exists(&self.path(name, *key))?;
        }
        Ok(())
    }
}
