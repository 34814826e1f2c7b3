// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A configured podcast subscription.
///
/// The name is the identity key and doubles as the registry file name, so it
/// is not part of the serialized record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(skip)]
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Number of episodes to keep; negative means unlimited
    #[serde(default = "unlimited")]
    pub max_episodes: i64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<PathBuf>,
}

fn unlimited() -> i64 {
    -1
}

fn enabled_by_default() -> bool {
    true
}

impl Subscription {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            title: None,
            max_episodes: unlimited(),
            enabled: true,
            filename_template: None,
            content_dir: None,
        }
    }

    /// Directory that holds this subscription's downloads
    pub fn content_dir(&self, default_root: &Path) -> PathBuf {
        self.content_dir
            .clone()
            .unwrap_or_else(|| default_root.join(&self.name))
    }

    /// Title for display and filenames, falling back to the name
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

/// Publication timestamp as `[year, month, day, hour, minute, second]` in UTC.
///
/// The array order makes the derived `Ord` chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pubdate(pub [i32; 6]);

impl Pubdate {
    /// Build from a timestamp, clamping anything in the future to `now`
    pub fn clamped<Tz: TimeZone>(published: &DateTime<Tz>, now: DateTime<Utc>) -> Self {
        let utc = published.with_timezone(&Utc);
        Self::from_utc(if utc > now { now } else { utc })
    }

    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self([
            dt.year(),
            dt.month() as i32,
            dt.day() as i32,
            dt.hour() as i32,
            dt.minute() as i32,
            dt.second() as i32,
        ])
    }

    pub fn year(&self) -> i32 {
        self.0[0]
    }

    pub fn month(&self) -> i32 {
        self.0[1]
    }

    pub fn day(&self) -> i32 {
        self.0[2]
    }

    pub fn hour(&self) -> i32 {
        self.0[3]
    }

    pub fn minute(&self) -> i32 {
        self.0[4]
    }

    pub fn second(&self) -> i32 {
        self.0[5]
    }

    /// Calendar date, if the stored fields form a valid one
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year(), self.month() as u32, self.day() as u32)
    }
}

/// A downloadable file belonging to an episode.
///
/// `local_path` is `None` while the file has not been downloaded successfully.
/// Serialized as `[url, mime_type, local_path_or_empty]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String, String)", into = "(String, String, String)")]
pub struct Attachment {
    pub url: String,
    pub mime_type: String,
    pub local_path: Option<PathBuf>,
}

impl Attachment {
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
            local_path: None,
        }
    }

    /// Whether the recorded local file is present on disk
    pub fn is_downloaded(&self) -> bool {
        self.local_path.as_deref().is_some_and(Path::is_file)
    }
}

impl From<(String, String, String)> for Attachment {
    fn from((url, mime_type, local_path): (String, String, String)) -> Self {
        Self {
            url,
            mime_type,
            local_path: Some(local_path)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        }
    }
}

impl From<Attachment> for (String, String, String) {
    fn from(attachment: Attachment) -> Self {
        let local_path = attachment
            .local_path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        (attachment.url, attachment.mime_type, local_path)
    }
}

/// An episode of a subscription, as recorded in the episode index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub pubdate: Pubdate,
    #[serde(default)]
    pub files: Vec<Attachment>,
}

impl Episode {
    /// Local paths of all downloaded attachments
    pub fn local_paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().filter_map(|f| f.local_path.as_deref())
    }
}
