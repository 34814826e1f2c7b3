// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};

use crate::error::FeedError;

/// A parsed feed document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feed {
    pub title: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// A single entry of a feed, before reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    /// Explicit entry id (RSS guid / Atom id); blank ids are `None`
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published: Option<DateTime<FixedOffset>>,
    pub enclosures: Vec<Enclosure>,
}

/// A media file referenced by a feed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub href: String,
    pub mime_type: String,
}

/// Parse feed bytes as RSS 2.0, falling back to Atom
pub fn parse_feed(bytes: &[u8], url: &str) -> Result<Feed, FeedError> {
    match rss::Channel::read_from(bytes) {
        Ok(channel) => Ok(from_rss(&channel)),
        Err(rss_err) => match atom_syndication::Feed::read_from(bytes) {
            Ok(feed) => Ok(from_atom(&feed)),
            Err(atom_err) => Err(FeedError::ParseFailed {
                url: url.to_string(),
                reason: format!("not RSS ({}) and not Atom ({})", rss_err, atom_err),
            }),
        },
    }
}

fn from_rss(channel: &rss::Channel) -> Feed {
    let entries = channel
        .items()
        .iter()
        .map(|item| FeedEntry {
            id: item.guid().and_then(|g| non_blank(g.value())),
            title: item.title().and_then(decoded),
            description: item.description().and_then(decoded),
            published: item.pub_date().and_then(|date_str| {
                DateTime::parse_from_rfc2822(date_str.trim())
                    .ok()
                    .or_else(|| parse_relaxed_date(date_str.trim()))
            }),
            enclosures: item
                .enclosure()
                .map(|e| Enclosure {
                    href: e.url().trim().to_string(),
                    mime_type: e.mime_type().trim().to_string(),
                })
                .into_iter()
                .filter(|e| !e.href.is_empty())
                .collect(),
        })
        .collect();

    Feed {
        title: decoded(channel.title()),
        entries,
    }
}

fn from_atom(feed: &atom_syndication::Feed) -> Feed {
    let entries = feed
        .entries()
        .iter()
        .map(|entry| FeedEntry {
            id: non_blank(entry.id()),
            title: decoded(entry.title().as_str()),
            description: entry
                .summary()
                .map(|s| s.as_str().to_string())
                .or_else(|| entry.content().and_then(|c| c.value().map(String::from)))
                .as_deref()
                .and_then(decoded),
            // Atom requires `updated`, so every entry gets a timestamp
            published: Some(*entry.published().unwrap_or(entry.updated())),
            enclosures: entry
                .links()
                .iter()
                .filter(|link| link.rel() == "enclosure" && !link.href().trim().is_empty())
                .map(|link| Enclosure {
                    href: link.href().trim().to_string(),
                    mime_type: link.mime_type().unwrap_or_default().trim().to_string(),
                })
                .collect(),
        })
        .collect();

    Feed {
        title: decoded(feed.title().as_str()),
        entries,
    }
}

fn non_blank(value: &str) -> Option<String> {
    Some(value.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn decoded(value: &str) -> Option<String> {
    non_blank(&html_escape::decode_html_entities(value))
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    const FORMATS: [&str; 4] = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    DateTime::parse_from_rfc3339(date_str).ok().or_else(|| {
        FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/feed.xml";

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test &amp; Podcast</title>
    <description>A test podcast</description>
    <link>https://example.com</link>
    <item>
      <title>Episode 1</title>
      <description>First episode</description>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <guid>ep1-guid</guid>
      <enclosure url="https://example.com/ep1.mp3" length="1234567" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 2</title>
      <guid>   </guid>
      <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>No Audio</title>
    </item>
  </channel>
</rss>"#;

    const SAMPLE_ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Cast</title>
  <id>urn:uuid:feed</id>
  <updated>2024-02-01T10:00:00Z</updated>
  <entry>
    <title>Atom Episode</title>
    <id>urn:uuid:entry-1</id>
    <updated>2024-02-01T10:00:00Z</updated>
    <published>2024-01-31T08:30:00+01:00</published>
    <summary>Summary text</summary>
    <link rel="alternate" href="https://example.com/page"/>
    <link rel="enclosure" type="audio/ogg" href="https://example.com/a.ogg"/>
    <link rel="enclosure" type="audio/mpeg" href="https://example.com/a.mp3"/>
  </entry>
  <entry>
    <title>Only Updated</title>
    <id>urn:uuid:entry-2</id>
    <updated>2024-02-02T10:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn rss_entries_keep_feed_order() {
        let feed = parse_feed(SAMPLE_RSS.as_bytes(), URL).unwrap();

        let titles: Vec<_> = feed.entries.iter().map(|e| e.title.clone()).collect();
        assert_eq!(
            titles,
            vec![
                Some("Episode 1".to_string()),
                Some("Episode 2".to_string()),
                Some("No Audio".to_string())
            ]
        );
    }

    #[test]
    fn rss_entry_fields_are_mapped() {
        let feed = parse_feed(SAMPLE_RSS.as_bytes(), URL).unwrap();
        let ep1 = &feed.entries[0];

        assert_eq!(feed.title.as_deref(), Some("Test & Podcast"));
        assert_eq!(ep1.id.as_deref(), Some("ep1-guid"));
        assert_eq!(ep1.description.as_deref(), Some("First episode"));
        assert_eq!(
            ep1.published,
            Some(DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z").unwrap())
        );
        assert_eq!(
            ep1.enclosures,
            vec![Enclosure {
                href: "https://example.com/ep1.mp3".to_string(),
                mime_type: "audio/mpeg".to_string(),
            }]
        );
    }

    #[test]
    fn rss_blank_guid_and_missing_fields_are_none() {
        let feed = parse_feed(SAMPLE_RSS.as_bytes(), URL).unwrap();

        assert!(feed.entries[1].id.is_none());
        assert!(feed.entries[1].published.is_none());
        assert!(feed.entries[2].enclosures.is_empty());
    }

    #[test]
    fn atom_is_used_when_rss_fails() {
        let feed = parse_feed(SAMPLE_ATOM.as_bytes(), URL).unwrap();

        assert_eq!(feed.title.as_deref(), Some("Atom Cast"));
        assert_eq!(feed.entries.len(), 2);

        let entry = &feed.entries[0];
        assert_eq!(entry.id.as_deref(), Some("urn:uuid:entry-1"));
        assert_eq!(entry.description.as_deref(), Some("Summary text"));
        assert_eq!(
            entry.published,
            Some(DateTime::parse_from_rfc3339("2024-01-31T08:30:00+01:00").unwrap())
        );
        let hrefs: Vec<_> = entry.enclosures.iter().map(|e| e.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec!["https://example.com/a.ogg", "https://example.com/a.mp3"]
        );
    }

    #[test]
    fn atom_published_falls_back_to_updated() {
        let feed = parse_feed(SAMPLE_ATOM.as_bytes(), URL).unwrap();
        assert_eq!(
            feed.entries[1].published,
            Some(DateTime::parse_from_rfc3339("2024-02-02T10:00:00Z").unwrap())
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_feed(b"<html><body>nope</body></html>", URL),
            Err(FeedError::ParseFailed { .. })
        ));
    }

    #[test]
    fn relaxed_dates_are_accepted() {
        assert!(parse_relaxed_date("2024-01-01T12:00:00+00:00").is_some());
        assert!(parse_relaxed_date("2024-01-01 12:00:00 +0000").is_some());
        assert!(parse_relaxed_date("01 Jan 2024 12:00:00 +0000").is_some());
        assert!(parse_relaxed_date("yesterday").is_none());
    }

    #[test]
    fn titles_are_entity_decoded() {
        assert_eq!(decoded("Tom &amp; Jerry").as_deref(), Some("Tom & Jerry"));
        assert_eq!(decoded("  "), None);
    }
}
