// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::FALLBACK_FILENAME_TEMPLATE;
use crate::error::FilenameError;
use crate::model::{Episode, Subscription};

/// Upper bound for the `-N` disambiguator appended on filename collisions
pub const MAX_COLLISION_ATTEMPTS: u32 = 999;

/// Accepted MIME types and the canonical extension for each.
///
/// MIME types are compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    by_mime: BTreeMap<String, String>,
}

impl ContentTypes {
    pub fn new(mapping: &BTreeMap<String, String>) -> Self {
        let by_mime = mapping
            .iter()
            .map(|(mime, ext)| {
                (
                    mime.trim().to_lowercase(),
                    ext.trim().trim_start_matches('.').to_lowercase(),
                )
            })
            .collect();
        Self { by_mime }
    }

    /// Canonical extension for a MIME type, if it is supported
    pub fn extension_for(&self, mime_type: &str) -> Option<&str> {
        self.by_mime
            .get(&mime_type.trim().to_lowercase())
            .map(String::as_str)
    }

    pub fn is_supported(&self, mime_type: &str) -> bool {
        self.extension_for(mime_type).is_some()
    }

    /// Whether `ext` is the extension of any supported type
    pub fn is_known_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.by_mime.values().any(|known| *known == ext)
    }
}

/// Whitelisted placeholder values for one attachment, already prettified
pub type Placeholders = BTreeMap<&'static str, String>;

/// Renders destination paths for attachments
#[derive(Debug, Clone)]
pub struct FilenameGenerator {
    default_template: Option<String>,
    content_types: ContentTypes,
}

impl FilenameGenerator {
    pub fn new(default_template: Option<String>, content_types: ContentTypes) -> Self {
        Self {
            default_template,
            content_types,
        }
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    /// Subscription override, then app default, then the fixed fallback
    pub fn effective_template<'a>(&'a self, subscription: &'a Subscription) -> &'a str {
        subscription
            .filename_template
            .as_deref()
            .or(self.default_template.as_deref())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(FALLBACK_FILENAME_TEMPLATE)
    }

    /// Path of an attachment relative to the subscription's content directory
    pub fn generate(
        &self,
        subscription: &Subscription,
        episode: &Episode,
        attachment_index: usize,
    ) -> Result<PathBuf, FilenameError> {
        let mime_type = episode
            .files
            .get(attachment_index)
            .map(|a| a.mime_type.as_str())
            .unwrap_or_default();
        let values = build_placeholders(subscription, episode, mime_type, &self.content_types)?;
        let ext = values["ext"].clone();

        render(
            self.effective_template(subscription),
            &values,
            &ext,
            &self.content_types,
            attachment_index,
            episode.files.len(),
        )
    }

    /// Absolute destination below `content_dir`
    pub fn destination(
        &self,
        subscription: &Subscription,
        content_dir: &Path,
        episode: &Episode,
        attachment_index: usize,
    ) -> Result<PathBuf, FilenameError> {
        Ok(content_dir.join(self.generate(subscription, episode, attachment_index)?))
    }
}

/// Build the placeholder map for one attachment
pub fn build_placeholders(
    subscription: &Subscription,
    episode: &Episode,
    mime_type: &str,
    content_types: &ContentTypes,
) -> Result<Placeholders, FilenameError> {
    let ext = content_types
        .extension_for(mime_type)
        .ok_or_else(|| FilenameError::UnsupportedContentType {
            mime_type: mime_type.to_string(),
        })?;
    let kind = mime_type
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let title = episode
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(&episode.id);
    let date = &episode.pubdate;

    let mut values = Placeholders::new();
    values.insert("subscription_name", prettify(&subscription.name));
    values.insert("subscription_title", prettify(subscription.display_title()));
    values.insert("title", prettify(title));
    values.insert("id", prettify(&episode.id));
    values.insert("year", format!("{:04}", date.year()));
    values.insert("month", format!("{:02}", date.month()));
    values.insert("day", format!("{:02}", date.day()));
    values.insert("hour", format!("{:02}", date.hour()));
    values.insert("minute", format!("{:02}", date.minute()));
    values.insert("second", format!("{:02}", date.second()));
    values.insert(
        "pub_date",
        format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day()),
    );
    values.insert("ext", ext.to_string());
    values.insert("kind", prettify(&kind));
    Ok(values)
}

/// Substitute `values` into `template` and turn the result into a relative path.
///
/// `/` in the template separates directories. The last component gets the
/// canonical extension, plus an `_NN` suffix when the episode has several
/// attachments and `index` is not the first.
pub fn render(
    template: &str,
    values: &Placeholders,
    ext: &str,
    content_types: &ContentTypes,
    index: usize,
    attachment_count: usize,
) -> Result<PathBuf, FilenameError> {
    let rendered = substitute(template, values)?;

    let mut components: Vec<String> = rendered
        .split('/')
        .map(sanitize_component)
        .filter(|c| !c.is_empty() && c != "." && c != "..")
        .collect();

    let last = components.pop().unwrap_or_default();
    let stem = match last.rsplit_once('.') {
        Some((stem, existing)) if content_types.is_known_extension(existing) => stem,
        _ => last.as_str(),
    };
    let stem = stem.trim_end_matches(['_', '-', '.', ' ']);
    if stem.is_empty() {
        return Err(FilenameError::EmptyName {
            template: template.to_string(),
        });
    }

    let suffix = if attachment_count > 1 && index > 0 {
        format!("_{:02}", index)
    } else {
        String::new()
    };
    components.push(format!("{}{}.{}", stem, suffix, ext));

    Ok(components.iter().collect())
}

/// Replace `{name}` placeholders; `{{` and `}}` are literal braces
fn substitute(template: &str, values: &Placeholders) -> Result<String, FilenameError> {
    let malformed = || FilenameError::MalformedTemplate {
        template: template.to_string(),
    };

    let mut out = String::with_capacity(template.len() * 2);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(malformed()),
                        Some(c) => name.push(c),
                    }
                }
                let value = values
                    .get(name.trim())
                    .ok_or(FilenameError::UnknownPlaceholder { name })?;
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(malformed()),
            c => out.push(c),
        }
    }

    Ok(out)
}

/// Weak sanitizer applied to each rendered path component
fn sanitize_component(component: &str) -> String {
    component
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Make a single placeholder value safe and readable as part of a filename
pub fn prettify(value: &str) -> String {
    let mut mapped = String::with_capacity(value.len());

    for c in value.chars() {
        if is_separator(c) {
            mapped.push('_');
        } else if let Some(ascii) = transliterate(c) {
            mapped.push_str(ascii);
        } else if c.is_ascii_alphanumeric() || c.is_ascii_punctuation() {
            mapped.push(c);
        }
    }

    let collapsed = collapse_separators(&mapped);
    collapsed.trim_matches(['_', '-', '.']).to_string()
}

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '/' | '\\'
                | ':'
                | ';'
                | ','
                | '|'
                | '"'
                | '\''
                | '`'
                | '*'
                | '?'
                | '!'
                | '<'
                | '>'
                | '('
                | ')'
                | '['
                | ']'
                | '{'
                | '}'
                | '#'
        )
}

fn transliterate(c: char) -> Option<&'static str> {
    let ascii = match c {
        '&' => "and",
        'ä' => "ae",
        'ö' => "oe",
        'ü' => "ue",
        'Ä' => "Ae",
        'Ö' => "Oe",
        'Ü' => "Ue",
        'ß' => "ss",
        'à' | 'á' | 'â' | 'ã' | 'å' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Å' => "A",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'È' | 'É' | 'Ê' | 'Ë' => "E",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' => "I",
        'ò' | 'ó' | 'ô' | 'õ' | 'ø' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ø' => "O",
        'ù' | 'ú' | 'û' => "u",
        'Ù' | 'Ú' | 'Û' => "U",
        'ç' => "c",
        'Ç' => "C",
        'ñ' => "n",
        'Ñ' => "N",
        _ => return None,
    };
    Some(ascii)
}

/// Collapse runs of `-`, `_` and `.` into the first character of the run
fn collapse_separators(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_separator = false;

    for c in s.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !last_was_separator {
                result.push(c);
                last_was_separator = true;
            }
        } else {
            result.push(c);
            last_was_separator = false;
        }
    }

    result
}

/// Return `path`, or the first free `stem-N.ext` variant of it.
///
/// A path equal to `own` (the attachment's current file) is not a collision.
pub fn resolve_collision(path: &Path, own: Option<&Path>) -> Result<PathBuf, FilenameError> {
    let is_free = |candidate: &Path| own == Some(candidate) || !candidate.exists();

    if is_free(path) {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    for attempt in 1..=MAX_COLLISION_ATTEMPTS {
        let name = match &ext {
            Some(ext) => format!("{}-{}.{}", stem, attempt, ext),
            None => format!("{}-{}", stem, attempt),
        };
        let candidate = path.with_file_name(name);
        if is_free(&candidate) {
            return Ok(candidate);
        }
    }

    Err(FilenameError::TooManyCollisions {
        path: path.to_path_buf(),
        attempts: MAX_COLLISION_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attachment, Pubdate};
    use tempfile::tempdir;

    fn content_types() -> ContentTypes {
        let mut map = BTreeMap::new();
        map.insert("audio/mpeg".to_string(), "mp3".to_string());
        map.insert("audio/ogg".to_string(), "ogg".to_string());
        map.insert("AUDIO/FLAC".to_string(), ".flac".to_string());
        ContentTypes::new(&map)
    }

    fn generator(default_template: Option<&str>) -> FilenameGenerator {
        FilenameGenerator::new(default_template.map(String::from), content_types())
    }

    fn make_episode(title: Option<&str>, mimes: &[&str]) -> Episode {
        Episode {
            id: "guid-42".to_string(),
            title: title.map(String::from),
            description: None,
            pubdate: Pubdate([2013, 9, 4, 7, 5, 3]),
            files: mimes
                .iter()
                .enumerate()
                .map(|(i, m)| Attachment::new(format!("https://example.com/{}", i), *m))
                .collect(),
        }
    }

    fn subscription(template: Option<&str>) -> Subscription {
        let mut sub = Subscription::new("plan-b", "https://example.com/feed");
        sub.title = Some("1LIVE Plan B".to_string());
        sub.filename_template = template.map(String::from);
        sub
    }

    // === Content types ===

    #[test]
    fn content_types_match_case_insensitively() {
        let types = content_types();
        assert_eq!(types.extension_for("audio/MPEG"), Some("mp3"));
        assert_eq!(types.extension_for("AUDIO/ogg"), Some("ogg"));
        assert_eq!(types.extension_for("audio/flac"), Some("flac"));
        assert!(!types.is_supported("image/jpeg"));
        assert!(!types.is_supported(""));
    }

    #[test]
    fn known_extensions_come_from_the_mapping() {
        let types = content_types();
        assert!(types.is_known_extension("mp3"));
        assert!(types.is_known_extension("OGG"));
        assert!(!types.is_known_extension("html"));
    }

    // === Prettify ===

    #[test]
    fn prettify_maps_separators_to_underscore() {
        assert_eq!(prettify("a b/c\\d:e"), "a_b_c_d_e");
    }

    #[test]
    fn prettify_transliterates_diacritics_and_ampersand() {
        assert_eq!(prettify("Über Käse & Brötchen"), "Ueber_Kaese_and_Broetchen");
        assert_eq!(prettify("Café"), "Cafe");
    }

    #[test]
    fn prettify_drops_other_characters() {
        assert_eq!(prettify("Hello 🎙️ World"), "Hello_World");
        assert_eq!(prettify("中文"), "");
    }

    #[test]
    fn prettify_collapses_separator_runs() {
        assert_eq!(prettify("a - - b"), "a_b");
        assert_eq!(prettify("a...b"), "a.b");
        assert_eq!(prettify("a__--b"), "a_b");
    }

    #[test]
    fn prettify_trims_leading_and_trailing_separators() {
        assert_eq!(prettify("  --hello--  "), "hello");
        assert_eq!(prettify("..hidden"), "hidden");
    }

    #[test]
    fn prettify_keeps_dates_intact() {
        assert_eq!(prettify("2013-09-04"), "2013-09-04");
    }

    // === Substitution ===

    #[test]
    fn unknown_placeholder_is_rejected() {
        let values = Placeholders::new();
        assert!(matches!(
            substitute("{nope}", &values),
            Err(FilenameError::UnknownPlaceholder { name }) if name == "nope"
        ));
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        let values = Placeholders::new();
        assert!(matches!(
            substitute("{title", &values),
            Err(FilenameError::MalformedTemplate { .. })
        ));
        assert!(matches!(
            substitute("title}", &values),
            Err(FilenameError::MalformedTemplate { .. })
        ));
    }

    #[test]
    fn doubled_braces_are_literal() {
        let mut values = Placeholders::new();
        values.insert("id", "x".to_string());
        assert_eq!(substitute("{{{id}}}", &values).unwrap(), "{x}");
    }

    // === Generation ===

    #[test]
    fn fallback_template_uses_date_and_title() {
        let filenames = generator(None);
        let episode = make_episode(Some("Vegan ist der Plan"), &["audio/mpeg"]);

        assert_eq!(
            filenames.generate(&subscription(None), &episode, 0).unwrap(),
            PathBuf::from("2013-09-04_Vegan_ist_der_Plan.mp3")
        );
    }

    #[test]
    fn subscription_template_overrides_app_default() {
        let filenames = generator(Some("{id}"));
        let episode = make_episode(Some("Title"), &["audio/mpeg"]);

        assert_eq!(
            filenames.generate(&subscription(None), &episode, 0).unwrap(),
            PathBuf::from("guid-42.mp3")
        );
        assert_eq!(
            filenames.generate(&subscription(Some("{year}{month}{day}-{hour}{minute}{second}")), &episode, 0)
                .unwrap(),
            PathBuf::from("20130904-070503.mp3")
        );
    }

    #[test]
    fn title_falls_back_to_id() {
        let filenames = generator(None);
        let episode = make_episode(None, &["audio/mpeg"]);

        assert_eq!(
            filenames.generate(&subscription(None), &episode, 0).unwrap(),
            PathBuf::from("2013-09-04_guid-42.mp3")
        );
    }

    #[test]
    fn template_slashes_create_subdirectories() {
        let filenames = generator(None);
        let episode = make_episode(Some("A/B: C"), &["audio/ogg"]);
        let sub = subscription(Some("{subscription_title}/{year}/{title}"));

        assert_eq!(
            filenames.generate(&sub, &episode, 0).unwrap(),
            PathBuf::from("1LIVE_Plan_B/2013/A_B_C.ogg")
        );
    }

    #[test]
    fn parent_directory_components_are_dropped() {
        let filenames = generator(None);
        let episode = make_episode(Some("x"), &["audio/mpeg"]);
        let sub = subscription(Some("../../{title}"));

        assert_eq!(filenames.generate(&sub, &episode, 0).unwrap(), PathBuf::from("x.mp3"));
    }

    #[test]
    fn known_extension_in_rendered_name_is_replaced() {
        let filenames = generator(None);
        let episode = make_episode(Some("x"), &["audio/ogg"]);
        let sub = subscription(Some("{title}.mp3"));

        assert_eq!(filenames.generate(&sub, &episode, 0).unwrap(), PathBuf::from("x.ogg"));
    }

    #[test]
    fn unknown_extension_in_rendered_name_is_kept() {
        let filenames = generator(None);
        let episode = make_episode(Some("x"), &["audio/mpeg"]);
        let sub = subscription(Some("{title}.part1"));

        assert_eq!(
            filenames.generate(&sub, &episode, 0).unwrap(),
            PathBuf::from("x.part1.mp3")
        );
    }

    #[test]
    fn index_suffix_only_for_later_attachments() {
        let filenames = generator(Some("{title}"));
        let episode = make_episode(Some("x"), &["audio/mpeg", "audio/ogg", "audio/mpeg"]);
        let sub = subscription(None);

        assert_eq!(filenames.generate(&sub, &episode, 0).unwrap(), PathBuf::from("x.mp3"));
        assert_eq!(filenames.generate(&sub, &episode, 1).unwrap(), PathBuf::from("x_01.ogg"));
        assert_eq!(filenames.generate(&sub, &episode, 2).unwrap(), PathBuf::from("x_02.mp3"));
    }

    #[test]
    fn generation_is_deterministic() {
        let filenames = generator(None);
        let episode = make_episode(Some("Same Input"), &["audio/mpeg"]);
        let sub = subscription(None);

        assert_eq!(
            filenames.generate(&sub, &episode, 0).unwrap(),
            filenames.generate(&sub, &episode, 0).unwrap()
        );
    }

    #[test]
    fn unsupported_mime_cannot_be_named() {
        let filenames = generator(None);
        let episode = make_episode(Some("x"), &["text/html"]);

        assert!(matches!(
            filenames.generate(&subscription(None), &episode, 0),
            Err(FilenameError::UnsupportedContentType { .. })
        ));
    }

    #[test]
    fn empty_rendered_name_is_an_error() {
        let filenames = generator(None);
        let episode = make_episode(Some("中文"), &["audio/mpeg"]);
        let sub = subscription(Some("{title}"));

        assert!(matches!(
            filenames.generate(&sub, &episode, 0),
            Err(FilenameError::EmptyName { .. })
        ));
    }

    #[test]
    fn kind_placeholder_is_mime_top_level_type() {
        let filenames = generator(None);
        let episode = make_episode(Some("x"), &["audio/mpeg"]);
        let sub = subscription(Some("{kind}/{title}"));

        assert_eq!(
            filenames.generate(&sub, &episode, 0).unwrap(),
            PathBuf::from("audio/x.mp3")
        );
    }

    // === Collisions ===

    #[test]
    fn free_path_is_returned_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        assert_eq!(resolve_collision(&path, None).unwrap(), path);
    }

    #[test]
    fn taken_path_gets_numeric_disambiguator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"x").unwrap();
        std::fs::write(dir.path().join("a-1.mp3"), b"x").unwrap();

        assert_eq!(
            resolve_collision(&path, None).unwrap(),
            dir.path().join("a-2.mp3")
        );
    }

    #[test]
    fn own_file_is_not_a_collision() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"x").unwrap();

        assert_eq!(resolve_collision(&path, Some(&path)).unwrap(), path);
    }

    #[test]
    fn collision_without_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain");
        std::fs::write(&path, b"x").unwrap();

        assert_eq!(
            resolve_collision(&path, None).unwrap(),
            dir.path().join("plain-1")
        );
    }
}
