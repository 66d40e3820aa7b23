use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed, FeedType};
use serde_json::Value;
use thiserror::Error;

use super::media::Enclosure;
use super::podcast;
use crate::storage::{FeedKind, FeedSource};
use crate::util::{clean_line, parse_media_url};

// ============================================================================
// Defaults for missing fields
// ============================================================================

/// Title used when an entry has none
pub const DEFAULT_TITLE: &str = "Untitled";

/// Body used when an entry has none
pub const DEFAULT_BODY: &str = "";

/// External URL used when an entry's link is absent or unparseable
pub const FALLBACK_URL: &str = "https://example.com";

// ============================================================================
// Error Types
// ============================================================================

/// The whole document could not be read. The source is excluded from the run.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Not a recognizable RSS, Atom or JSON Feed document
    #[error("Malformed feed document: {0}")]
    Document(String),
    /// Podcast channel XML broke mid-document
    #[error("Malformed podcast channel: {0}")]
    Xml(String),
}

/// A single entry could not be projected. The entry is skipped; its
/// siblings are still processed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("podcast item has no audio enclosure")]
    MissingAudio,
    #[error("podcast item audio URL is not usable: {0}")]
    InvalidAudioUrl(String),
}

// ============================================================================
// Normalized Model
// ============================================================================

/// One feed item in the format-independent shape.
///
/// Transient: always projected into an `Article` or `Episode` before storage.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub body: String,
    pub source_name: String,
    /// Unix timestamp; ingestion time when the feed gave none
    pub published_at: i64,
    /// Audio URL for podcast items, explicit thumbnail for articles
    pub media_url: Option<String>,
    pub external_url: String,
    pub kind: FeedKind,
    pub enclosures: Vec<Enclosure>,
    /// Raw `itunes:duration` text (podcast items only)
    pub duration: Option<String>,
    /// Item artwork, falling back to channel artwork (podcast items only)
    pub artwork_url: Option<String>,
}

/// Entries from one document plus the number of entries that were skipped.
#[derive(Debug, Default)]
pub struct Normalized {
    pub entries: Vec<FeedEntry>,
    pub skipped: usize,
}

impl Normalized {
    pub(crate) fn push(&mut self, result: Result<FeedEntry, EntryError>) {
        match result {
            Ok(entry) => self.entries.push(entry),
            Err(e) => {
                tracing::debug!(reason = %e, "Skipping malformed entry");
                self.skipped += 1;
            }
        }
    }
}

/// Parsed document tagged by wire format.
#[derive(Debug)]
pub enum FeedDocument {
    Rss(Feed),
    Atom(Feed),
    Json(Feed),
}

impl FeedDocument {
    /// Detect the format and parse. RSS 0.9x, 1.0 and 2.0 all map to `Rss`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let feed = feed_rs::parser::parse(bytes).map_err(|e| ParseError::Document(e.to_string()))?;
        Ok(match feed.feed_type {
            FeedType::Atom => FeedDocument::Atom(feed),
            FeedType::JSON => FeedDocument::Json(feed),
            FeedType::RSS0 | FeedType::RSS1 | FeedType::RSS2 => FeedDocument::Rss(feed),
        })
    }
}

/// Parse raw bytes from `source` into normalized entries.
///
/// Podcast sources whose document is RSS take the podcast path; every other
/// combination (including podcast sources serving Atom or JSON) is read as
/// articles.
pub fn normalize(
    bytes: &[u8],
    source: &FeedSource,
    now: DateTime<Utc>,
) -> Result<Normalized, ParseError> {
    let document = FeedDocument::parse(bytes)?;
    let now = now.timestamp();

    match (document, source.kind) {
        (FeedDocument::Rss(_), FeedKind::Podcast) => {
            podcast::parse_channel(bytes, &source.name, now)
        }
        (FeedDocument::Rss(feed), FeedKind::Article) => Ok(normalize_rss(feed, &source.name, now)),
        (FeedDocument::Atom(feed), _) => Ok(normalize_atom(feed, &source.name, now)),
        (FeedDocument::Json(feed), _) => Ok(normalize_json(feed, bytes, &source.name, now)),
    }
}

// ============================================================================
// Per-format normalization
// ============================================================================

/// RSS: body is the item `description`, falling back to `content:encoded`.
fn normalize_rss(feed: Feed, source_name: &str, now: i64) -> Normalized {
    let mut out = Normalized::default();
    for entry in feed.entries {
        let body = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()));
        out.entries.push(project_article(entry, body, None, source_name, now));
    }
    out
}

/// Atom: body is `content`, falling back to `summary`.
fn normalize_atom(feed: Feed, source_name: &str, now: i64) -> Normalized {
    let mut out = Normalized::default();
    for entry in feed.entries {
        let body = entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));
        out.entries.push(project_article(entry, body, None, source_name, now));
    }
    out
}

/// JSON Feed: `content_html` is preferred over `content_text`, then `summary`.
///
/// feed-rs does not carry the item `image`, so it is read from the raw
/// document. Items keep their document order in the parsed feed.
fn normalize_json(feed: Feed, bytes: &[u8], source_name: &str, now: i64) -> Normalized {
    let mut images = json_item_images(bytes).into_iter();
    let mut out = Normalized::default();
    for entry in feed.entries {
        let body = entry
            .content
            .as_ref()
            .filter(|c| c.content_type.essence().to_string() == "text/html")
            .and_then(|c| c.body.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));
        let image = images.next().flatten();
        out.entries.push(project_article(entry, body, image, source_name, now));
    }
    out
}

/// `items[].image` per item, `None` where absent or not a string.
fn json_item_images(bytes: &[u8]) -> Vec<Option<String>> {
    let Ok(document) = serde_json::from_slice::<Value>(bytes) else {
        return Vec::new();
    };
    document
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    item.get("image")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Missing fields take the named defaults; an article entry is never dropped.
fn project_article(
    entry: Entry,
    body: Option<String>,
    image: Option<String>,
    source_name: &str,
    now: i64,
) -> FeedEntry {
    let title = entry.title.as_ref().and_then(|t| clean_line(&t.content));
    let external_url = select_entry_link(&entry)
        .filter(|l| parse_media_url(l, None).is_some())
        .unwrap_or_else(|| FALLBACK_URL.to_string());

    FeedEntry {
        title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        body: body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
        source_name: source_name.to_string(),
        published_at: entry.published.map(|dt| dt.timestamp()).unwrap_or(now),
        media_url: image.or_else(|| thumbnail(&entry)),
        external_url,
        kind: FeedKind::Article,
        enclosures: enclosures(&entry),
        duration: None,
        artwork_url: None,
    }
}

/// Prefer an `alternate` (or rel-less) link, then any non-empty link.
fn select_entry_link(entry: &Entry) -> Option<String> {
    let alternate = entry.links.iter().find(|link| {
        !link.href.trim().is_empty()
            && link
                .rel
                .as_deref()
                .map_or(true, |rel| rel.is_empty() || rel.eq_ignore_ascii_case("alternate"))
    });

    alternate
        .or_else(|| entry.links.iter().find(|l| !l.href.trim().is_empty()))
        .map(|link| link.href.trim().to_string())
}

/// Media objects (RSS `<enclosure>`, Media RSS) and Atom `rel="enclosure"` links.
fn enclosures(entry: &Entry) -> Vec<Enclosure> {
    let media = entry.media.iter().flat_map(|m| m.content.iter()).filter_map(|c| {
        c.url
            .as_ref()
            .map(|url| Enclosure::new(url.to_string(), c.content_type.as_ref().map(|m| m.to_string())))
    });

    let links = entry
        .links
        .iter()
        .filter(|l| l.rel.as_deref().is_some_and(|r| r.eq_ignore_ascii_case("enclosure")))
        .map(|l| Enclosure::new(l.href.clone(), l.media_type.clone()));

    media.chain(links).collect()
}

/// An explicit thumbnail declared by the format, if any.
fn thumbnail(entry: &Entry) -> Option<String> {
    entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .next()
}
