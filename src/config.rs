//! Configuration file parser for `cyberpulse.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which carries the built-in cybersecurity sources. Unknown keys are
//! accepted by serde but logged as a warning, since they are usually typos.
use anyhow::Context;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::storage::{retention::DEFAULT_RETENTION_DAYS, FeedKind, FeedSource};
use crate::util::validate_url;

const NEWS_CATEGORY: &str = "Security News";
const PODCAST_CATEGORY: &str = "Security Podcasts";

/// Built-in sources: (name, url, kind)
const DEFAULT_FEEDS: [(&str, &str, FeedKind); 6] = [
    ("Krebs on Security", "https://krebsonsecurity.com/feed/", FeedKind::Article),
    ("The Hacker News", "https://feeds.feedburner.com/TheHackersNews", FeedKind::Article),
    ("Threatpost", "https://threatpost.com/feed/", FeedKind::Article),
    ("Darknet Diaries", "https://feeds.megaphone.fm/darknetdiaries", FeedKind::Podcast),
    ("Security Now", "https://feeds.twit.tv/sn.xml", FeedKind::Podcast),
    ("SANS Internet Stormcast", "https://isc.sans.edu/podcast.xml", FeedKind::Podcast),
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sources to refresh. Replaces the built-in list when present.
    #[serde(deserialize_with = "deserialize_feeds")]
    pub feeds: Vec<FeedSource>,

    /// Unsaved articles older than this are pruned.
    pub retention_days: u32,

    /// Upper bound on sources fetched at once.
    pub max_concurrent_fetches: usize,

    /// Per-request timeout for feed and image fetches.
    pub fetch_timeout_secs: u64,

    /// Feed documents larger than this are rejected.
    pub max_feed_bytes: usize,

    /// Thumbnails and artwork larger than this are dropped.
    pub max_image_bytes: usize,

    /// Whether to fetch image bytes for newly inserted articles and episodes.
    pub fetch_images: bool,

    /// Where downloaded episode audio is stored.
    pub download_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            retention_days: DEFAULT_RETENTION_DAYS as u32,
            max_concurrent_fetches: 10,
            fetch_timeout_secs: 30,
            max_feed_bytes: 10 * 1024 * 1024,
            max_image_bytes: 2 * 1024 * 1024,
            fetch_images: true,
            download_dir: default_data_dir().join("episodes"),
        }
    }
}

/// One `[[feeds]]` table as written in the file.
#[derive(Debug, Deserialize)]
struct RawFeed {
    name: String,
    url: String,
    #[serde(default = "default_kind")]
    kind: FeedKind,
    #[serde(default)]
    category: Option<String>,
}

fn default_kind() -> FeedKind {
    FeedKind::Article
}

fn default_category(kind: FeedKind) -> &'static str {
    match kind {
        FeedKind::Article => NEWS_CATEGORY,
        FeedKind::Podcast => PODCAST_CATEGORY,
    }
}

/// The built-in cybersecurity news and podcast sources.
pub fn default_feeds() -> Vec<FeedSource> {
    DEFAULT_FEEDS
        .iter()
        .map(|(name, url, kind)| FeedSource::new(*name, *url, *kind, default_category(*kind)))
        .collect()
}

/// Entries with unusable URLs are dropped with a warning; the rest load.
fn deserialize_feeds<'de, D>(deserializer: D) -> Result<Vec<FeedSource>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<RawFeed>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|feed| match validate_url(feed.url.trim()) {
            Ok(url) => {
                let category = feed
                    .category
                    .unwrap_or_else(|| default_category(feed.kind).to_string());
                Some(FeedSource::new(feed.name, url.as_str(), feed.kind, category))
            }
            Err(e) => {
                tracing::warn!(name = %feed.name, url = %feed.url, error = %e, "Skipping feed with invalid URL");
                None
            }
        })
        .collect())
}

/// `$HOME/.local/share/cyberpulse`, or `./cyberpulse` when `HOME` is unset.
pub fn default_data_dir() -> PathBuf {
    data_dir_from_home().unwrap_or_else(|_| PathBuf::from("cyberpulse"))
}

fn data_dir_from_home() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("cyberpulse"))
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "feeds",
        "retention_days",
        "max_concurrent_fetches",
        "fetch_timeout_secs",
        "max_feed_bytes",
        "max_image_bytes",
        "fetch_images",
        "download_dir",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            retention_days = config.retention_days,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Retention threshold for [`prune_articles`](crate::storage::retention::prune_articles)
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
