use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the database lock
    #[error("The cyberpulse database is locked by another process")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// No record exists with the given id
    #[error("No {kind} with id {id}")]
    NotFound { kind: &'static str, id: String },

    /// Removing a downloaded file failed
    #[error("Failed to remove local file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, mapping SQLite lock conditions to [`StoreError::Locked`]
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return StoreError::Locked;
        }
        StoreError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as text
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Enumerations
// ============================================================================

/// Derived urgency of an article.
///
/// Ordered so that `Critical > High > Medium > Low`. Recomputed from the
/// article text on every ingestion; never user-editable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All levels, most severe first
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown severity level: {0}")]
pub struct UnknownSeverity(String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

/// What a configured source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Article,
    Podcast,
}

// ============================================================================
// Data Structures
// ============================================================================

/// A configured feed origin. Immutable for the duration of a refresh run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub id: String,
    pub name: String,
    pub url: String,
    pub kind: FeedKind,
    pub category: String,
    /// Unix timestamp of the last successful fetch, if any
    pub last_fetched_at: Option<i64>,
}

impl FeedSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        kind: FeedKind,
        category: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            id: stable_id(&url),
            name: name.into(),
            url,
            kind,
            category: category.into(),
            last_fetched_at: None,
        }
    }
}

/// Persisted news article. At most one row exists per `external_url`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Article {
    /// Stable id derived from `external_url`
    pub id: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub external_url: String,
    pub image: Option<Vec<u8>>,
    /// Unix timestamp
    pub published_at: i64,
    pub severity: Severity,
    pub is_read: bool,
    /// Saved articles are exempt from retention pruning
    pub is_saved: bool,
}

impl Article {
    /// Plain text handed to the narration collaborator.
    pub fn narration_text(&self) -> String {
        let body = crate::util::strip_html(&self.content);
        if body.is_empty() {
            self.title.clone()
        } else {
            format!("{}. {}", self.title, body)
        }
    }
}

/// Persisted podcast episode. At most one row exists per `audio_url`.
///
/// `local_audio_path` is only set while `is_downloaded` is true.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Episode {
    /// Stable id derived from `audio_url`
    pub id: String,
    pub title: String,
    pub summary: String,
    pub audio_url: String,
    pub podcast_name: String,
    /// Unix timestamp
    pub published_at: i64,
    /// 0 when the feed declared no usable duration
    pub duration_seconds: i64,
    pub image: Option<Vec<u8>>,
    pub is_downloaded: bool,
    pub is_played: bool,
    pub local_audio_path: Option<String>,
}

/// Where a player should read an episode from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    Local(String),
    Remote(String),
}

impl Episode {
    /// Local file when downloaded, otherwise the remote enclosure URL.
    pub fn playback_source(&self) -> PlaybackSource {
        match (&self.local_audio_path, self.is_downloaded) {
            (Some(path), true) => PlaybackSource::Local(path.clone()),
            _ => PlaybackSource::Remote(self.audio_url.clone()),
        }
    }
}

/// Result of an upsert keyed by natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Hex SHA-256 of a natural key (external URL or audio URL)
pub fn stable_id(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_severity_round_trips_through_str() {
        for level in Severity::ALL {
            assert_eq!(level.as_str().parse::<Severity>().unwrap(), level);
        }
        assert!("extreme".parse::<Severity>().is_err());
    }

    #[test]
    fn test_stable_id_depends_only_on_key() {
        assert_eq!(stable_id("https://a.example/1"), stable_id("https://a.example/1"));
        assert_ne!(stable_id("https://a.example/1"), stable_id("https://a.example/2"));
        assert_eq!(stable_id("x").len(), 64);
    }

    #[test]
    fn test_playback_source_prefers_local_file() {
        let mut episode = Episode {
            id: stable_id("https://cdn.example/ep.mp3"),
            title: "Ep".into(),
            summary: String::new(),
            audio_url: "https://cdn.example/ep.mp3".into(),
            podcast_name: "Show".into(),
            published_at: 0,
            duration_seconds: 0,
            image: None,
            is_downloaded: false,
            is_played: false,
            local_audio_path: None,
        };
        assert_eq!(
            episode.playback_source(),
            PlaybackSource::Remote("https://cdn.example/ep.mp3".into())
        );

        episode.is_downloaded = true;
        episode.local_audio_path = Some("/data/ep.mp3".into());
        assert_eq!(
            episode.playback_source(),
            PlaybackSource::Local("/data/ep.mp3".into())
        );
    }

    #[test]
    fn test_narration_text_strips_markup() {
        let article = Article {
            id: stable_id("https://news.example/a"),
            title: "Patch now".into(),
            content: "<p>Update <b>today</b></p>".into(),
            source: "News".into(),
            external_url: "https://news.example/a".into(),
            image: None,
            published_at: 0,
            severity: Severity::Low,
            is_read: false,
            is_saved: false,
        };
        assert_eq!(article.narration_text(), "Patch now. Update today");
    }

    #[test]
    fn test_narration_text_skips_scripts_and_decodes_entities() {
        let article = Article {
            id: stable_id("https://news.example/b"),
            title: "Patch Tuesday".into(),
            content: "<p>Microsoft&#8217;s fix</p><script>track(1 > 0)</script>".into(),
            source: "News".into(),
            external_url: "https://news.example/b".into(),
            image: None,
            published_at: 0,
            severity: Severity::Low,
            is_read: false,
            is_saved: false,
        };
        assert_eq!(article.narration_text(), "Patch Tuesday. Microsoft\u{2019}s fix");
    }
}
