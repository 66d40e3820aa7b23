//! Retention policy: age-based article pruning and explicit episode cleanup.
use chrono::{DateTime, Duration, Utc};

use super::store::Store;
use super::types::{Episode, StoreError};

/// Default age after which unsaved articles are pruned
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Remove unsaved articles published more than `max_age` ago.
///
/// Saved articles are never pruned. Episodes are never pruned by age.
pub async fn prune_articles<S: Store + ?Sized>(
    store: &S,
    max_age: Duration,
) -> Result<u64, StoreError> {
    prune_articles_at(store, max_age, Utc::now()).await
}

/// [`prune_articles`] against an explicit clock.
pub async fn prune_articles_at<S: Store + ?Sized>(
    store: &S,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let cutoff = (now - max_age).timestamp();
    let removed = store.delete_articles_older_than(cutoff, true).await?;
    if removed > 0 {
        tracing::info!(
            removed = removed,
            max_age_days = max_age.num_days(),
            "Pruned stale unsaved articles"
        );
    }
    Ok(removed)
}

/// Delete an episode's downloaded audio and clear its download state.
///
/// The file is removed before `is_downloaded`/`local_audio_path` are
/// cleared, so a failed removal leaves the record pointing at the file.
/// Returns the updated episode.
pub async fn delete_downloaded_episode<S: Store + ?Sized>(
    store: &S,
    episode_id: &str,
) -> Result<Episode, StoreError> {
    let episode = store
        .get_episode(episode_id)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            kind: "episode",
            id: episode_id.to_string(),
        })?;

    if let Some(path) = episode.local_audio_path.as_deref() {
        store.delete_local_file(path).await?;
        tracing::info!(episode = %episode.title, path = %path, "Removed downloaded episode");
    }
    store.clear_episode_download(episode_id).await?;

    Ok(Episode {
        is_downloaded: false,
        local_audio_path: None,
        ..episode
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{stable_id, Article, Database, Severity};

    fn article(url: &str, published_at: i64) -> Article {
        Article {
            id: stable_id(url),
            title: "Title".into(),
            content: String::new(),
            source: "Source".into(),
            external_url: url.into(),
            image: None,
            published_at,
            severity: Severity::Low,
            is_read: false,
            is_saved: false,
        }
    }

    #[tokio::test]
    async fn test_saved_article_survives_prune() {
        let db = Database::open(":memory:").await.unwrap();
        let now = Utc::now();
        let year_ago = (now - Duration::days(365)).timestamp();

        let saved = article("https://news.example.com/saved", year_ago);
        let unsaved = article("https://news.example.com/unsaved", year_ago);
        db.upsert_article(&saved).await.unwrap();
        db.upsert_article(&unsaved).await.unwrap();
        db.toggle_article_saved(&saved.id).await.unwrap();

        let removed = prune_articles_at(&db, Duration::days(DEFAULT_RETENTION_DAYS), now)
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(db.get_article(&saved.id).await.unwrap().is_some());
        assert!(db.get_article(&unsaved.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_article_survives_prune() {
        let db = Database::open(":memory:").await.unwrap();
        let now = Utc::now();
        let recent = article(
            "https://news.example.com/recent",
            (now - Duration::days(3)).timestamp(),
        );
        db.upsert_article(&recent).await.unwrap();

        let removed = prune_articles(&db, Duration::days(30)).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_delete_downloaded_episode_removes_file() {
        let db = Database::open(":memory:").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ep.mp3");
        std::fs::write(&path, b"audio").unwrap();

        let episode = Episode {
            id: stable_id("https://cdn.example.com/ep.mp3"),
            title: "Ep".into(),
            summary: String::new(),
            audio_url: "https://cdn.example.com/ep.mp3".into(),
            podcast_name: "Show".into(),
            published_at: 0,
            duration_seconds: 0,
            image: None,
            is_downloaded: false,
            is_played: false,
            local_audio_path: None,
        };
        db.upsert_episode(&episode).await.unwrap();
        assert!(db.mark_episode_played(&episode.id).await.unwrap());
        db.mark_episode_downloaded(&episode.id, path.to_str().unwrap())
            .await
            .unwrap();

        let updated = delete_downloaded_episode(&db, &episode.id).await.unwrap();

        assert!(!updated.is_downloaded);
        assert!(updated.local_audio_path.is_none());
        assert!(!path.exists());
        let stored = db.get_episode(&episode.id).await.unwrap().unwrap();
        assert!(!stored.is_downloaded);
        assert!(stored.local_audio_path.is_none());
        assert!(stored.is_played);
    }

    #[tokio::test]
    async fn test_delete_downloaded_unknown_episode() {
        let db = Database::open(":memory:").await.unwrap();
        let err = delete_downloaded_episode(&db, "missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
