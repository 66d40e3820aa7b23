use async_trait::async_trait;
use std::io::ErrorKind;

use super::schema::Database;
use super::types::{Article, Episode, Severity, StoreError, UpsertOutcome};

/// Persistence contract consumed by ingestion, retention and downloads.
///
/// Implementations must honor the natural-key invariants: at most one
/// article per `external_url` and one episode per `audio_url`. Callers
/// serialize concurrent upserts of the same key themselves (see
/// [`KeyLocks`](crate::feed::KeyLocks)).
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_article(&self, article: &Article) -> Result<UpsertOutcome, StoreError>;

    async fn upsert_episode(&self, episode: &Episode) -> Result<UpsertOutcome, StoreError>;

    async fn find_article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError>;

    async fn find_episode_by_audio_url(&self, url: &str) -> Result<Option<Episode>, StoreError>;

    /// Newest first
    async fn list_articles(&self, severity: Option<Severity>) -> Result<Vec<Article>, StoreError>;

    /// Returns the number of articles removed
    async fn delete_articles_older_than(
        &self,
        cutoff: i64,
        exclude_saved: bool,
    ) -> Result<u64, StoreError>;

    async fn get_episode(&self, id: &str) -> Result<Option<Episode>, StoreError>;

    async fn mark_episode_downloaded(&self, id: &str, path: &str) -> Result<(), StoreError>;

    async fn clear_episode_download(&self, id: &str) -> Result<(), StoreError>;

    /// Remove a downloaded file. A file that is already gone is not an error.
    async fn delete_local_file(&self, path: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path, "Local file already removed");
                Ok(())
            }
            Err(source) => Err(StoreError::File {
                path: path.to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl Store for Database {
    async fn upsert_article(&self, article: &Article) -> Result<UpsertOutcome, StoreError> {
        Database::upsert_article(self, article).await
    }

    async fn upsert_episode(&self, episode: &Episode) -> Result<UpsertOutcome, StoreError> {
        Database::upsert_episode(self, episode).await
    }

    async fn find_article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        Database::find_article_by_url(self, url).await
    }

    async fn find_episode_by_audio_url(&self, url: &str) -> Result<Option<Episode>, StoreError> {
        Database::find_episode_by_audio_url(self, url).await
    }

    async fn list_articles(&self, severity: Option<Severity>) -> Result<Vec<Article>, StoreError> {
        Database::list_articles(self, severity).await
    }

    async fn delete_articles_older_than(
        &self,
        cutoff: i64,
        exclude_saved: bool,
    ) -> Result<u64, StoreError> {
        Database::delete_articles_older_than(self, cutoff, exclude_saved).await
    }

    async fn get_episode(&self, id: &str) -> Result<Option<Episode>, StoreError> {
        Database::get_episode(self, id).await
    }

    async fn mark_episode_downloaded(&self, id: &str, path: &str) -> Result<(), StoreError> {
        Database::mark_episode_downloaded(self, id, path).await
    }

    async fn clear_episode_download(&self, id: &str) -> Result<(), StoreError> {
        Database::clear_episode_download(self, id).await
    }
}
