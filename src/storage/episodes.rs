use super::schema::Database;
use super::types::{Episode, StoreError, UpsertOutcome};

/// Maximum number of episodes returned by a listing
const MAX_EPISODES: i64 = 2000;

const EPISODE_COLUMNS: &str = "id, title, summary, audio_url, podcast_name, published_at, \
                               duration_seconds, image, is_downloaded, is_played, local_audio_path";

impl Database {
    // ========================================================================
    // Episode Upsert
    // ========================================================================

    /// Insert an episode keyed by `audio_url`.
    ///
    /// Episodes keep their first-ingested fields: re-ingesting a known
    /// `audio_url` changes nothing and reports [`UpsertOutcome::Unchanged`].
    /// New rows start not downloaded and not played.
    pub async fn upsert_episode(&self, episode: &Episode) -> Result<UpsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO episodes
                (id, title, summary, audio_url, podcast_name, published_at, duration_seconds,
                 image, is_downloaded, is_played, local_audio_path)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, NULL)
        "#,
        )
        .bind(&episode.id)
        .bind(&episode.title)
        .bind(&episode.summary)
        .bind(&episode.audio_url)
        .bind(&episode.podcast_name)
        .bind(episode.published_at)
        .bind(episode.duration_seconds)
        .bind(&episode.image)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Unchanged
        })
    }

    // ========================================================================
    // Episode Queries
    // ========================================================================

    pub async fn find_episode_by_audio_url(&self, url: &str) -> Result<Option<Episode>, StoreError> {
        let sql = format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE audio_url = ?");
        let episode = sqlx::query_as::<_, Episode>(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(episode)
    }

    pub async fn get_episode(&self, id: &str) -> Result<Option<Episode>, StoreError> {
        let sql = format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE id = ?");
        let episode = sqlx::query_as::<_, Episode>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(episode)
    }

    /// Episodes newest first, optionally for a single podcast.
    pub async fn list_episodes(&self, podcast_name: Option<&str>) -> Result<Vec<Episode>, StoreError> {
        let episodes = match podcast_name {
            Some(name) => {
                let sql = format!(
                    "SELECT {EPISODE_COLUMNS} FROM episodes WHERE podcast_name = ? \
                     ORDER BY published_at DESC LIMIT ?"
                );
                sqlx::query_as::<_, Episode>(&sql)
                    .bind(name)
                    .bind(MAX_EPISODES)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {EPISODE_COLUMNS} FROM episodes ORDER BY published_at DESC LIMIT ?"
                );
                sqlx::query_as::<_, Episode>(&sql)
                    .bind(MAX_EPISODES)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(episodes)
    }

    // ========================================================================
    // Episode Mutations
    // ========================================================================

    /// Mark an episode as played, returns whether it was changed
    pub async fn mark_episode_played(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE episodes SET is_played = 1 WHERE id = ? AND is_played = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a finished download at `path`.
    pub async fn mark_episode_downloaded(&self, id: &str, path: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE episodes SET is_downloaded = 1, local_audio_path = ? WHERE id = ?",
        )
        .bind(path)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "episode",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Clear both download fields together.
    pub async fn clear_episode_download(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE episodes SET is_downloaded = 0, local_audio_path = NULL WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "episode",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
