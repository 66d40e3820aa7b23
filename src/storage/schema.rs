use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, StoreError};

const MEMORY_PATH: &str = ":memory:";

// ============================================================================
// Database
// ============================================================================

/// SQLite-backed implementation of the [`Store`](super::Store) contract.
///
/// Cloning is cheap: clones share one connection pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// Pass `":memory:"` for a private in-memory database (tests, previews).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Locked` if another process holds the database
    /// (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN) and `StoreError::Migration`
    /// when the schema could not be applied.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Create the file owner-only before the pool touches it
        #[cfg(unix)]
        if path != MEMORY_PATH {
            use std::os::unix::fs::PermissionsExt;
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if let Some(parent) = db_path.parent() {
                if parent.exists() {
                    use std::os::unix::fs::OpenOptionsExt;
                    let _file = std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(db_path)
                        .ok(); // SQLite reports the real error at connect time
                }
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .pragma("busy_timeout", "5000");

        // Shared-cache memory databases take table locks that busy_timeout does not
        // cover, so they get a single connection.
        let mut pool_options = SqlitePoolOptions::new();
        if path == MEMORY_PATH {
            // Closing the only connection would drop the whole database
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            pool_options = pool_options.max_connections(5);
        }
        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                StoreError::Locked
            } else {
                StoreError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Apply the schema inside a single transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // external_url is the natural key: one article per URL
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                source TEXT NOT NULL,
                external_url TEXT UNIQUE NOT NULL,
                image BLOB,
                published_at INTEGER NOT NULL,
                severity TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_saved INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // audio_url is the natural key: one episode per enclosure
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                audio_url TEXT UNIQUE NOT NULL,
                podcast_name TEXT NOT NULL,
                published_at INTEGER NOT NULL,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                image BLOB,
                is_downloaded INTEGER NOT NULL DEFAULT 0,
                is_played INTEGER NOT NULL DEFAULT 0,
                local_audio_path TEXT,
                CHECK (local_audio_path IS NULL OR is_downloaded = 1)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        // Severity filter in list_articles orders by date within one level
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_severity_published ON articles(severity, published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        // Retention sweep: WHERE is_saved = 0 AND published_at < ?
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_unsaved_published ON articles(published_at) WHERE is_saved = 0",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_episodes_podcast_published ON episodes(podcast_name, published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
