use super::schema::Database;
use super::types::{Article, Severity, StoreError, UpsertOutcome};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of articles returned by any single listing (OOM protection)
const MAX_ARTICLES: i64 = 2000;

const ARTICLE_COLUMNS: &str = "id, title, content, source, external_url, image, published_at, \
                               severity, is_read, is_saved";

impl Database {
    // ========================================================================
    // Article Upsert
    // ========================================================================

    /// Insert or refresh an article keyed by `external_url`.
    ///
    /// New rows start unread and unsaved regardless of the flags on `article`.
    /// Existing rows get `title`, `content`, `published_at` and `severity`
    /// refreshed; `is_read`, `is_saved` and `image` are left alone.
    ///
    /// Uses the two-phase INSERT OR IGNORE + UPDATE pattern so the outcome is
    /// known without a separate lookup.
    pub async fn upsert_article(&self, article: &Article) -> Result<UpsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles
                (id, title, content, source, external_url, image, published_at, severity, is_read, is_saved)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0)
        "#,
        )
        .bind(&article.id)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.source)
        .bind(&article.external_url)
        .bind(&article.image)
        .bind(article.published_at)
        .bind(article.severity)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let outcome = if inserted > 0 {
            UpsertOutcome::Inserted
        } else {
            let updated = sqlx::query(
                r#"
                UPDATE articles
                SET title = ?, content = ?, published_at = ?, severity = ?
                WHERE external_url = ?
                  AND (title IS NOT ? OR content IS NOT ? OR published_at IS NOT ? OR severity IS NOT ?)
            "#,
            )
            .bind(&article.title)
            .bind(&article.content)
            .bind(article.published_at)
            .bind(article.severity)
            .bind(&article.external_url)
            .bind(&article.title)
            .bind(&article.content)
            .bind(article.published_at)
            .bind(article.severity)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated > 0 {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Unchanged
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Look up an article by its natural key.
    pub async fn find_article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE external_url = ?");
        let article = sqlx::query_as::<_, Article>(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    pub async fn get_article(&self, id: &str) -> Result<Option<Article>, StoreError> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?");
        let article = sqlx::query_as::<_, Article>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    /// Articles newest first, optionally restricted to one severity level.
    ///
    /// Capped at MAX_ARTICLES (2000) rows.
    pub async fn list_articles(
        &self,
        severity: Option<Severity>,
    ) -> Result<Vec<Article>, StoreError> {
        tracing::debug!(limit = MAX_ARTICLES, severity = ?severity, "list_articles with limit cap");

        let articles = match severity {
            Some(level) => {
                let sql = format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles WHERE severity = ? \
                     ORDER BY published_at DESC LIMIT ?"
                );
                sqlx::query_as::<_, Article>(&sql)
                    .bind(level)
                    .bind(MAX_ARTICLES)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY published_at DESC LIMIT ?"
                );
                sqlx::query_as::<_, Article>(&sql)
                    .bind(MAX_ARTICLES)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(articles)
    }

    /// Case-insensitive substring search over title and content, newest first.
    ///
    /// LIKE wildcards in `query` are escaped so they match literally.
    pub async fn search_articles(&self, query: &str) -> Result<Vec<Article>, StoreError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let escaped = trimmed
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\' \
             ORDER BY published_at DESC LIMIT ?2"
        );
        let articles = sqlx::query_as::<_, Article>(&sql)
            .bind(&pattern)
            .bind(MAX_ARTICLES)
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Mark article as read (idempotent), returns whether it was changed
    pub async fn mark_article_read(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE articles SET is_read = 1 WHERE id = ? AND is_read = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically toggle the saved flag, returning the new value
    pub async fn toggle_article_saved(&self, id: &str) -> Result<bool, StoreError> {
        let row: Option<(bool,)> = sqlx::query_as(
            "UPDATE articles SET is_saved = NOT is_saved WHERE id = ? RETURNING is_saved",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(saved,)| saved).ok_or_else(|| StoreError::NotFound {
            kind: "article",
            id: id.to_string(),
        })
    }

    /// Delete articles published before `cutoff` (unix seconds).
    ///
    /// With `exclude_saved`, saved articles survive regardless of age.
    /// Returns the number of rows removed.
    pub async fn delete_articles_older_than(
        &self,
        cutoff: i64,
        exclude_saved: bool,
    ) -> Result<u64, StoreError> {
        let sql = if exclude_saved {
            "DELETE FROM articles WHERE published_at < ? AND is_saved = 0"
        } else {
            "DELETE FROM articles WHERE published_at < ?"
        };
        let result = sqlx::query(sql).bind(cutoff).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
