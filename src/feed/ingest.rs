//! Ingestion orchestrator: fetch every configured source concurrently,
//! normalize, classify, and upsert into the store.
use chrono::Utc;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use url::Url;

use super::duration::parse_duration;
use super::fetcher::{FetchError, Fetcher};
use super::locks::KeyLocks;
use super::media::resolve_article_image;
use super::parser::{normalize, EntryError, FeedEntry, ParseError, FALLBACK_URL};
use super::severity::classify_entry;
use crate::config::Config;
use crate::storage::{stable_id, Article, Episode, FeedKind, FeedSource, Store, StoreError, UpsertOutcome};

const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Why a single source was excluded from a refresh run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Storage failed: {0}")]
    Store(#[from] StoreError),
}

/// Per-source entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Malformed entries and podcast items without usable audio
    pub skipped: usize,
}

impl SourceStats {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Outcome of one source within a refresh run.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source_id: String,
    pub name: String,
    /// Unix timestamp at which the source finished; hosts store it as
    /// `last_fetched_at` on success
    pub fetched_at: i64,
    pub result: Result<SourceStats, IngestError>,
}

impl SourceOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Structured result of [`Ingestor::refresh_all`].
///
/// A refresh never fails as a whole. Outcomes are listed in completion
/// order; hosts decide how to surface partial or total failure.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl RefreshReport {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| !o.is_success())
    }

    /// True only when at least one source ran and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| !o.is_success())
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&SourceOutcome, &IngestError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o, e)))
    }

    /// Sum of per-source counts over successful sources
    pub fn totals(&self) -> SourceStats {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .fold(SourceStats::default(), |mut acc, s| {
                acc.inserted += s.inserted;
                acc.updated += s.updated;
                acc.unchanged += s.unchanged;
                acc.skipped += s.skipped;
                acc
            })
    }
}

/// Drives refresh runs against injected store and network collaborators.
pub struct Ingestor<S, F> {
    store: S,
    fetcher: F,
    locks: KeyLocks,
    max_concurrent: usize,
    fetch_images: bool,
}

impl<S: Store, F: Fetcher> Ingestor<S, F> {
    pub fn new(store: S, fetcher: F) -> Self {
        Self {
            store,
            fetcher,
            locks: KeyLocks::new(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            fetch_images: true,
        }
    }

    /// Apply `max_concurrent_fetches` and `fetch_images` from the config.
    pub fn with_config(self, config: &Config) -> Self {
        self.with_max_concurrent(config.max_concurrent_fetches)
            .with_image_fetching(config.fetch_images)
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_image_fetching(mut self, enabled: bool) -> Self {
        self.fetch_images = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Refresh every source concurrently.
    ///
    /// A failing source is logged and reported in its own outcome; it never
    /// aborts its siblings. Entries already upserted stay committed even if
    /// the run is dropped midway.
    pub async fn refresh_all(&self, sources: &[FeedSource]) -> RefreshReport {
        if sources.is_empty() {
            return RefreshReport::default();
        }

        let outcomes: Vec<SourceOutcome> = stream::iter(sources)
            .map(|source| self.refresh_one(source))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let report = RefreshReport { outcomes };
        let totals = report.totals();
        tracing::info!(
            sources = sources.len(),
            failed = report.failed_count(),
            inserted = totals.inserted,
            updated = totals.updated,
            skipped = totals.skipped,
            "Refresh complete"
        );
        report
    }

    /// Refresh a single source.
    pub async fn refresh_one(&self, source: &FeedSource) -> SourceOutcome {
        let result = self.ingest(source).await;

        match &result {
            Ok(stats) => {
                if stats.skipped > 0 {
                    tracing::warn!(feed = %source.url, skipped = stats.skipped, "Malformed entries skipped");
                }
                tracing::debug!(
                    feed = %source.url,
                    inserted = stats.inserted,
                    updated = stats.updated,
                    "Source refreshed"
                );
            }
            Err(e) => {
                tracing::warn!(feed = %source.url, name = %source.name, error = %e, "Source excluded from refresh");
            }
        }

        SourceOutcome {
            source_id: source.id.clone(),
            name: source.name.clone(),
            fetched_at: Utc::now().timestamp(),
            result,
        }
    }

    async fn ingest(&self, source: &FeedSource) -> Result<SourceStats, IngestError> {
        let bytes = self.fetcher.fetch(&source.url).await?;
        let normalized = normalize(&bytes, source, Utc::now())?;

        let mut stats = SourceStats {
            skipped: normalized.skipped,
            ..SourceStats::default()
        };

        for entry in normalized.entries {
            let outcome = match entry.kind {
                FeedKind::Article => self.ingest_article(source, entry).await?,
                FeedKind::Podcast => match self.ingest_episode(entry).await? {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::debug!(feed = %source.url, reason = %e, "Skipping podcast item");
                        stats.skipped += 1;
                        continue;
                    }
                },
            };
            stats.record(outcome);
        }

        Ok(stats)
    }

    async fn ingest_article(
        &self,
        source: &FeedSource,
        entry: FeedEntry,
    ) -> Result<UpsertOutcome, StoreError> {
        let severity = classify_entry(&entry.title, &entry.body);

        let _guard = self.locks.lock(&format!("article:{}", entry.external_url)).await;

        let image = if self.store.find_article_by_url(&entry.external_url).await?.is_none() {
            // Relative image paths resolve against the article, or the feed when
            // the article link was unusable
            let base_raw = if entry.external_url == FALLBACK_URL {
                source.url.as_str()
            } else {
                entry.external_url.as_str()
            };
            let base = Url::parse(base_raw).ok();
            let url = resolve_article_image(
                &entry.enclosures,
                entry.media_url.as_deref(),
                &entry.body,
                base.as_ref(),
            );
            self.fetch_image(url.as_ref().map(Url::as_str)).await
        } else {
            None
        };

        let article = Article {
            id: stable_id(&entry.external_url),
            title: entry.title,
            content: entry.body,
            source: entry.source_name,
            external_url: entry.external_url,
            image,
            published_at: entry.published_at,
            severity,
            is_read: false,
            is_saved: false,
        };
        self.store.upsert_article(&article).await
    }

    /// The inner `Err` is a skipped item, the outer one a store failure.
    async fn ingest_episode(
        &self,
        entry: FeedEntry,
    ) -> Result<Result<UpsertOutcome, EntryError>, StoreError> {
        let Some(audio_url) = entry.media_url else {
            return Ok(Err(EntryError::MissingAudio));
        };

        let duration_seconds = parse_duration(entry.duration.as_deref()).unwrap_or(0);

        let _guard = self.locks.lock(&format!("episode:{}", audio_url)).await;

        if self.store.find_episode_by_audio_url(&audio_url).await?.is_some() {
            return Ok(Ok(UpsertOutcome::Unchanged));
        }

        let image = self.fetch_image(entry.artwork_url.as_deref()).await;

        let episode = Episode {
            id: stable_id(&audio_url),
            title: entry.title,
            summary: entry.body,
            audio_url,
            podcast_name: entry.source_name,
            published_at: entry.published_at,
            duration_seconds: i64::from(duration_seconds),
            image,
            is_downloaded: false,
            is_played: false,
            local_audio_path: None,
        };
        self.store.upsert_episode(&episode).await.map(Ok)
    }

    /// Best-effort: any failure leaves the image absent.
    async fn fetch_image(&self, url: Option<&str>) -> Option<Vec<u8>> {
        let url = url.filter(|_| self.fetch_images)?;
        match self.fetcher.fetch_image(url).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Image fetch failed");
                None
            }
        }
    }
}
