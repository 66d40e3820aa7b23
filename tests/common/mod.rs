//! Stub collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cyberpulse::feed::{FetchError, Fetcher};
use cyberpulse::storage::{Article, Episode, Severity, Store, StoreError, UpsertOutcome};

// ============================================================================
// In-memory store
// ============================================================================

/// Store keyed by natural key, with a fake filesystem for downloaded audio.
#[derive(Default)]
pub struct MemoryStore {
    articles: Mutex<HashMap<String, Article>>,
    episodes: Mutex<HashMap<String, Episode>>,
    files: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an article exactly as given, flags included.
    pub fn seed_article(&self, article: Article) {
        self.articles
            .lock()
            .unwrap()
            .insert(article.external_url.clone(), article);
    }

    pub fn seed_episode(&self, episode: Episode) {
        self.episodes
            .lock()
            .unwrap()
            .insert(episode.audio_url.clone(), episode);
    }

    pub fn article(&self, url: &str) -> Option<Article> {
        self.articles.lock().unwrap().get(url).cloned()
    }

    pub fn article_count(&self) -> usize {
        self.articles.lock().unwrap().len()
    }

    pub fn episode_count(&self) -> usize {
        self.episodes.lock().unwrap().len()
    }

    pub fn save_article(&self, url: &str) {
        if let Some(article) = self.articles.lock().unwrap().get_mut(url) {
            article.is_saved = true;
        }
    }

    pub fn create_file(&self, path: &str) {
        self.files.lock().unwrap().insert(path.to_string());
    }

    pub fn file_exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains(path)
    }

    pub fn deleted_files(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_article(&self, article: &Article) -> Result<UpsertOutcome, StoreError> {
        let mut articles = self.articles.lock().unwrap();
        match articles.get_mut(&article.external_url) {
            Some(existing) => {
                let changed = existing.title != article.title
                    || existing.content != article.content
                    || existing.published_at != article.published_at
                    || existing.severity != article.severity;
                if !changed {
                    return Ok(UpsertOutcome::Unchanged);
                }
                existing.title = article.title.clone();
                existing.content = article.content.clone();
                existing.published_at = article.published_at;
                existing.severity = article.severity;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let mut fresh = article.clone();
                fresh.is_read = false;
                fresh.is_saved = false;
                articles.insert(article.external_url.clone(), fresh);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn upsert_episode(&self, episode: &Episode) -> Result<UpsertOutcome, StoreError> {
        let mut episodes = self.episodes.lock().unwrap();
        if episodes.contains_key(&episode.audio_url) {
            return Ok(UpsertOutcome::Unchanged);
        }
        let mut fresh = episode.clone();
        fresh.is_downloaded = false;
        fresh.is_played = false;
        fresh.local_audio_path = None;
        episodes.insert(episode.audio_url.clone(), fresh);
        Ok(UpsertOutcome::Inserted)
    }

    async fn find_article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        Ok(self.article(url))
    }

    async fn find_episode_by_audio_url(&self, url: &str) -> Result<Option<Episode>, StoreError> {
        Ok(self.episodes.lock().unwrap().get(url).cloned())
    }

    async fn list_articles(&self, severity: Option<Severity>) -> Result<Vec<Article>, StoreError> {
        let mut list: Vec<Article> = self
            .articles
            .lock()
            .unwrap()
            .values()
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(list)
    }

    async fn delete_articles_older_than(
        &self,
        cutoff: i64,
        exclude_saved: bool,
    ) -> Result<u64, StoreError> {
        let mut articles = self.articles.lock().unwrap();
        let before = articles.len();
        articles.retain(|_, a| a.published_at >= cutoff || (exclude_saved && a.is_saved));
        Ok((before - articles.len()) as u64)
    }

    async fn get_episode(&self, id: &str) -> Result<Option<Episode>, StoreError> {
        Ok(self
            .episodes
            .lock()
            .unwrap()
            .values()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn mark_episode_downloaded(&self, id: &str, path: &str) -> Result<(), StoreError> {
        let mut episodes = self.episodes.lock().unwrap();
        let episode = episodes
            .values_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "episode",
                id: id.to_string(),
            })?;
        episode.is_downloaded = true;
        episode.local_audio_path = Some(path.to_string());
        Ok(())
    }

    async fn clear_episode_download(&self, id: &str) -> Result<(), StoreError> {
        let mut episodes = self.episodes.lock().unwrap();
        let episode = episodes
            .values_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "episode",
                id: id.to_string(),
            })?;
        episode.is_downloaded = false;
        episode.local_audio_path = None;
        Ok(())
    }

    async fn delete_local_file(&self, path: &str) -> Result<(), StoreError> {
        self.files.lock().unwrap().remove(path);
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

// ============================================================================
// Scripted fetcher
// ============================================================================

/// Serves scripted bodies. URLs without a body time out.
#[derive(Clone, Default)]
pub struct StubFetcher {
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    delay: Option<Duration>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps first, so concurrent sources overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let body = self.bodies.lock().unwrap().get(url).cloned();
        body.ok_or(FetchError::Timeout)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// RSS 2.0 document with one item per `(title, link)` pair.
pub fn rss(items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link)| {
            format!(
                "<item><title>{title}</title><link>{link}</link>\
                 <description>{title} details</description>\
                 <pubDate>Tue, 14 Nov 2023 22:13:20 +0000</pubDate></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Feed</title>{items}</channel></rss>"#
    )
}

/// Podcast channel with one item per `(title, audio_url, duration)`.
pub fn podcast(items: &[(&str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, audio, duration)| {
            format!(
                r#"<item><title>{title}</title><enclosure url="{audio}" type="audio/mpeg"/><itunes:duration>{duration}</itunes:duration><pubDate>Tue, 14 Nov 2023 22:13:20 +0000</pubDate></item>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"><channel><title>Show</title>{items}</channel></rss>"#
    )
}
