//! Offline podcast downloads: one cancellable background task per episode.
use futures::StreamExt;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use url::Url;

use crate::storage::{Episode, Store, StoreError};

const DEFAULT_EXTENSION: &str = "mp3";

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Download request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Download failed: HTTP status {0}")]
    HttpStatus(u16),
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Download cancelled")]
    Cancelled,
}

/// What [`DownloadManager::start`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The episode already has a local file
    AlreadyDownloaded,
    /// A task for this episode is still running
    InProgress,
}

type DownloadTask = JoinHandle<Result<PathBuf, DownloadError>>;

/// Runs episode downloads in the background, independent of ingestion.
///
/// Audio is streamed to `<dir>/<episode id>.<ext>.part` and renamed into
/// place once complete, then recorded through
/// [`Store::mark_episode_downloaded`].
pub struct DownloadManager<S> {
    store: Arc<S>,
    client: reqwest::Client,
    dir: PathBuf,
    tasks: Mutex<HashMap<String, DownloadTask>>,
}

impl<S: Store + 'static> DownloadManager<S> {
    pub fn new(store: Arc<S>, client: reqwest::Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            client,
            dir: dir.into(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start downloading `episode` unless it is downloaded or in flight.
    pub fn start(&self, episode: &Episode) -> StartOutcome {
        if episode.is_downloaded {
            return StartOutcome::AlreadyDownloaded;
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.get(&episode.id).is_some_and(|t| !t.is_finished()) {
            return StartOutcome::InProgress;
        }
        // Finished tasks nobody waited on
        tasks.retain(|_, task| !task.is_finished());

        let job = Job {
            episode_id: episode.id.clone(),
            title: episode.title.clone(),
            audio_url: episode.audio_url.clone(),
            target: self.target_path(episode),
        };
        let store = Arc::clone(&self.store);
        let client = self.client.clone();

        tracing::info!(episode = %episode.title, url = %episode.audio_url, "Starting download");
        let handle = tokio::spawn(async move { job.run(&*store, &client).await });
        tasks.insert(episode.id.clone(), handle);
        StartOutcome::Started
    }

    /// Abort an in-flight download and remove its partial file.
    ///
    /// Returns `false` when no download was running for `episode_id`.
    pub async fn cancel(&self, episode: &Episode) -> bool {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&episode.id);

        let Some(handle) = handle else {
            return false;
        };
        if handle.is_finished() {
            return false;
        }

        handle.abort();
        // Wait for the abort so the task no longer writes to the partial file
        let _ = handle.await;

        remove_if_present(&part_path(&self.target_path(episode))).await;
        tracing::info!(episode = %episode.title, "Download cancelled");
        true
    }

    pub fn is_downloading(&self, episode_id: &str) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(episode_id)
            .is_some_and(|t| !t.is_finished())
    }

    /// Wait for a started download and take its result.
    ///
    /// `None` when nothing was started for `episode_id` or the result was
    /// already taken. Results of finished downloads are dropped by the next
    /// [`DownloadManager::start`].
    pub async fn wait(&self, episode_id: &str) -> Option<Result<PathBuf, DownloadError>> {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(episode_id)?;

        Some(match handle.await {
            Ok(result) => result,
            Err(_) => Err(DownloadError::Cancelled),
        })
    }

    fn target_path(&self, episode: &Episode) -> PathBuf {
        self.dir
            .join(format!("{}.{}", episode.id, audio_extension(&episode.audio_url)))
    }
}

struct Job {
    episode_id: String,
    title: String,
    audio_url: String,
    target: PathBuf,
}

impl Job {
    async fn run<S: Store + ?Sized>(
        self,
        store: &S,
        client: &reqwest::Client,
    ) -> Result<PathBuf, DownloadError> {
        let part = part_path(&self.target);
        let result = match self.fetch_to(&part, client).await {
            Ok(()) => self.commit(&part, store).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(path) => {
                tracing::info!(episode = %self.title, path = %path.display(), "Download complete");
            }
            Err(e) => {
                tracing::warn!(episode = %self.title, error = %e, "Download failed");
                remove_if_present(&part).await;
            }
        }
        result
    }

    /// Move the finished file into place and record it. A file the store
    /// did not accept is removed again.
    async fn commit<S: Store + ?Sized>(&self, part: &Path, store: &S) -> Result<PathBuf, DownloadError> {
        tokio::fs::rename(part, &self.target)
            .await
            .map_err(|source| DownloadError::Io {
                path: self.target.clone(),
                source,
            })?;

        if let Err(e) = store
            .mark_episode_downloaded(&self.episode_id, &self.target.to_string_lossy())
            .await
        {
            remove_if_present(&self.target).await;
            return Err(e.into());
        }
        Ok(self.target.clone())
    }

    async fn fetch_to(&self, part: &Path, client: &reqwest::Client) -> Result<(), DownloadError> {
        let io_err = |source: std::io::Error| DownloadError::Io {
            path: part.to_path_buf(),
            source,
        };

        if let Some(dir) = part.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let response = client.get(&self.audio_url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus(response.status().as_u16()));
        }

        let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

async fn remove_if_present(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove download file");
        }
    }
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// File extension from the audio URL path, `mp3` when absent or odd.
fn audio_extension(audio_url: &str) -> String {
    Url::parse(audio_url)
        .ok()
        .and_then(|url| {
            let segment = url.path_segments()?.next_back()?.to_string();
            let (_, ext) = segment.rsplit_once('.')?;
            let valid = !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric());
            valid.then(|| ext.to_ascii_lowercase())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
