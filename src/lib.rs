//! Cybersecurity news and podcast feed ingestion.
//!
//! `cyberpulse` is the embeddable core behind a news/podcast reader: it fetches
//! RSS, Atom and JSON feeds, normalizes them into a single entry model, infers
//! a severity level for articles, and upserts the results into a local store.
//! Podcast episodes take a separate path with duration parsing and an
//! offline download lifecycle.
//!
//! # Modules
//!
//! - [`feed`] - Fetching, normalization, classification, ingestion and downloads
//! - [`storage`] - The [`storage::Store`] contract and its SQLite implementation
//! - [`config`] - TOML configuration with built-in default sources
//! - [`logging`] - `tracing` subscriber setup for the embedding host
//! - [`util`] - URL validation and text helpers
//!
//! # Example
//!
//! ```ignore
//! use cyberpulse::config::Config;
//! use cyberpulse::feed::{HttpFetcher, Ingestor};
//! use cyberpulse::storage::{retention, Database};
//!
//! cyberpulse::logging::init(cyberpulse::logging::DEFAULT_FILTER);
//! let config = Config::load(&path)?;
//! let db = Database::open("cyberpulse.db").await?;
//! retention::prune_articles(&db, config.retention()).await?;
//!
//! let fetcher = HttpFetcher::from_config(&config)?;
//! let ingestor = Ingestor::new(db.clone(), fetcher).with_config(&config);
//! let report = ingestor.refresh_all(&config.feeds).await;
//! if report.has_failures() {
//!     tracing::warn!(failed = report.failed_count(), "Some feeds failed to refresh");
//! }
//! ```

pub mod config;
pub mod feed;
pub mod logging;
pub mod storage;
pub mod util;
