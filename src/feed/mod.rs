//! Feed ingestion: fetching, normalization, classification and storage.
//!
//! This module turns configured [`FeedSource`](crate::storage::FeedSource)s
//! into stored articles and episodes:
//!
//! - **Fetching**: the [`Fetcher`] collaborator, with a `reqwest` implementation
//!   that bounds body size and backs off on rate limiting
//! - **Normalization**: RSS, Atom and JSON Feed documents become [`FeedEntry`]s
//!   with explicit defaults for missing fields
//! - **Classification**: keyword-based [`Severity`](crate::storage::Severity)
//!   and best-effort thumbnail resolution for articles, duration parsing for
//!   podcast items
//! - **Ingestion**: [`Ingestor`] fans out over sources, isolates failures and
//!   serializes upserts per natural key
//! - **Downloads**: [`DownloadManager`] keeps episode audio for offline playback
//!
//! # Example
//!
//! ```ignore
//! use cyberpulse::feed::{HttpFetcher, Ingestor};
//!
//! let ingestor = Ingestor::new(db, HttpFetcher::from_config(&config)?).with_config(&config);
//! let report = ingestor.refresh_all(&config.feeds).await;
//! for (source, error) in report.failures() {
//!     tracing::warn!(feed = %source.name, error = %error, "Refresh failed");
//! }
//! ```

mod download;
mod duration;
mod fetcher;
mod ingest;
mod locks;
mod media;
mod parser;
mod podcast;
mod severity;

pub use download::{DownloadError, DownloadManager, StartOutcome};
pub use duration::{format_duration, parse_duration};
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use ingest::{IngestError, Ingestor, RefreshReport, SourceOutcome, SourceStats};
pub use locks::{KeyGuard, KeyLocks};
pub use media::{first_src_attribute, resolve_article_image, Enclosure};
pub use parser::{
    normalize, EntryError, FeedDocument, FeedEntry, Normalized, ParseError, DEFAULT_BODY,
    DEFAULT_TITLE, FALLBACK_URL,
};
pub use severity::{classify, classify_entry};
