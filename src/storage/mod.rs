mod articles;
mod episodes;
pub mod retention;
mod schema;
mod store;
mod types;

pub use schema::Database;
pub use store::Store;
pub use types::{
    stable_id, Article, Episode, FeedKind, FeedSource, PlaybackSource, Severity, StoreError,
    UnknownSeverity, UpsertOutcome,
};
