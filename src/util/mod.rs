//! Small helpers shared by the feed pipeline.
//!
//! - **URL validation**: configured sources must be public http(s) URLs;
//!   media URLs found inside feeds are parsed leniently
//! - **Text processing**: HTML stripping for narration and line cleanup for
//!   feed-supplied titles

mod text;
mod url_validator;

pub use text::{clean_line, strip_html};
pub use url_validator::{parse_media_url, validate_url, UrlValidationError};
