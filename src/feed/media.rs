use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::util::parse_media_url;

/// First `src='...'` or `src="..."` attribute in an HTML fragment
static SRC_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"src=['"]([^'"]+)['"]"#).expect("src attribute pattern is valid")
});

/// A media attachment declared by a feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    /// Declared MIME type, e.g. `image/jpeg` or `audio/mpeg`
    pub media_type: Option<String>,
}

impl Enclosure {
    pub fn new(url: impl Into<String>, media_type: Option<String>) -> Self {
        Self {
            url: url.into(),
            media_type,
        }
    }

    fn has_type_prefix(&self, prefix: &str) -> bool {
        self.media_type
            .as_deref()
            .is_some_and(|t| t.trim().to_ascii_lowercase().starts_with(prefix))
    }

    pub fn is_image(&self) -> bool {
        self.has_type_prefix("image/")
    }
}

/// Best-effort thumbnail for an article.
///
/// Preference order:
/// 1. the first enclosure declared as `image/*`
/// 2. an explicit thumbnail supplied by the feed format
/// 3. the first `src` attribute in the body HTML
///
/// Each step only considers its first candidate; a candidate that does not
/// parse as an http(s) URL falls through to the next step.
pub fn resolve_article_image(
    enclosures: &[Enclosure],
    thumbnail: Option<&str>,
    body: &str,
    base: Option<&Url>,
) -> Option<Url> {
    if let Some(url) = enclosures
        .iter()
        .find(|e| e.is_image())
        .and_then(|e| parse_media_url(&e.url, base))
    {
        return Some(url);
    }

    if let Some(url) = thumbnail.and_then(|t| parse_media_url(t, base)) {
        return Some(url);
    }

    first_src_attribute(body).and_then(|src| parse_media_url(src, base))
}

/// The value of the first `src` attribute in `html`, if any.
///
/// A pattern match, not an HTML parser: only the first occurrence counts.
pub fn first_src_attribute(html: &str) -> Option<&str> {
    SRC_ATTRIBUTE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str) -> Enclosure {
        Enclosure::new(url, Some("image/png".to_string()))
    }

    #[test]
    fn test_image_enclosure_wins() {
        let enclosures = vec![
            Enclosure::new("https://cdn.example.com/a.mp3", Some("audio/mpeg".into())),
            image("https://cdn.example.com/a.png"),
        ];
        let body = r#"<img src="https://cdn.example.com/inline.jpg">"#;
        let url = resolve_article_image(&enclosures, None, body, None).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/a.png");
    }

    #[test]
    fn test_non_image_enclosures_are_ignored() {
        let enclosures = vec![Enclosure::new("https://cdn.example.com/doc.pdf", None)];
        assert!(resolve_article_image(&enclosures, None, "", None).is_none());
    }

    #[test]
    fn test_thumbnail_before_body() {
        let body = r#"<img src="https://cdn.example.com/inline.jpg">"#;
        let url =
            resolve_article_image(&[], Some("https://cdn.example.com/thumb.jpg"), body, None)
                .unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/thumb.jpg");
    }

    #[test]
    fn test_body_src_fallback_single_or_double_quotes() {
        let double = r#"<p>x</p><img src="https://cdn.example.com/1.jpg"><img src="https://cdn.example.com/2.jpg">"#;
        let url = resolve_article_image(&[], None, double, None).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/1.jpg");

        let single = "<img src='https://cdn.example.com/s.jpg'>";
        let url = resolve_article_image(&[], None, single, None).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/s.jpg");
    }

    #[test]
    fn test_only_first_src_is_considered() {
        // First candidate is not a URL; the second one is never tried
        let body = r#"<img src="data:,"><img src="https://cdn.example.com/2.jpg">"#;
        assert!(resolve_article_image(&[], None, body, None).is_none());
    }

    #[test]
    fn test_relative_src_resolves_against_base() {
        let base = Url::parse("https://news.example.com/posts/1").unwrap();
        let body = r#"<img src="/images/hero.png">"#;
        let url = resolve_article_image(&[], None, body, Some(&base)).unwrap();
        assert_eq!(url.as_str(), "https://news.example.com/images/hero.png");

        assert!(resolve_article_image(&[], None, body, None).is_none());
    }

    #[test]
    fn test_no_image_anywhere() {
        assert!(resolve_article_image(&[], None, "<p>plain</p>", None).is_none());
        assert_eq!(first_src_attribute("no attributes"), None);
    }

    #[test]
    fn test_enclosure_type_prefix_is_case_insensitive() {
        let enclosure = Enclosure::new("https://cdn.example.com/a.png", Some("Image/PNG".into()));
        assert!(enclosure.is_image());
    }
}
