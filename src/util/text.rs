use scraper::{ElementRef, Html};

/// Elements whose text is never part of the readable content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "iframe"];

/// Elements that separate words when rendered.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote",
    "section", "article", "pre", "table", "tr", "td", "th",
];

/// Extract readable text from an HTML fragment and collapse whitespace.
///
/// The fragment goes through an HTML5 parser, so named and numeric entities
/// are decoded and script or style bodies are dropped. Used for narration
/// text and plain-text previews.
pub fn strip_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    collect_text(fragment.root_element(), &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child_ref) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child_ref.value().name();
        if SKIPPED_ELEMENTS.contains(&name) {
            continue;
        }
        let block = BLOCK_ELEMENTS.contains(&name);
        if block {
            out.push(' ');
        }
        collect_text(child_ref, out);
        if block {
            out.push(' ');
        }
    }
}

/// Normalize a feed-supplied single-line string.
///
/// Drops control characters (feeds are untrusted input), collapses runs of
/// whitespace and trims. Returns `None` when nothing printable remains.
pub fn clean_line(s: &str) -> Option<String> {
    let cleaned = s
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_removes_tags() {
        assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
        assert_eq!(strip_html("<p>a</p><p>b</p>"), "a b");
        assert_eq!(strip_html("plain text"), "plain text");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn test_strip_html_decodes_entities() {
        assert_eq!(strip_html("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(strip_html("a&nbsp;b"), "a b");
        assert_eq!(strip_html("&amp;lt;"), "&lt;");
        assert_eq!(strip_html("&lt;script&gt;"), "<script>");
    }

    #[test]
    fn test_strip_html_decodes_numeric_entities_and_drops_scripts() {
        let html = "<p>Microsoft&#8217;s patch &mdash; CVE&#x2011;1</p>\
                    <script>var a = 1 > 0;</script><style>p { color: red }</style>";
        assert_eq!(
            strip_html(html),
            "Microsoft\u{2019}s patch \u{2014} CVE\u{2011}1"
        );
    }

    #[test]
    fn test_strip_html_separates_block_elements() {
        assert_eq!(strip_html("<li>one</li><li>two</li>line<br>break"), "one two line break");
        assert_eq!(strip_html("a<b>b</b>c"), "abc");
    }

    #[test]
    fn test_clean_line() {
        assert_eq!(clean_line("  Breaking\n news \t"), Some("Breaking news".into()));
        assert_eq!(clean_line("a\u{1b}[31mb"), Some("a [31mb".into()));
        assert_eq!(clean_line(" \n\t "), None);
        assert_eq!(clean_line(""), None);
    }
}
