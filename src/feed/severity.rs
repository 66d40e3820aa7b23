use crate::storage::Severity;

/// Keyword tiers in precedence order. The first tier with any hit wins.
const SEVERITY_KEYWORDS: [(Severity, &[&str]); 3] = [
    (Severity::Critical, &["critical", "urgent", "emergency"]),
    (Severity::High, &["high", "severe", "major"]),
    (Severity::Medium, &["medium", "moderate"]),
];

/// Infer an article's severity from free text.
///
/// Case-insensitive substring scan. Tiers are checked strictly in order
/// critical, high, medium, so a higher tier wins even when a lower-tier
/// keyword appears earlier in the text. Text with no keyword is `Low`.
pub fn classify(text: &str) -> Severity {
    let text = text.to_lowercase();
    SEVERITY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(level, _)| *level)
        .unwrap_or(Severity::Low)
}

/// Classify an entry from its title and body together.
pub fn classify_entry(title: &str, body: &str) -> Severity {
    classify(&format!("{} {}", title, body))
}
