/// Parse a podcast duration string into seconds.
///
/// Shapes are tried in order: `H:MM:SS`, `MM:SS`, then a bare number of
/// seconds. Anything else, including negative components or overflow,
/// yields `None`.
pub fn parse_duration(raw: Option<&str>) -> Option<u32> {
    let raw = raw?.trim();
    let parts: Vec<&str> = raw.split(':').collect();

    match parts.as_slice() {
        [h, m, s] => {
            let (h, m, s) = (component(h)?, component(m)?, component(s)?);
            h.checked_mul(3600)?
                .checked_add(m.checked_mul(60)?)?
                .checked_add(s)
        }
        [m, s] => {
            let (m, s) = (component(m)?, component(s)?);
            m.checked_mul(60)?.checked_add(s)
        }
        [secs] => component(secs),
        _ => None,
    }
}

fn component(s: &str) -> Option<u32> {
    s.parse().ok()
}

/// Render seconds as `H:MM:SS`, or `M:SS` under an hour.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds / 60) % 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
