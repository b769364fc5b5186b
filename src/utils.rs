/// Collapse whitespace runs to a single space and trim the ends.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `normalize_ws`, with `None` for strings that end up empty.
pub fn non_empty(s: &str) -> Option<String> {
    let out = normalize_ws(s);
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
