//! String helpers for log and error text

/// Truncate to at most `max_chars` characters on a UTF-8 boundary
///
/// ```
/// use textgen_proxy::utils::truncate_str;
///
/// assert_eq!(truncate_str("Grüße aus Köln", 5), "Grüße");
/// assert_eq!(truncate_str("short", 100), "short");
/// ```
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Single-line preview of an upstream body: whitespace collapsed and
/// truncated with `...` when longer than `max_chars`
pub fn body_preview(body: &str, max_chars: usize) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        format!("{}...", truncate_str(&collapsed, max_chars))
    }
}
