//! Extraction of a JSON object from free-form model output
//!
//! Models wrap JSON in markdown fences or surround it with prose. Both are
//! tolerated: a fenced block wins, otherwise the span from the first `{` to
//! the last `}` is taken.

/// Slice holding the JSON object embedded in `text`, if any
pub fn extract_json_object(text: &str) -> Option<&str> {
    let body = fenced_body(text).unwrap_or(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&body[start..=end])
}

/// Content of the first ``` fence, language tag removed
fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip the language tag line ("json", "JSON", ...)
    let content_start = match after_open.find('\n') {
        Some(i) if after_open[..i].trim().chars().all(|c| c.is_ascii_alphanumeric()) => i + 1,
        _ => 0,
    };
    let content = &after_open[content_start..];
    let close = content.find("```").unwrap_or(content.len());
    Some(&content[..close])
}
