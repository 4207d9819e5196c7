//! Detects a customer reply that repeats earlier customer content

/// Normalized similarity at or above which a reply counts as repeated
pub const REPETITION_THRESHOLD: f64 = 0.9;

/// Lowercase alphanumerics only
fn fold(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// True when `reply` is near-identical to any prior customer line
pub fn is_repetition<'a, I>(reply: &str, prior_customer_lines: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let reply = fold(reply);
    if reply.is_empty() {
        return false;
    }
    prior_customer_lines
        .into_iter()
        .map(fold)
        .filter(|prior| !prior.is_empty())
        .any(|prior| strsim::normalized_levenshtein(&reply, &prior) >= REPETITION_THRESHOLD)
}
