//! Title Gate
//!
//! Alias index over known reference-document titles. Short queries and
//! queries naming a form/template under-constrain full-text search; the
//! gate narrows them to a bounded set of candidate titles first.
//!
//! Lookup priority: exact normalized title → aliased head → per-token →
//! substring containment, capped at [`MAX_TITLE_CANDIDATES`].

use std::collections::{HashMap, HashSet};

/// Upper bound on candidates handed to the search collaborator
pub const MAX_TITLE_CANDIDATES: usize = 20;

/// Case-fold, replace punctuation and underscores with spaces, collapse whitespace
pub fn normalize_title(title: &str) -> String {
    let folded: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Head of a title with any parenthesized/bracketed qualifier removed
///
/// "위임장(개인)" → "위임장", "[서식] 예금거래신청서" → "예금거래신청서"
fn title_head(title: &str) -> String {
    let mut head = String::new();
    let mut depth = 0usize;
    for c in title.chars() {
        match c {
            '(' | '[' | '（' | '【' => depth += 1,
            ')' | ']' | '）' | '】' => depth = depth.saturating_sub(1),
            _ if depth == 0 => head.push(c),
            _ => {}
        }
    }
    normalize_title(&head)
}

/// Build-once, read-many title index
#[derive(Debug, Clone, Default)]
pub struct TitleIndex {
    titles: Vec<String>,
    normalized: Vec<String>,
    by_whole: HashMap<String, Vec<usize>>,
    by_alias: HashMap<String, Vec<usize>>,
    by_token: HashMap<String, Vec<usize>>,
}

impl TitleIndex {
    /// Index every known title
    pub fn build<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::default();
        let mut seen = HashSet::new();

        for title in titles {
            let title: String = title.into();
            let normalized = normalize_title(&title);
            if normalized.is_empty() || !seen.insert(title.clone()) {
                continue;
            }

            let id = index.titles.len();
            index.by_whole.entry(normalized.clone()).or_default().push(id);

            let head = title_head(&title);
            if !head.is_empty() && head != normalized {
                index.by_alias.entry(head.clone()).or_default().push(id);
                let compact: String = head.split_whitespace().collect();
                if compact != head {
                    index.by_alias.entry(compact).or_default().push(id);
                }
            }

            for token in normalized.split_whitespace() {
                let ids = index.by_token.entry(token.to_string()).or_default();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }

            index.titles.push(title);
            index.normalized.push(normalized);
        }

        tracing::debug!(titles = index.titles.len(), aliases = index.by_alias.len(), "Title index built");
        index
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Candidate titles for a query, in priority order, capped
    pub fn candidates(&self, query: &str) -> Vec<String> {
        let query = normalize_title(query);
        if query.is_empty() {
            return Vec::new();
        }
        let compact: String = query.split_whitespace().collect();

        let mut ordered: Vec<usize> = Vec::new();
        let push = |ids: &[usize], ordered: &mut Vec<usize>| {
            for &id in ids {
                if ordered.len() >= MAX_TITLE_CANDIDATES {
                    return;
                }
                if !ordered.contains(&id) {
                    ordered.push(id);
                }
            }
        };

        if let Some(ids) = self.by_whole.get(&query) {
            push(ids, &mut ordered);
        }
        for key in [&query, &compact] {
            if let Some(ids) = self.by_alias.get(key.as_str()) {
                push(ids, &mut ordered);
            }
        }
        for token in query.split_whitespace().filter(|t| t.chars().count() >= 2) {
            if let Some(ids) = self.by_token.get(token) {
                push(ids, &mut ordered);
            }
        }

        // Substring containment in either direction
        if ordered.len() < MAX_TITLE_CANDIDATES {
            let substring_hits: Vec<usize> = (0..self.titles.len())
                .filter(|&id| {
                    let title = &self.normalized[id];
                    let title_compact: String = title.split_whitespace().collect();
                    title_compact.contains(&compact)
                        || (title_compact.chars().count() >= 2 && compact.contains(&title_compact))
                })
                .collect();
            push(&substring_hits, &mut ordered);
        }

        ordered.into_iter().map(|id| self.titles[id].clone()).collect()
    }
}
