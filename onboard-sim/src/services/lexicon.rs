//! Domain lexicon
//!
//! Immutable, build-once dictionary shared by the normalizer, entity
//! extractor and retrieval router: canonical terms with their aliases,
//! stop-words, protected terms, category term lists and intent tables.
//!
//! Terms are stored in cleaned, whitespace-compacted form so that text the
//! normalizer has already corrected is a fixed point of normalization.

use onboard_common::{Error, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// Canonical term and the mis-transcriptions that map onto it
#[derive(Debug, Clone, Deserialize)]
pub struct TermSource {
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Intent keyword rule with the document categories to search first
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntentRule {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Document categories in priority order
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Lexicon as read from `lexicon.toml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LexiconSource {
    #[serde(default)]
    pub terms: Vec<TermSource>,
    #[serde(default)]
    pub stop_words: Vec<String>,
    #[serde(default)]
    pub protected_terms: Vec<String>,
    /// Trailing particles stripped before dictionary lookup
    #[serde(default)]
    pub particles: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub periods: Vec<String>,
    #[serde(default)]
    pub currencies: Vec<String>,
    /// Form/template keywords that trigger title gating
    #[serde(default)]
    pub form_keywords: Vec<String>,
    #[serde(default)]
    pub intents: Vec<IntentRule>,
}

/// Strip noise characters and collapse whitespace
///
/// Keeps alphanumerics of any script, whitespace and `%`. A `.` or `,` is
/// kept only between two ASCII digits so amounts and rates survive.
pub fn clean_text(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut cleaned = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        let keep = if c.is_alphanumeric() || c == '%' {
            true
        } else if c == '.' || c == ',' {
            let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            prev_digit && next_digit
        } else {
            false
        };
        cleaned.push(if keep { c } else { ' ' });
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleaned form with all whitespace removed
fn compact_term(term: &str) -> String {
    clean_text(term).split_whitespace().collect()
}

fn compact_all(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(|t| compact_term(t))
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Immutable domain lexicon
#[derive(Debug, Clone, Default)]
pub struct DomainLexicon {
    /// lowercase alias → canonical term
    aliases: HashMap<String, String>,
    /// compact lowercase multi-word alias → canonical term
    phrases: HashMap<String, String>,
    /// Word count of the longest multi-word alias
    max_phrase_words: usize,
    canonical_terms: Vec<String>,
    /// lowercase canonical terms
    canonical_keys: HashSet<String>,
    stop_words: HashSet<String>,
    protected: HashSet<String>,
    particles: Vec<String>,
    products: Vec<String>,
    periods: Vec<String>,
    currencies: Vec<String>,
    form_keywords: Vec<String>,
    intents: Vec<IntentRule>,
}

impl DomainLexicon {
    /// Build the lexicon from its configuration source
    ///
    /// Conflicting aliases keep their first mapping and log a warning.
    pub fn from_source(source: LexiconSource) -> Self {
        let mut canonical_terms = Vec::new();
        let mut canonical_keys = HashSet::new();
        for term in &source.terms {
            let canonical = compact_term(&term.canonical);
            if canonical.is_empty() {
                tracing::warn!(term = %term.canonical, "Skipping empty canonical term");
                continue;
            }
            if canonical_keys.insert(canonical.to_lowercase()) {
                canonical_terms.push(canonical);
            }
        }

        let mut aliases = HashMap::new();
        let mut phrases = HashMap::new();
        let mut max_phrase_words = 0;
        for term in &source.terms {
            let canonical = compact_term(&term.canonical);
            if canonical.is_empty() {
                continue;
            }
            for alias in &term.aliases {
                let key = compact_term(alias).to_lowercase();
                // Spaced forms are matched over adjacent tokens, even when they compact to the canonical
                let words = clean_text(alias).split_whitespace().count();
                if words >= 2 {
                    phrases.entry(key.clone()).or_insert_with(|| canonical.clone());
                    max_phrase_words = max_phrase_words.max(words);
                }
                if key.is_empty() || canonical_keys.contains(&key) {
                    continue;
                }
                match aliases.get(&key) {
                    Some(existing) if existing != &canonical => {
                        tracing::warn!(
                            alias = %key,
                            kept = %existing,
                            ignored = %canonical,
                            "Alias maps to multiple canonical terms"
                        );
                    }
                    Some(_) => {}
                    None => {
                        aliases.insert(key, canonical.clone());
                    }
                }
            }
        }

        // A canonical term may never be dropped as a stop-word
        let stop_words = compact_all(&source.stop_words)
            .into_iter()
            .map(|w| w.to_lowercase())
            .filter(|w| !canonical_keys.contains(w))
            .collect();

        let protected = compact_all(&source.protected_terms)
            .into_iter()
            .map(|w| w.to_lowercase())
            .collect();

        let mut particles = compact_all(&source.particles);
        // Longest particle first so "에서" wins over "서"
        particles.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

        let intents = source
            .intents
            .into_iter()
            .map(|rule| IntentRule {
                name: rule.name,
                keywords: compact_all(&rule.keywords),
                categories: rule.categories,
            })
            .collect();

        tracing::debug!(
            canonical = canonical_terms.len(),
            aliases = aliases.len(),
            phrases = phrases.len(),
            "Domain lexicon built"
        );

        Self {
            aliases,
            phrases,
            max_phrase_words,
            canonical_terms,
            canonical_keys,
            stop_words,
            protected,
            particles,
            products: compact_all(&source.products),
            periods: compact_all(&source.periods),
            currencies: compact_all(&source.currencies),
            form_keywords: compact_all(&source.form_keywords),
            intents,
        }
    }

    /// Parse and build from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let source: LexiconSource = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid lexicon: {}", e)))?;
        Ok(Self::from_source(source))
    }

    /// Exact alias lookup
    pub fn alias_target(&self, token: &str) -> Option<&str> {
        self.aliases.get(&token.to_lowercase()).map(String::as_str)
    }

    /// Lookup of adjacent tokens joined without spaces
    pub fn phrase_target(&self, joined: &str) -> Option<&str> {
        self.phrases.get(&joined.to_lowercase()).map(String::as_str)
    }

    pub fn max_phrase_words(&self) -> usize {
        self.max_phrase_words
    }

    pub fn is_canonical(&self, token: &str) -> bool {
        self.canonical_keys.contains(&token.to_lowercase())
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(&token.to_lowercase())
    }

    pub fn is_protected(&self, token: &str) -> bool {
        self.protected.contains(&token.to_lowercase())
    }

    pub fn canonical_terms(&self) -> &[String] {
        &self.canonical_terms
    }

    pub fn particles(&self) -> &[String] {
        &self.particles
    }

    pub fn products(&self) -> &[String] {
        &self.products
    }

    pub fn periods(&self) -> &[String] {
        &self.periods
    }

    pub fn currencies(&self) -> &[String] {
        &self.currencies
    }

    pub fn form_keywords(&self) -> &[String] {
        &self.form_keywords
    }

    /// True when the text contains a known form/template keyword
    pub fn contains_form_keyword(&self, text: &str) -> bool {
        let compact: String = text.split_whitespace().collect();
        self.form_keywords.iter().any(|k| compact.contains(k.as_str()))
    }

    /// First intent whose keyword occurs in the text, or `"general"`
    pub fn classify_intent(&self, text: &str) -> &str {
        let compact: String = text.split_whitespace().collect();
        self.intents
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| compact.contains(k.as_str())))
            .map(|rule| rule.name.as_str())
            .unwrap_or("general")
    }

    /// Document categories to search first for an intent
    pub fn category_priority(&self, intent: &str) -> &[String] {
        self.intents
            .iter()
            .find(|rule| rule.name == intent)
            .map(|rule| rule.categories.as_slice())
            .unwrap_or(&[])
    }
}
