//! Domain Normalizer
//!
//! Corrects transcribed utterances against the domain lexicon:
//! 1. Strip noise characters, collapse whitespace
//! 2. Tokenize on whitespace, drop stop-words
//! 3. Join adjacent tokens that spell a spaced alias ("체크 카드" → "체크카드")
//! 4. Per token: exact alias lookup, then fuzzy match against canonical terms
//! 5. Record every substitution, extract entities, flag low confidence
//!
//! Normalization never fails; the worst case returns the cleaned input with
//! zero corrections.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::entity_extractor::{extract_entities, Entities};
use super::lexicon::{clean_text, DomainLexicon};

/// Default fuzzy acceptance cutoff (0-100)
pub const DEFAULT_FUZZY_CUTOFF: f64 = 85.0;

/// Hint below which input always needs clarification
const LOW_CONFIDENCE_HINT: f64 = 0.7;

/// Utterances longer than this need clarification after any correction
const LONG_UTTERANCE_CHARS: usize = 50;

/// Confidence multiplier applied per alias correction
const ALIAS_CONFIDENCE_FACTOR: f64 = 0.95;

/// One token substitution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub token: String,
    pub corrected: String,
    /// `"alias"` or `"fuzzy:<score>"`
    pub method: String,
    /// Fuzzy similarity 0-100, absent for alias hits
    pub score: Option<f64>,
}

impl Correction {
    fn alias(token: &str, corrected: String) -> Self {
        Self {
            token: token.to_string(),
            corrected,
            method: "alias".to_string(),
            score: None,
        }
    }

    fn fuzzy(token: &str, corrected: String, score: f64) -> Self {
        Self {
            token: token.to_string(),
            corrected,
            method: format!("fuzzy:{:.0}", score),
            score: Some(score),
        }
    }

}

/// Result of normalizing one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub original: String,
    pub normalized: String,
    pub corrections: Vec<Correction>,
    /// 0.0-1.0
    pub confidence_score: f64,
    pub needs_clarification: bool,
    pub entities: Entities,
}

impl NormalizationResult {
    /// Pass-through result for empty or unusable input
    pub fn unchanged(text: &str, confidence_hint: f64) -> Self {
        let confidence = clamp_unit(confidence_hint);
        Self {
            original: text.to_string(),
            normalized: text.trim().to_string(),
            corrections: Vec::new(),
            confidence_score: confidence,
            needs_clarification: confidence < LOW_CONFIDENCE_HINT,
            entities: Entities::default(),
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Clarification rule: ≥2 corrections, low hint, or a long utterance with any correction
pub fn needs_clarification(corrections: usize, confidence_hint: f64, text_chars: usize) -> bool {
    corrections >= 2
        || confidence_hint < LOW_CONFIDENCE_HINT
        || (text_chars > LONG_UTTERANCE_CHARS && corrections >= 1)
}

/// Domain normalizer over a shared, read-only lexicon
#[derive(Debug, Clone)]
pub struct DomainNormalizer {
    lexicon: Arc<DomainLexicon>,
    fuzzy_cutoff: f64,
}

impl DomainNormalizer {
    pub fn new(lexicon: Arc<DomainLexicon>) -> Self {
        Self {
            lexicon,
            fuzzy_cutoff: DEFAULT_FUZZY_CUTOFF,
        }
    }

    pub fn with_fuzzy_cutoff(mut self, cutoff: f64) -> Self {
        self.fuzzy_cutoff = cutoff.clamp(0.0, 100.0);
        self
    }

    /// Normalize one utterance
    pub fn normalize(&self, text: &str, confidence_hint: f64) -> NormalizationResult {
        let hint = clamp_unit(confidence_hint);
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return NormalizationResult::unchanged(text, hint);
        }

        let words: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|w| !self.lexicon.is_stop_word(w))
            .collect();

        let mut corrections = Vec::new();
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < words.len() {
            if let Some((span, correction)) = self.correct_phrase(&words[i..]) {
                tokens.push(correction.corrected.clone());
                corrections.push(correction);
                i += span;
                continue;
            }

            let token = words[i];
            i += 1;
            if self.lexicon.is_protected(token) {
                tokens.push(token.to_string());
                continue;
            }
            match self.correct_token(token) {
                Some(correction) => {
                    tokens.push(correction.corrected.clone());
                    corrections.push(correction);
                }
                None => tokens.push(token.to_string()),
            }
        }

        let normalized = tokens.join(" ");
        let entities = extract_entities(&normalized, &self.lexicon);

        let confidence_score = corrections.iter().fold(hint, |acc, c| match c.score {
            None => acc * ALIAS_CONFIDENCE_FACTOR,
            Some(score) => acc * (score / 100.0),
        });

        let needs_clarification =
            needs_clarification(corrections.len(), hint, text.chars().count());

        if !corrections.is_empty() {
            tracing::debug!(
                original = %text,
                normalized = %normalized,
                corrections = corrections.len(),
                needs_clarification,
                "Utterance normalized"
            );
        }

        NormalizationResult {
            original: text.to_string(),
            normalized,
            corrections,
            confidence_score: clamp_unit(confidence_score),
            needs_clarification,
            entities,
        }
    }

    /// Candidate (stem, particle) splits, whole token first
    fn splits<'a>(&'a self, token: &'a str) -> Vec<(&'a str, &'a str)> {
        let mut splits = vec![(token, "")];
        for particle in self.lexicon.particles() {
            if let Some(stem) = token.strip_suffix(particle.as_str()) {
                if !stem.is_empty() {
                    splits.push((stem, particle.as_str()));
                }
            }
        }
        splits
    }

    /// Longest spaced alias starting at `words[0]`, with the number of words it spans
    fn correct_phrase(&self, words: &[&str]) -> Option<(usize, Correction)> {
        let longest = self.lexicon.max_phrase_words().min(words.len());
        for n in (2..=longest).rev() {
            let span = &words[..n];
            if span.iter().any(|w| self.lexicon.is_protected(w)) {
                continue;
            }
            let joined = span.concat();
            for (stem, particle) in self.splits(&joined) {
                if let Some(canonical) = self.lexicon.phrase_target(stem) {
                    let corrected = format!("{}{}", canonical, particle);
                    return Some((n, Correction::alias(&span.join(" "), corrected)));
                }
            }
        }
        None
    }

    fn correct_token(&self, token: &str) -> Option<Correction> {
        let splits = self.splits(token);

        // Exact pass: canonical or protected stems are already correct
        for &(stem, particle) in &splits {
            if self.lexicon.is_canonical(stem) || self.lexicon.is_protected(stem) {
                return None;
            }
            if let Some(canonical) = self.lexicon.alias_target(stem) {
                return Some(Correction::alias(token, format!("{}{}", canonical, particle)));
            }
        }

        // Fuzzy pass
        for &(stem, particle) in &splits {
            if let Some((canonical, score)) = self.best_fuzzy_match(stem) {
                return Some(Correction::fuzzy(
                    token,
                    format!("{}{}", canonical, particle),
                    score,
                ));
            }
        }

        None
    }

    /// Best canonical term at or above the cutoff
    fn best_fuzzy_match(&self, stem: &str) -> Option<(&str, f64)> {
        if stem.chars().count() < 2 || stem.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
            return None;
        }

        let needle = stem.to_lowercase();
        let mut best: Option<(&str, f64)> = None;
        for canonical in self.lexicon.canonical_terms() {
            let score = strsim::normalized_levenshtein(&needle, &canonical.to_lowercase()) * 100.0;
            if score >= self.fuzzy_cutoff && best.map_or(true, |(_, s)| score > s) {
                best = Some((canonical.as_str(), score));
            }
        }

        best.filter(|(canonical, _)| !canonical.eq_ignore_ascii_case(stem))
    }
}
