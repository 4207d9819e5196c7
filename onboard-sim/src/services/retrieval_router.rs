//! Retrieval Router
//!
//! Decides per turn whether the customer reply is grounded in retrieved
//! reference excerpts (RAG) or generated unconstrained (GENERAL).
//!
//! **Pipeline:**
//! 1. Title gate for short or form-keyword queries
//! 2. Search restricted to title candidates and intent categories
//! 3. Broaden to an unrestricted search below the hit floor, merge by document id
//! 4. Mean similarity of the top hits against a length-dependent threshold pair
//!
//! Search failures and timeouts count as zero hits; routing never fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::lexicon::DomainLexicon;
use super::title_gate::TitleIndex;
use crate::models::RetrievalMode;
use crate::utils::{with_deadline, DeadlineError};

/// Reference excerpt returned by the search collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub title: String,
    pub category: String,
    pub content: String,
    pub chunk_index: i64,
    /// Collaborator-supplied relevance, higher is better
    pub similarity: f64,
}

/// Keyword search request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    /// Full query text
    pub query: String,
    pub keywords: Vec<String>,
    /// Restrict to these document titles when non-empty
    pub titles: Vec<String>,
    /// Restrict to these categories when non-empty
    pub categories: Vec<String>,
    pub limit: usize,
}

impl SearchRequest {
    pub fn is_restricted(&self) -> bool {
        !self.titles.is_empty() || !self.categories.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Search backend error: {0}")]
    Backend(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Search cancelled")]
    Cancelled,
}

/// Document search collaborator
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Chunk>, RetrievalError>;

    /// Every known document title, for the title gate
    async fn list_titles(&self) -> Result<Vec<String>, RetrievalError>;
}

/// `(confidence_cutoff, rerank_cutoff)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    /// Minimum mean top-k similarity for RAG
    pub confidence_cutoff: f64,
    /// Minimum similarity for a hit to be kept as evidence
    pub rerank_cutoff: f64,
}

/// Router tuning
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Queries at or below this many non-space chars count as short
    pub short_query_chars: usize,
    /// Hit floor below which the search is broadened
    pub min_hits: usize,
    /// Number of top hits averaged for the confidence signal
    pub top_k: usize,
    pub search_limit: usize,
    pub short_thresholds: ThresholdPair,
    pub normal_thresholds: ThresholdPair,
    /// Hits below this fraction of the best similarity are dropped
    pub relative_keep: f64,
    pub search_timeout: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            short_query_chars: 6,
            min_hits: 3,
            top_k: 5,
            search_limit: 10,
            short_thresholds: ThresholdPair {
                confidence_cutoff: 0.25,
                rerank_cutoff: 0.2,
            },
            normal_thresholds: ThresholdPair {
                confidence_cutoff: 0.45,
                rerank_cutoff: 0.3,
            },
            relative_keep: 0.7,
            search_timeout: Duration::from_secs(2),
        }
    }
}

/// Routing decision for one query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutcome {
    /// Evidence handed to the composer; empty in GENERAL mode
    pub documents: Vec<Chunk>,
    pub mode: RetrievalMode,
    /// Mean similarity of the top hits
    pub confidence: f64,
    pub thresholds: ThresholdPair,
    pub title_candidates: Vec<String>,
}

impl RetrievalOutcome {
    pub fn evidence_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for chunk in &self.documents {
            if !ids.contains(&chunk.document_id) {
                ids.push(chunk.document_id.clone());
            }
        }
        ids
    }
}

pub struct RetrievalRouter {
    search: Arc<dyn DocumentSearch>,
    lexicon: Arc<DomainLexicon>,
    titles: Arc<TitleIndex>,
    settings: RouterSettings,
}

impl RetrievalRouter {
    pub fn new(
        search: Arc<dyn DocumentSearch>,
        lexicon: Arc<DomainLexicon>,
        titles: Arc<TitleIndex>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            search,
            lexicon,
            titles,
            settings,
        }
    }

    /// Build the title index from the collaborator's title listing
    ///
    /// A failed listing yields an empty index; title gating then never matches.
    pub async fn load_title_index(search: &dyn DocumentSearch) -> TitleIndex {
        match search.list_titles().await {
            Ok(titles) => TitleIndex::build(titles),
            Err(e) => {
                tracing::warn!(error = %e, "Title listing failed, title gate disabled");
                TitleIndex::default()
            }
        }
    }

    fn is_short(&self, query: &str) -> bool {
        query.chars().filter(|c| !c.is_whitespace()).count() <= self.settings.short_query_chars
    }

    /// Threshold pair for a query
    pub fn thresholds_for(&self, query: &str) -> ThresholdPair {
        if self.is_short(query) {
            self.settings.short_thresholds
        } else {
            self.settings.normal_thresholds
        }
    }

    /// Route a normalized query
    pub async fn route(
        &self,
        query: &str,
        intent: &str,
        cancel: &CancellationToken,
    ) -> RetrievalOutcome {
        let thresholds = self.thresholds_for(query);
        let gated = self.is_short(query) || self.lexicon.contains_form_keyword(query);
        let title_candidates = if gated {
            self.titles.candidates(query)
        } else {
            Vec::new()
        };

        let keywords = query_keywords(query);
        let broad = SearchRequest {
            query: query.to_string(),
            keywords,
            titles: Vec::new(),
            categories: Vec::new(),
            limit: self.settings.search_limit,
        };
        let restricted = SearchRequest {
            titles: title_candidates.clone(),
            categories: self.lexicon.category_priority(intent).to_vec(),
            ..broad.clone()
        };

        let mut hits = if restricted.is_restricted() {
            merge_by_document(self.search_or_empty(&restricted, cancel).await, Vec::new())
        } else {
            Vec::new()
        };

        if hits.len() < self.settings.min_hits {
            let more = self.search_or_empty(&broad, cancel).await;
            hits = merge_by_document(hits, more);
        }

        let confidence = mean_top_k(&hits, self.settings.top_k);
        let outcome = if !hits.is_empty() && confidence >= thresholds.confidence_cutoff {
            let best = hits[0].similarity;
            let keep_at = thresholds.rerank_cutoff.max(self.settings.relative_keep * best);
            let documents: Vec<Chunk> = hits.into_iter().filter(|c| c.similarity >= keep_at).collect();
            RetrievalOutcome {
                documents,
                mode: RetrievalMode::Rag,
                confidence,
                thresholds,
                title_candidates,
            }
        } else {
            RetrievalOutcome {
                documents: Vec::new(),
                mode: RetrievalMode::General,
                confidence,
                thresholds,
                title_candidates,
            }
        };

        tracing::debug!(
            query = %query,
            intent = %intent,
            gated,
            mode = ?outcome.mode,
            confidence = outcome.confidence,
            documents = outcome.documents.len(),
            "Retrieval routed"
        );

        outcome
    }

    async fn search_or_empty(&self, request: &SearchRequest, cancel: &CancellationToken) -> Vec<Chunk> {
        let timeout = self.settings.search_timeout;
        let result = match with_deadline(timeout, cancel, self.search.search(request)).await {
            Ok(result) => result,
            Err(DeadlineError::TimedOut(after)) => Err(RetrievalError::Timeout(after)),
            Err(DeadlineError::Cancelled) => Err(RetrievalError::Cancelled),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, restricted = request.is_restricted(), "Document search failed, treating as zero hits");
            Vec::new()
        })
    }
}

/// Whitespace tokens, deduplicated, in order
fn query_keywords(query: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in query.split_whitespace() {
        if !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
        }
    }
    keywords
}

/// Merge hit lists keeping the best chunk per document, best first
///
/// Ties keep first-seen order so routing is deterministic for a given
/// collaborator response.
fn merge_by_document(first: Vec<Chunk>, second: Vec<Chunk>) -> Vec<Chunk> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, Chunk> = HashMap::new();

    for chunk in first.into_iter().chain(second) {
        match best.get(&chunk.document_id) {
            Some(existing) if existing.similarity >= chunk.similarity => {}
            Some(_) => {
                best.insert(chunk.document_id.clone(), chunk);
            }
            None => {
                order.push(chunk.document_id.clone());
                best.insert(chunk.document_id.clone(), chunk);
            }
        }
    }

    let mut merged: Vec<Chunk> = order.into_iter().filter_map(|id| best.remove(&id)).collect();
    merged.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    merged
}

fn mean_top_k(hits: &[Chunk], k: usize) -> f64 {
    let top: Vec<f64> = hits.iter().take(k.max(1)).map(|c| c.similarity).collect();
    if top.is_empty() {
        0.0
    } else {
        top.iter().sum::<f64>() / top.len() as f64
    }
}
