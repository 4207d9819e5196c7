//! Per-turn result values

use serde::{Deserialize, Serialize};

/// Generation mode chosen by the retrieval router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetrievalMode {
    /// Generation grounded in retrieved reference excerpts
    Rag,
    /// Unconstrained generation
    General,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Rag => "RAG",
            RetrievalMode::General => "GENERAL",
        }
    }
}

/// Conversation phase derived from session progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    /// Only the customer's opening line exists
    Opening,
    /// Fewer than half of the goals achieved
    Exploring,
    /// At least half of the goals achieved
    Resolving,
    /// Conversation reached its natural end
    Closing,
}

impl ConversationPhase {
    /// Derive the phase from progress counters
    pub fn derive(employee_turns: usize, achieved: usize, total_goals: usize, should_close: bool) -> Self {
        if should_close {
            ConversationPhase::Closing
        } else if employee_turns == 0 {
            ConversationPhase::Opening
        } else if total_goals > 0 && achieved * 2 >= total_goals {
            ConversationPhase::Resolving
        } else {
            ConversationPhase::Exploring
        }
    }
}

/// Result of one employee turn, returned to the caller and then dropped
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub transcribed_text: String,
    pub normalized_text: String,
    pub customer_response_text: String,
    pub followups: Vec<String>,
    pub safety_notes: Vec<String>,
    pub conversation_phase: ConversationPhase,
    /// Goal progress 0-100
    pub session_score: f64,
    pub retrieval_mode: RetrievalMode,
    pub achieved_goals: Vec<usize>,
    pub should_close: bool,
    /// Synthesized customer audio; empty for text turns or failed synthesis
    #[serde(skip)]
    pub audio: Vec<u8>,
}
