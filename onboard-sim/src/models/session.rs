//! Simulation session state machine
//!
//! A session progresses through 4 states:
//! INITIALIZING → IN_PROGRESS → COMPLETING → COMPLETED
//!
//! The turn history is append-only. Once a session leaves IN_PROGRESS its
//! history is frozen and only the completion stamp may still change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

use super::{ConversationPhase, Persona, Situation};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Opening customer utterance not yet generated
    Initializing,
    /// Accepting employee turns
    InProgress,
    /// History frozen, evaluation pending
    Completing,
    /// Terminal
    Completed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initializing => "INITIALIZING",
            SessionState::InProgress => "IN_PROGRESS",
            SessionState::Completing => "COMPLETING",
            SessionState::Completed => "COMPLETED",
        }
    }
}

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// Trainee
    Employee,
    /// Simulated persona
    Customer,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Employee => "employee",
            Speaker::Customer => "customer",
        }
    }
}

/// One utterance in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: SessionState,
    pub new_state: SessionState,
    pub transitioned_at: DateTime<Utc>,
}

/// Errors surfaced to the caller as rejected requests
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    #[error("Unknown situation: {0}")]
    UnknownSituation(String),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// Another turn currently holds the session
    #[error("Session {0} is busy with another turn")]
    SessionBusy(Uuid),

    #[error("Session {session_id} cannot {operation} while {state}")]
    InvalidState {
        session_id: Uuid,
        state: &'static str,
        operation: &'static str,
    },

    #[error("Empty utterance")]
    EmptyUtterance,

    /// Voice turn without a configured or reachable speech service
    #[error("Speech service unavailable: {0}")]
    SpeechUnavailable(String),
}

/// Session-scoped aggregate, exclusively mutated by the session engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSession {
    pub session_id: Uuid,
    pub user_id: String,
    pub persona: Persona,
    pub situation: Situation,
    state: SessionState,
    turns: Vec<Turn>,
    achieved_goals: BTreeSet<usize>,
    stuck_counter: u32,
    should_close: bool,
    pub started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl SimulationSession {
    /// Create new session in INITIALIZING state
    pub fn new(user_id: impl Into<String>, persona: Persona, situation: Situation) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            persona,
            situation,
            state: SessionState::Initializing,
            turns: Vec::new(),
            achieved_goals: BTreeSet::new(),
            stuck_counter: 0,
            should_close: false,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn achieved_goals(&self) -> &BTreeSet<usize> {
        &self.achieved_goals
    }

    pub fn stuck_counter(&self) -> u32 {
        self.stuck_counter
    }

    pub fn should_close(&self) -> bool {
        self.should_close
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Session duration; up to now for sessions still running
    pub fn duration_seconds(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0)
    }

    pub fn employee_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Speaker::Employee).count()
    }

    /// Goal progress 0-100
    pub fn goal_score(&self) -> f64 {
        let total = self.situation.goals.len();
        if total == 0 {
            return 0.0;
        }
        (self.achieved_goals.len() as f64 / total as f64) * 100.0
    }

    pub fn phase(&self) -> ConversationPhase {
        ConversationPhase::derive(
            self.employee_turn_count(),
            self.achieved_goals.len(),
            self.situation.goals.len(),
            self.should_close,
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.state == SessionState::Completed
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            session_id: self.session_id,
            state: self.state.as_str(),
            operation,
        }
    }

    /// Fail unless the session accepts employee turns
    pub(crate) fn ensure_in_progress(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.state == SessionState::InProgress {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn transition_to(&mut self, new_state: SessionState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        transition
    }

    /// Append a turn at the end of the history
    ///
    /// Only the opening customer turn may be appended while initializing.
    pub(crate) fn append_turn(
        &mut self,
        role: Speaker,
        text: impl Into<String>,
    ) -> Result<&Turn, SessionError> {
        let allowed = match self.state {
            SessionState::InProgress => true,
            SessionState::Initializing => role == Speaker::Customer && self.turns.is_empty(),
            SessionState::Completing | SessionState::Completed => false,
        };
        if !allowed {
            return Err(self.invalid("append a turn"));
        }

        self.turns.push(Turn {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        });
        Ok(&self.turns[self.turns.len() - 1])
    }

    /// INITIALIZING → IN_PROGRESS once the opening turn exists
    pub(crate) fn start(&mut self) -> Result<StateTransition, SessionError> {
        if self.state != SessionState::Initializing || self.turns.is_empty() {
            return Err(self.invalid("start"));
        }
        Ok(self.transition_to(SessionState::InProgress))
    }

    /// Merge newly achieved goals; out-of-range indices are ignored
    pub(crate) fn record_achieved_goals(&mut self, indices: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let goal_count = self.situation.goals.len();
        let mut newly = Vec::new();
        for index in indices {
            if index < goal_count && self.achieved_goals.insert(index) {
                newly.push(index);
            }
        }
        newly
    }

    /// Increment on repetition, reset on fresh content
    pub(crate) fn record_repetition(&mut self, repeated: bool) {
        if repeated {
            self.stuck_counter += 1;
        } else {
            self.stuck_counter = 0;
        }
    }

    pub(crate) fn request_close(&mut self) {
        self.should_close = true;
    }

    /// IN_PROGRESS → COMPLETING; freezes history and stamps end time
    pub(crate) fn begin_completion(&mut self) -> Result<StateTransition, SessionError> {
        if self.state != SessionState::InProgress {
            return Err(self.invalid("end"));
        }
        self.ended_at = Some(Utc::now());
        Ok(self.transition_to(SessionState::Completing))
    }

    /// COMPLETING → COMPLETED
    pub(crate) fn finish(&mut self) -> Result<StateTransition, SessionError> {
        if self.state != SessionState::Completing {
            return Err(self.invalid("finish"));
        }
        Ok(self.transition_to(SessionState::Completed))
    }
}
