//! Data models for onboard-sim (conversational training simulator)
//!
//! - Persona and situation descriptors (read-only content)
//! - Simulation session state machine
//! - Per-turn results and end-of-session competency evaluation

pub mod evaluation;
pub mod persona;
pub mod session;
pub mod situation;
pub mod turn;

pub use evaluation::{Competency, CompetencyEvaluation, CompetencyScore, Grade};
pub use persona::{Demographics, Gender, Persona, PersonaStyle};
pub use session::{SessionError, SessionState, SimulationSession, Speaker, StateTransition, Turn};
pub use situation::Situation;
pub use turn::{ConversationPhase, RetrievalMode, TurnResult};
