//! Service modules for the conversational training pipeline
//!
//! Text path: normalizer → retrieval router → prompt composer → generation.
//! Voice path wraps it with two-tier transcription and synthesis.
//! The session engine drives both and owns the session lifecycle.

pub mod competency_scorer;
pub mod entity_extractor;
pub mod generation_client;
pub mod goal_analyzer;
pub mod lexicon;
pub mod normalizer;
pub mod prompt_composer;
pub mod repetition_detector;
pub mod retrieval_router;
pub mod session_engine;
pub mod session_registry;
pub mod speech_client;
pub mod title_gate;
pub mod voice_profile;

pub use competency_scorer::CompetencyScorer;
pub use generation_client::{
    GenerationClient, GenerationError, GenerationRequest, HttpGenerationClient, HttpGenerationConfig,
};
pub use goal_analyzer::GoalAnalyzer;
pub use lexicon::{DomainLexicon, LexiconSource};
pub use normalizer::{Correction, DomainNormalizer, NormalizationResult};
pub use prompt_composer::{ComposedPrompt, CustomerReply, PromptComposer};
pub use retrieval_router::{
    Chunk, DocumentSearch, RetrievalError, RetrievalOutcome, RetrievalRouter, RouterSettings, SearchRequest,
    ThresholdPair,
};
pub use session_engine::{Collaborators, EndMode, EndOutcome, EngineSettings, SessionEngine, SessionSnapshot};
pub use session_registry::{SessionHandle, SessionRegistry};
pub use speech_client::{
    HttpSpeechClient, HttpSpeechConfig, SpeechError, SpeechToText, SttTier, TextToSpeech, Transcription,
    TwoTierTranscriber,
};
pub use title_gate::TitleIndex;
pub use voice_profile::{voice_profile, VoiceProfile};
