//! Session engine
//!
//! Owns the session lifecycle and runs the per-turn pipeline:
//!
//! ```text
//! employee utterance
//!   → normalize → classify intent → route (RAG | GENERAL)
//!   → compose → generate (deadline, fallback) → parse
//!   → append turns → repetition check → goal analysis → close check
//! ```
//!
//! Every collaborator call runs under a deadline and the session's
//! cancellation token. Degraded collaborators never fail a turn: generation
//! falls back to a fixed in-character reply, retrieval falls back to GENERAL,
//! synthesis falls back to empty audio.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::competency_scorer::CompetencyScorer;
use super::generation_client::GenerationClient;
use super::goal_analyzer::GoalAnalyzer;
use super::normalizer::{DomainNormalizer, NormalizationResult};
use super::prompt_composer::{CustomerReply, PromptComposer, FALLBACK_REPLY};
use super::repetition_detector::is_repetition;
use super::retrieval_router::{DocumentSearch, RetrievalRouter, RouterSettings};
use super::session_registry::{SessionHandle, SessionRegistry};
use super::speech_client::{SpeechToText, TextToSpeech, TwoTierTranscriber};
use super::voice_profile::voice_profile;
use crate::catalog::ContentCatalog;
use crate::db::SessionStore;
use crate::models::{
    CompetencyEvaluation, ConversationPhase, SessionError, SessionState, SimulationSession, Speaker,
    Turn, TurnResult,
};
use crate::utils::with_deadline;

/// How the end-of-session evaluation is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndMode {
    /// Scoring runs detached; the caller gets no evaluation
    Exam,
    /// Scoring is awaited and returned to the caller
    #[default]
    Feedback,
}

/// Deadlines and sampling knobs for the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub generation_timeout: Duration,
    pub goal_analysis_timeout: Duration,
    pub scoring_timeout: Duration,
    pub stt_timeout: Duration,
    pub tts_timeout: Duration,
    pub dialogue_temperature: f32,
    pub analysis_temperature: f32,
    pub max_reply_tokens: u32,
    pub fuzzy_cutoff: f64,
    /// Language hint for voice turns that do not name one
    pub language: String,
    pub router: RouterSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(8),
            goal_analysis_timeout: Duration::from_secs(5),
            scoring_timeout: Duration::from_secs(30),
            stt_timeout: Duration::from_secs(10),
            tts_timeout: Duration::from_secs(5),
            dialogue_temperature: 0.6,
            analysis_temperature: 0.2,
            max_reply_tokens: 400,
            fuzzy_cutoff: super::normalizer::DEFAULT_FUZZY_CUTOFF,
            language: "ko".to_string(),
            router: RouterSettings::default(),
        }
    }
}

/// External collaborators the engine drives
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn DocumentSearch>,
    pub generator: Arc<dyn GenerationClient>,
    pub store: Arc<dyn SessionStore>,
    pub stt: Option<Arc<dyn SpeechToText>>,
    pub tts: Option<Arc<dyn TextToSpeech>>,
}

/// Read-only view of a session for callers
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub user_id: String,
    pub persona_id: String,
    pub situation_id: String,
    pub state: SessionState,
    pub turns: Vec<Turn>,
    pub achieved_goals: Vec<usize>,
    pub stuck_counter: u32,
    pub should_close: bool,
    pub conversation_phase: ConversationPhase,
    pub session_score: f64,
    pub duration_seconds: i64,
}

impl From<&SimulationSession> for SessionSnapshot {
    fn from(session: &SimulationSession) -> Self {
        Self {
            session_id: session.session_id,
            user_id: session.user_id.clone(),
            persona_id: session.persona.id.clone(),
            situation_id: session.situation.id.clone(),
            state: session.state(),
            turns: session.turns().to_vec(),
            achieved_goals: session.achieved_goals().iter().copied().collect(),
            stuck_counter: session.stuck_counter(),
            should_close: session.should_close(),
            conversation_phase: session.phase(),
            session_score: session.goal_score(),
            duration_seconds: session.duration_seconds(),
        }
    }
}

/// Result of ending a session
#[derive(Debug, Clone, Serialize)]
pub struct EndOutcome {
    pub session: SessionSnapshot,
    pub mode: EndMode,
    /// Present in feedback mode only
    pub evaluation: Option<CompetencyEvaluation>,
}

pub struct SessionEngine {
    catalog: Arc<ContentCatalog>,
    normalizer: DomainNormalizer,
    router: RetrievalRouter,
    composer: PromptComposer,
    generator: Arc<dyn GenerationClient>,
    goals: GoalAnalyzer,
    scorer: Arc<CompetencyScorer>,
    store: Arc<dyn SessionStore>,
    transcriber: Option<TwoTierTranscriber>,
    tts: Option<Arc<dyn TextToSpeech>>,
    registry: SessionRegistry,
    /// Exam scoring and archive writes still running after their request returned
    tasks: TaskTracker,
    settings: EngineSettings,
}

impl SessionEngine {
    /// Build the engine; the title index is loaded from the search collaborator
    pub async fn new(
        catalog: Arc<ContentCatalog>,
        collaborators: Collaborators,
        settings: EngineSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let lexicon = catalog.lexicon().clone();
        let titles = RetrievalRouter::load_title_index(collaborators.search.as_ref()).await;
        tracing::info!(titles = titles.len(), "Title index ready");

        let router = RetrievalRouter::new(
            collaborators.search.clone(),
            lexicon.clone(),
            Arc::new(titles),
            settings.router.clone(),
        );

        Self {
            normalizer: DomainNormalizer::new(lexicon).with_fuzzy_cutoff(settings.fuzzy_cutoff),
            router,
            composer: PromptComposer::new(settings.dialogue_temperature, settings.max_reply_tokens),
            goals: GoalAnalyzer::new(collaborators.generator.clone(), settings.analysis_temperature),
            scorer: Arc::new(CompetencyScorer::new(
                collaborators.generator.clone(),
                settings.analysis_temperature,
                settings.scoring_timeout,
            )),
            generator: collaborators.generator,
            store: collaborators.store,
            transcriber: collaborators
                .stt
                .map(|stt| TwoTierTranscriber::new(stt, settings.stt_timeout)),
            tts: collaborators.tts,
            registry: SessionRegistry::new(shutdown),
            tasks: TaskTracker::new(),
            catalog,
            settings,
        }
    }

    pub fn catalog(&self) -> &ContentCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn default_language(&self) -> &str {
        &self.settings.language
    }

    /// Create a session and generate the customer's opening line
    pub async fn start_session(
        &self,
        user_id: &str,
        persona_id: &str,
        situation_id: &str,
    ) -> Result<SessionSnapshot, SessionError> {
        let persona = self
            .catalog
            .persona(persona_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownPersona(persona_id.to_string()))?;
        let situation = self
            .catalog
            .situation(situation_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSituation(situation_id.to_string()))?;

        let mut session = SimulationSession::new(user_id, persona, situation);
        let session_id = session.session_id;
        let cancel = self.registry.root_token().child_token();

        let prompt = self.composer.compose_opening(&session.persona, &session.situation);
        let raw = self.generate(session_id, prompt.request, &cancel).await;
        let reply = self.composer.parse_reply(&raw, &prompt.evidence_ids);

        session.append_turn(Speaker::Customer, reply.script)?;
        let transition = session.start()?;
        tracing::info!(
            session_id = %session_id,
            persona = %session.persona.id,
            situation = %session.situation.id,
            old_state = ?transition.old_state,
            new_state = ?transition.new_state,
            "Simulation session started"
        );

        let snapshot = SessionSnapshot::from(&session);
        self.registry.insert(session).await;
        Ok(snapshot)
    }

    pub async fn snapshot(&self, session_id: Uuid) -> Result<SessionSnapshot, SessionError> {
        let handle = self.registry.get(session_id).await?;
        let session = handle.acquire().await;
        Ok(SessionSnapshot::from(&*session))
    }

    /// Run one text turn
    pub async fn run_turn(
        &self,
        session_id: Uuid,
        text: &str,
        confidence_hint: f64,
    ) -> Result<TurnResult, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyUtterance);
        }

        let handle = self.registry.get(session_id).await?;
        let mut session = handle.try_acquire(session_id)?;
        Self::ensure_accepting_turns(&session)?;

        let normalization = self.normalizer.normalize(text, confidence_hint);
        self.process_turn(&mut session, &handle, text.to_string(), normalization)
            .await
    }

    /// Run one voice turn: two-tier transcription, pipeline, synthesis
    pub async fn run_voice_turn(
        &self,
        session_id: Uuid,
        audio: &[u8],
        language: &str,
    ) -> Result<TurnResult, SessionError> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or_else(|| SessionError::SpeechUnavailable("speech-to-text not configured".to_string()))?;

        let handle = self.registry.get(session_id).await?;
        let mut session = handle.try_acquire(session_id)?;
        Self::ensure_accepting_turns(&session)?;

        let transcription = transcriber
            .transcribe(audio, language, &self.normalizer, handle.cancel_token())
            .await
            .map_err(|e| SessionError::SpeechUnavailable(e.to_string()))?;
        if transcription.text.trim().is_empty() {
            return Err(SessionError::EmptyUtterance);
        }
        tracing::debug!(session_id = %session_id, tier = ?transcription.tier, "Voice turn transcribed");

        let mut result = self
            .process_turn(&mut session, &handle, transcription.text, transcription.normalization)
            .await?;
        result.audio = self
            .synthesize(&session, &result.customer_response_text, handle.cancel_token())
            .await;
        Ok(result)
    }

    /// End a session and evaluate it
    ///
    /// Feedback mode awaits the scorer and returns the evaluation. Exam mode
    /// detaches scoring; the session stays COMPLETING until it finishes.
    /// Persistence is always detached.
    pub async fn end_session(&self, session_id: Uuid, mode: EndMode) -> Result<EndOutcome, SessionError> {
        let handle = self.registry.get(session_id).await?;
        let mut session = handle.try_acquire(session_id)?;

        let transition = session.begin_completion()?;
        handle.cancel_token().cancel();
        tracing::info!(
            session_id = %session_id,
            mode = ?mode,
            turns = session.turns().len(),
            duration_seconds = session.duration_seconds(),
            old_state = ?transition.old_state,
            new_state = ?transition.new_state,
            "Simulation session ending"
        );

        // Scoring outlives the session token; shutdown drains it before cancelling the root
        let scoring_cancel = self.registry.root_token().clone();
        let turns = session.turns().to_vec();
        let persona = session.persona.clone();
        let situation = session.situation.clone();

        match mode {
            EndMode::Feedback => {
                let evaluation = self
                    .scorer
                    .evaluate(&turns, &persona, &situation, &scoring_cancel)
                    .await;
                session.finish()?;
                self.persist_detached((*session).clone(), evaluation.clone());

                Ok(EndOutcome {
                    session: SessionSnapshot::from(&*session),
                    mode,
                    evaluation: Some(evaluation),
                })
            }
            EndMode::Exam => {
                let snapshot = SessionSnapshot::from(&*session);
                drop(session);

                let scorer = self.scorer.clone();
                let store = self.store.clone();
                self.tasks.spawn(async move {
                    let evaluation = scorer.evaluate(&turns, &persona, &situation, &scoring_cancel).await;
                    let mut session = handle.acquire().await;
                    if let Err(e) = session.finish() {
                        tracing::error!(session_id = %session_id, error = %e, "Exam session could not be finished");
                        return;
                    }
                    tracing::info!(session_id = %session_id, grade = evaluation.grade.as_str(), "Exam session scored");
                    let completed = (*session).clone();
                    drop(session);
                    if let Err(e) = store.save_completed(&completed, &evaluation).await {
                        tracing::error!(session_id = %session_id, error = %e, "Failed to archive session");
                    }
                });

                Ok(EndOutcome {
                    session: snapshot,
                    mode,
                    evaluation: None,
                })
            }
        }
    }

    fn ensure_accepting_turns(session: &SimulationSession) -> Result<(), SessionError> {
        session.ensure_in_progress("take a turn")?;
        if session.should_close() {
            return Err(SessionError::InvalidState {
                session_id: session.session_id,
                state: "CLOSING",
                operation: "take a turn",
            });
        }
        Ok(())
    }

    /// Shared pipeline for text and voice turns; the session lock is held by the caller
    async fn process_turn(
        &self,
        session: &mut SimulationSession,
        handle: &SessionHandle,
        transcribed_text: String,
        normalization: NormalizationResult,
    ) -> Result<TurnResult, SessionError> {
        let session_id = session.session_id;
        let cancel = handle.cancel_token();
        let lexicon = self.catalog.lexicon();

        let intent = lexicon.classify_intent(&normalization.normalized).to_string();
        let retrieval = self.router.route(&normalization.normalized, &intent, cancel).await;

        let prompt = self.composer.compose(
            &session.persona,
            &session.situation,
            &normalization.normalized,
            &retrieval.documents,
            session.turns(),
            &normalization,
        );
        let raw = self.generate(session_id, prompt.request, cancel).await;
        let mut reply: CustomerReply = self.composer.parse_reply(&raw, &prompt.evidence_ids);
        self.composer.ensure_clarification(&mut reply, &normalization);

        let repeated = is_repetition(
            &reply.script,
            session
                .turns()
                .iter()
                .filter(|t| t.role == Speaker::Customer)
                .map(|t| t.text.as_str()),
        );

        session.append_turn(Speaker::Employee, transcribed_text.clone())?;
        session.append_turn(Speaker::Customer, reply.script.clone())?;
        session.record_repetition(repeated);
        if repeated {
            tracing::debug!(session_id = %session_id, stuck = session.stuck_counter(), "Customer reply repeated earlier content");
        }

        let newly_achieved = self.analyze_goals(session, cancel).await;
        let all_achieved = !session.situation.goals.is_empty()
            && session.achieved_goals().len() == session.situation.goals.len();
        if reply.end_conversation || all_achieved {
            session.request_close();
        }

        tracing::info!(
            session_id = %session_id,
            intent = %intent,
            mode = ?retrieval.mode,
            corrections = normalization.corrections.len(),
            newly_achieved = ?newly_achieved,
            should_close = session.should_close(),
            "Turn completed"
        );

        Ok(TurnResult {
            transcribed_text,
            normalized_text: normalization.normalized,
            customer_response_text: reply.script,
            followups: reply.followups,
            safety_notes: reply.safety_notes,
            conversation_phase: session.phase(),
            session_score: session.goal_score(),
            retrieval_mode: retrieval.mode,
            achieved_goals: session.achieved_goals().iter().copied().collect(),
            should_close: session.should_close(),
            audio: Vec::new(),
        })
    }

    /// Generate under deadline; any failure yields the fallback reply
    async fn generate(
        &self,
        session_id: Uuid,
        request: super::generation_client::GenerationRequest,
        cancel: &CancellationToken,
    ) -> String {
        match with_deadline(self.settings.generation_timeout, cancel, self.generator.complete(request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(session_id = %session_id, error = %e, "Generation failed, using fallback reply");
                FALLBACK_REPLY.to_string()
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Generation did not complete, using fallback reply");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// Goal pass over the full transcript; failure adds nothing
    async fn analyze_goals(&self, session: &mut SimulationSession, cancel: &CancellationToken) -> Vec<usize> {
        if session.situation.goals.is_empty() {
            return Vec::new();
        }

        let analysis = with_deadline(
            self.settings.goal_analysis_timeout,
            cancel,
            self.goals.analyze(&session.situation.goals, session.turns()),
        )
        .await;

        match analysis {
            Ok(Ok(indices)) => session.record_achieved_goals(indices),
            Ok(Err(e)) => {
                tracing::warn!(session_id = %session.session_id, error = %e, "Goal analysis failed, no goals updated");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(session_id = %session.session_id, error = %e, "Goal analysis did not complete, no goals updated");
                Vec::new()
            }
        }
    }

    /// Synthesize the customer line; failure yields empty audio
    async fn synthesize(&self, session: &SimulationSession, text: &str, cancel: &CancellationToken) -> Vec<u8> {
        let Some(tts) = &self.tts else {
            return Vec::new();
        };
        let voice = voice_profile(&session.persona);

        match with_deadline(self.settings.tts_timeout, cancel, tts.synthesize(text, &voice)).await {
            Ok(Ok(audio)) => audio,
            Ok(Err(e)) => {
                tracing::warn!(session_id = %session.session_id, error = %e, "Synthesis failed, returning text only");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(session_id = %session.session_id, error = %e, "Synthesis did not complete, returning text only");
                Vec::new()
            }
        }
    }

    fn persist_detached(&self, session: SimulationSession, evaluation: CompetencyEvaluation) {
        let store = self.store.clone();
        self.tasks.spawn(async move {
            if let Err(e) = store.save_completed(&session, &evaluation).await {
                tracing::error!(session_id = %session.session_id, error = %e, "Failed to archive session");
            }
        });
    }

    /// Drain pending scoring and archive writes, then abort in-flight calls
    /// of every session
    ///
    /// Scoring keeps its own deadline, so the drain is bounded by
    /// `scoring_timeout` plus one store write.
    pub async fn shutdown(&self) {
        self.tasks.close();
        tracing::info!(pending = self.tasks.len(), "Waiting for background session work");
        self.tasks.wait().await;

        tracing::info!("Cancelling in-flight session work");
        self.registry.cancel_all();
    }
}
