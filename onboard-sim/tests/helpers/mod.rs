//! Shared fixtures for onboard-sim integration tests
//!
//! - In-memory SQLite with seeded reference chunks
//! - Scripted generation client that answers per call kind
//! - Engine builder over the shipped content directory

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use onboard_sim::catalog::ContentCatalog;
use onboard_sim::db::{init_memory_pool, SqliteDocumentStore, SqliteSessionStore};
use onboard_sim::services::{
    Chunk, Collaborators, EngineSettings, GenerationClient, GenerationError, GenerationRequest, SessionEngine,
    SpeechError, SpeechToText, SttTier, TextToSpeech, VoiceProfile,
};

/// Which pipeline step a generation request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Dialogue,
    Goals,
    Scoring,
}

fn classify(request: &GenerationRequest) -> CallKind {
    if request.system.contains("grading a new employee") {
        CallKind::Scoring
    } else if request.system.contains("Decide which of the customer's") {
        CallKind::Goals
    } else {
        CallKind::Dialogue
    }
}

/// Generation double with per-kind scripted replies
///
/// Queued replies are used first; afterwards the kind's default applies.
pub struct ScriptedGenerationClient {
    dialogue: Mutex<VecDeque<String>>,
    goals: Mutex<VecDeque<String>>,
    default_dialogue: String,
    default_goals: String,
    scoring: String,
    dialogue_delay: Option<Duration>,
    requests: Mutex<Vec<(CallKind, GenerationRequest)>>,
}

impl Default for ScriptedGenerationClient {
    fn default() -> Self {
        Self {
            dialogue: Mutex::new(VecDeque::new()),
            goals: Mutex::new(VecDeque::new()),
            default_dialogue: customer_reply("네, 알겠어요. 조금 더 자세히 알려주실 수 있나요?"),
            default_goals: r#"{"achieved_goals": []}"#.to_string(),
            scoring: scoring_reply([80.0; 6]),
            dialogue_delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedGenerationClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialogue(self, replies: impl IntoIterator<Item = String>) -> Self {
        self.dialogue.lock().unwrap().extend(replies);
        self
    }

    pub fn with_default_dialogue(mut self, reply: String) -> Self {
        self.default_dialogue = reply;
        self
    }

    pub fn with_goals(self, replies: impl IntoIterator<Item = String>) -> Self {
        self.goals.lock().unwrap().extend(replies);
        self
    }

    pub fn with_scoring(mut self, reply: impl Into<String>) -> Self {
        self.scoring = reply.into();
        self
    }

    /// Delay every dialogue reply, e.g. past the generation deadline
    pub fn with_dialogue_delay(mut self, delay: Duration) -> Self {
        self.dialogue_delay = Some(delay);
        self
    }

    pub fn requests(&self, kind: CallKind) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerationClient {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let kind = classify(&request);
        self.requests.lock().unwrap().push((kind, request));

        match kind {
            CallKind::Dialogue => {
                if let Some(delay) = self.dialogue_delay {
                    tokio::time::sleep(delay).await;
                }
                let next = self.dialogue.lock().unwrap().pop_front();
                Ok(next.unwrap_or_else(|| self.default_dialogue.clone()))
            }
            CallKind::Goals => {
                let next = self.goals.lock().unwrap().pop_front();
                Ok(next.unwrap_or_else(|| self.default_goals.clone()))
            }
            CallKind::Scoring => Ok(self.scoring.clone()),
        }
    }
}

/// Speech double: fixed transcripts per tier, fixed audio bytes
pub struct FakeSpeech {
    pub fast: String,
    pub quality: String,
    pub audio: Vec<u8>,
}

#[async_trait]
impl SpeechToText for FakeSpeech {
    async fn transcribe(&self, _audio: &[u8], _language: &str, tier: SttTier) -> Result<String, SpeechError> {
        Ok(match tier {
            SttTier::Fast => self.fast.clone(),
            SttTier::Quality => self.quality.clone(),
        })
    }
}

#[async_trait]
impl TextToSpeech for FakeSpeech {
    async fn synthesize(&self, _text: &str, _voice: &VoiceProfile) -> Result<Vec<u8>, SpeechError> {
        Ok(self.audio.clone())
    }
}

/// Speech double whose transcription works and whose synthesis errors
pub struct FailingSpeech {
    pub transcript: String,
}

#[async_trait]
impl SpeechToText for FailingSpeech {
    async fn transcribe(&self, _audio: &[u8], _language: &str, _tier: SttTier) -> Result<String, SpeechError> {
        Ok(self.transcript.clone())
    }
}

#[async_trait]
impl TextToSpeech for FailingSpeech {
    async fn synthesize(&self, _text: &str, _voice: &VoiceProfile) -> Result<Vec<u8>, SpeechError> {
        Err(SpeechError::Response("HTTP 503: voice backend down".to_string()))
    }
}

/// Speech double whose synthesis outlasts the `fast_settings` TTS deadline
pub struct SlowSpeech {
    pub transcript: String,
    pub delay: Duration,
}

#[async_trait]
impl SpeechToText for SlowSpeech {
    async fn transcribe(&self, _audio: &[u8], _language: &str, _tier: SttTier) -> Result<String, SpeechError> {
        Ok(self.transcript.clone())
    }
}

#[async_trait]
impl TextToSpeech for SlowSpeech {
    async fn synthesize(&self, _text: &str, _voice: &VoiceProfile) -> Result<Vec<u8>, SpeechError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![9, 9, 9])
    }
}

/// Structured customer reply as the model would return it
pub fn customer_reply(script: &str) -> String {
    serde_json::json!({
        "script": script,
        "followups": [],
        "safety_notes": [],
        "grounding": [],
        "end_conversation": false,
    })
    .to_string()
}

/// Customer reply that ends the conversation
pub fn closing_reply(script: &str) -> String {
    serde_json::json!({
        "script": script,
        "followups": [],
        "safety_notes": [],
        "grounding": [],
        "end_conversation": true,
    })
    .to_string()
}

/// Scoring reply with axes in `Competency::ALL` order
pub fn scoring_reply(scores: [f64; 6]) -> String {
    let axes = ["knowledge", "skill", "empathy", "clarity", "kindness", "confidence"];
    let mut object = serde_json::Map::new();
    for (axis, score) in axes.iter().zip(scores) {
        object.insert(
            axis.to_string(),
            serde_json::json!({ "score": score, "feedback": format!("{} feedback", axis) }),
        );
    }
    object.insert("summary".to_string(), serde_json::json!("Solid session overall."));
    object.insert("improvements".to_string(), serde_json::json!(["Confirm the deposit term earlier"]));
    serde_json::Value::Object(object).to_string()
}

pub fn content_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("content")
}

pub fn catalog() -> Arc<ContentCatalog> {
    Arc::new(ContentCatalog::load(&content_dir()).expect("shipped content loads"))
}

fn chunk(document_id: &str, chunk_index: i64, title: &str, category: &str, content: &str) -> Chunk {
    Chunk {
        document_id: document_id.to_string(),
        title: title.to_string(),
        category: category.to_string(),
        content: content.to_string(),
        chunk_index,
        similarity: 0.0,
    }
}

/// Reference chunks used across the tests
pub fn reference_chunks() -> Vec<Chunk> {
    vec![
        chunk("doc-proxy-form", 0, "위임장 양식", "forms", "위임장에는 위임인과 대리인의 인적사항, 위임 내용, 인감 날인이 필요합니다."),
        chunk("doc-proxy-form", 1, "위임장 양식", "forms", "대리인은 본인 신분증과 위임인의 인감증명서를 지참해야 합니다."),
        chunk("doc-term-deposit", 0, "정기예금 상품설명서", "deposit", "정기예금 기본금리는 연 3.0%이며 급여이체 시 우대금리 0.3%p가 적용됩니다."),
        chunk("doc-term-deposit", 1, "정기예금 상품설명서", "deposit", "중도해지 시에는 중도해지 이율이 적용되어 약정 금리보다 낮은 이자를 받습니다."),
        chunk("doc-protection", 0, "예금자보호 안내", "compliance", "예금자보호법에 따라 원금과 이자를 합하여 1인당 최고 5천만원까지 보호됩니다."),
        chunk("doc-jeonse", 0, "전세자금대출 안내", "loan", "전세자금대출 한도는 보증금의 80% 이내에서 소득과 신용도에 따라 산정됩니다."),
    ]
}

/// Fresh in-memory database with seeded reference chunks
pub async fn seeded_pool() -> SqlitePool {
    let pool = init_memory_pool().await.expect("memory pool");
    let store = SqliteDocumentStore::new(pool.clone());
    for chunk in reference_chunks() {
        store.upsert_chunk(&chunk).await.expect("seed chunk");
    }
    pool
}

/// Settings with short deadlines so degraded paths resolve quickly
pub fn fast_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.generation_timeout = Duration::from_millis(500);
    settings.goal_analysis_timeout = Duration::from_millis(500);
    settings.scoring_timeout = Duration::from_millis(500);
    settings.tts_timeout = Duration::from_millis(200);
    settings.router.search_timeout = Duration::from_millis(500);
    settings
}

pub struct TestEngine {
    pub engine: Arc<SessionEngine>,
    pub client: Arc<ScriptedGenerationClient>,
    pub pool: SqlitePool,
    pub store: Arc<SqliteSessionStore>,
}

/// Engine over the shipped content, seeded SQLite and a scripted client
pub async fn test_engine(client: ScriptedGenerationClient, settings: EngineSettings) -> TestEngine {
    test_engine_with_speech(client, settings, None, None).await
}

/// Same as [`test_engine`] with speech collaborators
pub async fn test_engine_with_speech(
    client: ScriptedGenerationClient,
    settings: EngineSettings,
    stt: Option<Arc<dyn SpeechToText>>,
    tts: Option<Arc<dyn TextToSpeech>>,
) -> TestEngine {
    let pool = seeded_pool().await;
    let client = Arc::new(client);
    let store = Arc::new(SqliteSessionStore::new(pool.clone(), 1_000));

    let collaborators = Collaborators {
        search: Arc::new(SqliteDocumentStore::new(pool.clone())),
        generator: client.clone(),
        store: store.clone(),
        stt,
        tts,
    };
    let engine = SessionEngine::new(catalog(), collaborators, settings, CancellationToken::new()).await;

    TestEngine {
        engine: Arc::new(engine),
        client,
        pool,
        store,
    }
}

/// Poll until `check` passes or two seconds elapse
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
