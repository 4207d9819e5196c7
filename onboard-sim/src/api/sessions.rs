//! Session API handlers
//!
//! POST /sessions, GET /sessions/:id, POST /sessions/:id/turns,
//! POST /sessions/:id/voice-turns, POST /sessions/:id/end

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::TurnResult;
use crate::services::{EndMode, EndOutcome, SessionSnapshot};
use crate::AppState;

/// POST /sessions request
#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub user_id: String,
    pub persona_id: String,
    pub situation_id: String,
}

/// POST /sessions/:id/turns request
#[derive(Debug, Deserialize)]
pub struct TextTurnRequest {
    pub text: String,
    /// Upstream transcription confidence; typed input is fully trusted
    #[serde(default = "default_confidence_hint")]
    pub confidence_hint: f64,
}

fn default_confidence_hint() -> f64 {
    1.0
}

/// POST /sessions/:id/voice-turns request
#[derive(Debug, Deserialize)]
pub struct VoiceTurnRequest {
    /// Base64-encoded audio clip
    pub audio_base64: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// POST /sessions/:id/voice-turns response
#[derive(Debug, Serialize)]
pub struct VoiceTurnResponse {
    #[serde(flatten)]
    pub turn: TurnResult,
    /// Base64-encoded customer audio; empty when synthesis degraded
    pub audio_base64: String,
}

/// POST /sessions/:id/end request
#[derive(Debug, Default, Deserialize)]
pub struct EndSessionRequest {
    #[serde(default)]
    pub mode: EndMode,
}

/// POST /sessions
pub async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionSnapshot>)> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }

    let snapshot = state
        .engine
        .start_session(&request.user_id, &request.persona_id, &request.situation_id)
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.engine.snapshot(session_id).await?))
}

/// POST /sessions/:id/turns
pub async fn text_turn(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<TextTurnRequest>,
) -> ApiResult<Json<TurnResult>> {
    if !(0.0..=1.0).contains(&request.confidence_hint) {
        return Err(ApiError::BadRequest("confidence_hint must lie in [0, 1]".to_string()));
    }

    let result = state
        .engine
        .run_turn(session_id, &request.text, request.confidence_hint)
        .await?;
    Ok(Json(result))
}

/// POST /sessions/:id/voice-turns
pub async fn voice_turn(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<VoiceTurnRequest>,
) -> ApiResult<Json<VoiceTurnResponse>> {
    let audio = STANDARD
        .decode(request.audio_base64.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("audio_base64 is not valid base64: {}", e)))?;
    if audio.is_empty() {
        return Err(ApiError::BadRequest("audio clip is empty".to_string()));
    }

    let language = request
        .language
        .unwrap_or_else(|| state.engine.default_language().to_string());
    let mut turn = state.engine.run_voice_turn(session_id, &audio, &language).await?;
    let audio_base64 = STANDARD.encode(std::mem::take(&mut turn.audio));

    Ok(Json(VoiceTurnResponse { turn, audio_base64 }))
}

/// POST /sessions/:id/end
///
/// An absent body ends in feedback mode.
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    request: Option<Json<EndSessionRequest>>,
) -> ApiResult<Json<EndOutcome>> {
    let mode = request.map(|Json(r)| r.mode).unwrap_or_default();
    Ok(Json(state.engine.end_session(session_id, mode).await?))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/turns", post(text_turn))
        .route("/sessions/:id/voice-turns", post(voice_turn))
        .route("/sessions/:id/end", post(end_session))
}
