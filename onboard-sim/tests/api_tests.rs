//! HTTP API integration tests

mod helpers;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use helpers::{
    fast_settings, test_engine, test_engine_with_speech, FailingSpeech, FakeSpeech, ScriptedGenerationClient,
};
use onboard_sim::services::{SpeechToText, TextToSpeech};
use onboard_sim::{build_router, AppState};

async fn app() -> Router {
    let t = test_engine(ScriptedGenerationClient::new(), fast_settings()).await;
    build_router(AppState::new(t.engine))
}

async fn app_with_speech() -> Router {
    let speech = Arc::new(FakeSpeech {
        fast: "전기예금 금리 알려드릴게요".to_string(),
        quality: "정기예금 금리 알려드릴게요".to_string(),
        audio: vec![1, 2, 3, 4],
    });
    let t = test_engine_with_speech(
        ScriptedGenerationClient::new(),
        fast_settings(),
        Some(speech.clone() as Arc<dyn SpeechToText>),
        Some(speech as Arc<dyn TextToSpeech>),
    )
    .await;
    build_router(AppState::new(t.engine))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn start(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/sessions",
        Some(json!({
            "user_id": "trainee-1",
            "persona_id": "elderly-depositor",
            "situation_id": "term-deposit-signup"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_module_and_sessions() {
    let app = app().await;
    start(&app).await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "onboard-sim");
    assert_eq!(body["sessions"], 1);
}

#[tokio::test]
async fn start_session_returns_opening_turn() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/sessions",
        Some(json!({
            "user_id": "trainee-1",
            "persona_id": "elderly-depositor",
            "situation_id": "term-deposit-signup"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["state"], "IN_PROGRESS");
    assert_eq!(body["conversation_phase"], "opening");
    assert_eq!(body["turns"].as_array().unwrap().len(), 1);
    assert_eq!(body["turns"][0]["role"], "customer");
}

#[tokio::test]
async fn unknown_persona_is_not_found() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/sessions",
        Some(json!({
            "user_id": "trainee-1",
            "persona_id": "nobody",
            "situation_id": "term-deposit-signup"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn text_turn_returns_turn_result() {
    let app = app().await;
    let id = start(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{}/turns", id),
        Some(json!({ "text": "전기예금 금리가 어떻게 되나요" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["normalized_text"].as_str().unwrap().contains("정기예금"));
    assert!(body["customer_response_text"].as_str().is_some());
    assert!(body["retrieval_mode"] == "RAG" || body["retrieval_mode"] == "GENERAL");
    assert!(body.get("audio").is_none());

    let (status, body) = send(&app, "GET", &format!("/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["turns"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn empty_text_is_bad_request() {
    let app = app().await;
    let id = start(&app).await;

    let (status, body) = send(&app, "POST", &format!("/sessions/{}/turns", id), Some(json!({ "text": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let app = app().await;
    let uri = format!("/sessions/{}", uuid::Uuid::new_v4());
    let (status, _) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn end_defaults_to_feedback_and_turns_then_conflict() {
    let app = app().await;
    let id = start(&app).await;

    let (status, body) = send(&app, "POST", &format!("/sessions/{}/end", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "feedback");
    assert_eq!(body["session"]["state"], "COMPLETED");
    assert_eq!(body["evaluation"]["grade"], "B");

    let (status, body) = send(&app, "POST", &format!("/sessions/{}/turns", id), Some(json!({ "text": "안녕하세요" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn exam_end_withholds_evaluation() {
    let app = app().await;
    let id = start(&app).await;

    let (status, body) = send(&app, "POST", &format!("/sessions/{}/end", id), Some(json!({ "mode": "exam" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "exam");
    assert!(body["evaluation"].is_null());
}

#[tokio::test]
async fn voice_turn_without_speech_is_unavailable() {
    let app = app().await;
    let id = start(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{}/voice-turns", id),
        Some(json!({ "audio_base64": STANDARD.encode(b"RIFF0000WAVE") })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn invalid_base64_is_bad_request() {
    let app = app_with_speech().await;
    let id = start(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/sessions/{}/voice-turns", id),
        Some(json!({ "audio_base64": "not base64 !!" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn voice_turn_transcribes_and_returns_audio() {
    let app = app_with_speech().await;
    let id = start(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{}/voice-turns", id),
        Some(json!({ "audio_base64": STANDARD.encode(b"RIFF0000WAVE"), "language": "ko" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // One alias correction on the fast pass does not promote
    assert_eq!(body["transcribed_text"], "전기예금 금리 알려드릴게요");
    assert!(body["normalized_text"].as_str().unwrap().contains("정기예금"));
    assert_eq!(body["audio_base64"], STANDARD.encode([1u8, 2, 3, 4]));
}

#[tokio::test]
async fn voice_turn_with_failed_synthesis_returns_empty_audio() {
    let speech = Arc::new(FailingSpeech {
        transcript: "정기예금 금리 알려드릴게요".to_string(),
    });
    let t = test_engine_with_speech(
        ScriptedGenerationClient::new(),
        fast_settings(),
        Some(speech.clone() as Arc<dyn SpeechToText>),
        Some(speech as Arc<dyn TextToSpeech>),
    )
    .await;
    let app = build_router(AppState::new(t.engine));
    let id = start(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{}/voice-turns", id),
        Some(json!({ "audio_base64": STANDARD.encode(b"RIFF0000WAVE") })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body["customer_response_text"].as_str().unwrap().is_empty());
    assert_eq!(body["audio_base64"], "");
}
