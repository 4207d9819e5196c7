//! Speech collaborators (STT and TTS)
//!
//! **Two-tier transcription:** the fast tier always runs. Its text is
//! normalized, and the quality tier is consulted only when that
//! normalization looks unreliable (≥ 2 corrections or a clarification flag).
//! A failed quality pass keeps the fast result.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::normalizer::{DomainNormalizer, NormalizationResult};
use super::voice_profile::VoiceProfile;
use crate::utils::{with_deadline, DeadlineError};

/// Transcription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttTier {
    /// Low-latency model, always used first
    Fast,
    /// Slower, more accurate model
    Quality,
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Response error: {0}")]
    Response(String),

    #[error("Speech call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Speech call cancelled")]
    Cancelled,
}

impl From<DeadlineError> for SpeechError {
    fn from(err: DeadlineError) -> Self {
        match err {
            DeadlineError::TimedOut(after) => SpeechError::Timeout(after),
            DeadlineError::Cancelled => SpeechError::Cancelled,
        }
    }
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8], language: &str, tier: SttTier) -> Result<String, SpeechError>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>, SpeechError>;
}

/// OpenAI-compatible speech endpoints
#[derive(Debug, Clone)]
pub struct HttpSpeechConfig {
    /// API base, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub api_key: Option<String>,
    pub fast_model: String,
    pub quality_model: String,
    pub tts_model: String,
    pub timeout: Duration,
}

impl Default for HttpSpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            fast_model: "gpt-4o-mini-transcribe".to_string(),
            quality_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpSpeechClient {
    client: reqwest::Client,
    config: HttpSpeechConfig,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'static str,
}

impl HttpSpeechClient {
    pub fn new(config: HttpSpeechConfig) -> Result<Self, SpeechError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SpeechError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechClient {
    async fn transcribe(&self, audio: &[u8], language: &str, tier: SttTier) -> Result<String, SpeechError> {
        let model = match tier {
            SttTier::Fast => &self.config.fast_model,
            SttTier::Quality => &self.config.quality_model,
        };

        let file = Part::bytes(audio.to_vec())
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| SpeechError::Http(e.to_string()))?;
        let form = Form::new()
            .part("file", file)
            .text("model", model.clone())
            .text("language", language.to_string());

        let response = self
            .authorized(self.client.post(self.url("audio/transcriptions")))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SpeechError::Response(format!("HTTP {}: {}", status, text)));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Response(e.to_string()))?;
        Ok(parsed.text)
    }
}

#[async_trait]
impl TextToSpeech for HttpSpeechClient {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>, SpeechError> {
        let body = SpeechRequest {
            model: &self.config.tts_model,
            input: text,
            voice: &voice.voice_id,
            speed: voice.rate,
            response_format: "mp3",
        };

        let response = self
            .authorized(self.client.post(self.url("audio/speech")))
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SpeechError::Response(format!("HTTP {}: {}", status, text)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Transcript with its normalization and the tier that produced it
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub normalization: NormalizationResult,
    pub tier: SttTier,
}

/// Confidence hint given to the normalizer for each tier
const FAST_TIER_HINT: f64 = 0.8;
const QUALITY_TIER_HINT: f64 = 0.9;

/// Fast-then-quality transcription policy
pub struct TwoTierTranscriber {
    stt: Arc<dyn SpeechToText>,
    timeout: Duration,
}

impl TwoTierTranscriber {
    pub fn new(stt: Arc<dyn SpeechToText>, timeout: Duration) -> Self {
        Self { stt, timeout }
    }

    fn should_promote(normalization: &NormalizationResult) -> bool {
        normalization.corrections.len() >= 2 || normalization.needs_clarification
    }

    /// Transcribe and normalize; only a fast-tier failure is an error
    pub async fn transcribe(
        &self,
        audio: &[u8],
        language: &str,
        normalizer: &DomainNormalizer,
        cancel: &CancellationToken,
    ) -> Result<Transcription, SpeechError> {
        let fast_text = with_deadline(
            self.timeout,
            cancel,
            self.stt.transcribe(audio, language, SttTier::Fast),
        )
        .await??;
        let fast = Transcription {
            normalization: normalizer.normalize(&fast_text, FAST_TIER_HINT),
            text: fast_text,
            tier: SttTier::Fast,
        };

        if !Self::should_promote(&fast.normalization) {
            return Ok(fast);
        }

        tracing::debug!(
            corrections = fast.normalization.corrections.len(),
            "Fast transcription unreliable, promoting to quality tier"
        );

        let quality = with_deadline(
            self.timeout,
            cancel,
            self.stt.transcribe(audio, language, SttTier::Quality),
        )
        .await
        .map_err(SpeechError::from)
        .and_then(|result| result);

        match quality {
            Ok(text) if !text.trim().is_empty() => Ok(Transcription {
                normalization: normalizer.normalize(&text, QUALITY_TIER_HINT),
                text,
                tier: SttTier::Quality,
            }),
            Ok(_) => Ok(fast),
            Err(e) => {
                tracing::warn!(error = %e, "Quality transcription failed, keeping fast result");
                Ok(fast)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lexicon::DomainLexicon;
    use std::sync::Mutex;

    struct ScriptedStt {
        fast: String,
        quality: Result<String, ()>,
        calls: Mutex<Vec<SttTier>>,
    }

    #[async_trait]
    impl SpeechToText for ScriptedStt {
        async fn transcribe(&self, _audio: &[u8], _language: &str, tier: SttTier) -> Result<String, SpeechError> {
            self.calls.lock().unwrap().push(tier);
            match tier {
                SttTier::Fast => Ok(self.fast.clone()),
                SttTier::Quality => self
                    .quality
                    .clone()
                    .map_err(|_| SpeechError::Response("quality model unavailable".to_string())),
            }
        }
    }

    fn normalizer() -> DomainNormalizer {
        let lexicon = DomainLexicon::from_toml_str(
            r#"
            [[terms]]
            canonical = "정기예금"
            aliases = ["전기예금"]

            [[terms]]
            canonical = "주택청약"
            aliases = ["주택청악"]
            "#,
        )
        .unwrap();
        DomainNormalizer::new(Arc::new(lexicon))
    }

    fn stt(fast: &str, quality: Result<&str, ()>) -> Arc<ScriptedStt> {
        Arc::new(ScriptedStt {
            fast: fast.to_string(),
            quality: quality.map(str::to_string),
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn clean_fast_result_is_not_promoted() {
        let scripted = stt("정기예금 금리 알려주세요", Ok("unused"));
        let transcriber = TwoTierTranscriber::new(scripted.clone(), Duration::from_secs(1));

        let result = transcriber
            .transcribe(b"pcm", "ko", &normalizer(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.tier, SttTier::Fast);
        assert_eq!(*scripted.calls.lock().unwrap(), vec![SttTier::Fast]);
    }

    #[tokio::test]
    async fn two_corrections_promote_to_quality() {
        let scripted = stt("전기예금 주택청악", Ok("정기예금 주택청약"));
        let transcriber = TwoTierTranscriber::new(scripted.clone(), Duration::from_secs(1));

        let result = transcriber
            .transcribe(b"pcm", "ko", &normalizer(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.tier, SttTier::Quality);
        assert_eq!(result.text, "정기예금 주택청약");
        assert!(result.normalization.corrections.is_empty());
    }

    #[tokio::test]
    async fn failed_quality_pass_keeps_fast_result() {
        let scripted = stt("전기예금 주택청악", Err(()));
        let transcriber = TwoTierTranscriber::new(scripted.clone(), Duration::from_secs(1));

        let result = transcriber
            .transcribe(b"pcm", "ko", &normalizer(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.tier, SttTier::Fast);
        assert_eq!(result.normalization.normalized, "정기예금 주택청약");
        assert_eq!(scripted.calls.lock().unwrap().len(), 2);
    }
}
