//! Configuration resolution for onboard-sim
//!
//! Runtime knobs live in an optional simulator TOML file; every field has a
//! built-in default so an empty or missing file is valid. The API key for the
//! hosted services resolves ENV → TOML.

use onboard_common::config::{load_toml_file, TomlConfig};
use onboard_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::services::retrieval_router::{RouterSettings, ThresholdPair};
use crate::services::{EngineSettings, HttpGenerationConfig, HttpSpeechConfig};

/// Environment variable holding the generation/speech API key
pub const LLM_API_KEY_ENV: &str = "ONBOARD_LLM_API_KEY";

/// Filter used when neither RUST_LOG nor `logging.level` is set
pub const DEFAULT_LOG_FILTER: &str = "onboard_sim=debug,tower_http=debug";

/// Tracing filter from the bootstrap config; a configured level is used as given
pub fn log_filter(toml_config: &TomlConfig) -> String {
    toml_config
        .logging
        .level
        .as_deref()
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LOG_FILTER)
        .to_string()
}

/// Simulator runtime configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub generation: GenerationSection,
    pub speech: SpeechSection,
    pub timeouts: TimeoutSection,
    pub retrieval: RetrievalSection,
    pub normalizer: NormalizerSection,
    pub database: DatabaseSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub endpoint: String,
    pub model: String,
    pub dialogue_temperature: f32,
    /// Used for goal analysis and competency scoring
    pub analysis_temperature: f32,
    pub max_reply_tokens: u32,
}

impl Default for GenerationSection {
    fn default() -> Self {
        let http = HttpGenerationConfig::default();
        Self {
            endpoint: http.endpoint,
            model: http.model,
            dialogue_temperature: 0.6,
            analysis_temperature: 0.2,
            max_reply_tokens: 400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechSection {
    /// Voice turns are rejected when disabled
    pub enabled: bool,
    pub base_url: String,
    pub fast_model: String,
    pub quality_model: String,
    pub tts_model: String,
    pub language: String,
}

impl Default for SpeechSection {
    fn default() -> Self {
        let http = HttpSpeechConfig::default();
        Self {
            enabled: true,
            base_url: http.base_url,
            fast_model: http.fast_model,
            quality_model: http.quality_model,
            tts_model: http.tts_model,
            language: "ko".to_string(),
        }
    }
}

/// Per-call deadlines in milliseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSection {
    pub generation_ms: u64,
    pub goal_analysis_ms: u64,
    pub scoring_ms: u64,
    pub search_ms: u64,
    pub stt_ms: u64,
    pub tts_ms: u64,
    /// Transport-level timeout for the HTTP clients
    pub http_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            generation_ms: 8_000,
            goal_analysis_ms: 5_000,
            scoring_ms: 30_000,
            search_ms: 2_000,
            stt_ms: 10_000,
            tts_ms: 5_000,
            http_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub short_query_chars: usize,
    pub min_hits: usize,
    pub top_k: usize,
    pub search_limit: usize,
    pub short_thresholds: ThresholdPair,
    pub normal_thresholds: ThresholdPair,
    pub relative_keep: f64,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        let router = RouterSettings::default();
        Self {
            short_query_chars: router.short_query_chars,
            min_hits: router.min_hits,
            top_k: router.top_k,
            search_limit: router.search_limit,
            short_thresholds: router.short_thresholds,
            normal_thresholds: router.normal_thresholds,
            relative_keep: router.relative_keep,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizerSection {
    /// Fuzzy acceptance cutoff on a 0-100 scale
    pub fuzzy_cutoff: f64,
}

impl Default for NormalizerSection {
    fn default() -> Self {
        Self {
            fuzzy_cutoff: crate::services::normalizer::DEFAULT_FUZZY_CUTOFF,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Upper bound on lock-contention retries per write
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self { max_lock_wait_ms: 5_000 }
    }
}

impl SimulatorConfig {
    /// Load from `path`, or built-in defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let config: Self = load_toml_file(path)?;
                config.validate()?;
                info!("Simulator configuration loaded from {}", path.display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if r.top_k == 0 || r.search_limit == 0 {
            return Err(Error::Config("retrieval.top_k and retrieval.search_limit must be positive".to_string()));
        }
        for (name, pair) in [("short_thresholds", r.short_thresholds), ("normal_thresholds", r.normal_thresholds)] {
            let in_range = |v: f64| (0.0..=1.0).contains(&v);
            if !in_range(pair.confidence_cutoff) || !in_range(pair.rerank_cutoff) {
                return Err(Error::Config(format!("retrieval.{} must lie in [0, 1]", name)));
            }
        }
        if !(0.0..=1.0).contains(&r.relative_keep) {
            return Err(Error::Config("retrieval.relative_keep must lie in [0, 1]".to_string()));
        }
        if !(0.0..=100.0).contains(&self.normalizer.fuzzy_cutoff) {
            return Err(Error::Config("normalizer.fuzzy_cutoff must lie in [0, 100]".to_string()));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let t = &self.timeouts;
        let r = &self.retrieval;
        EngineSettings {
            generation_timeout: Duration::from_millis(t.generation_ms),
            goal_analysis_timeout: Duration::from_millis(t.goal_analysis_ms),
            scoring_timeout: Duration::from_millis(t.scoring_ms),
            stt_timeout: Duration::from_millis(t.stt_ms),
            tts_timeout: Duration::from_millis(t.tts_ms),
            dialogue_temperature: self.generation.dialogue_temperature,
            analysis_temperature: self.generation.analysis_temperature,
            max_reply_tokens: self.generation.max_reply_tokens,
            fuzzy_cutoff: self.normalizer.fuzzy_cutoff,
            language: self.speech.language.clone(),
            router: RouterSettings {
                short_query_chars: r.short_query_chars,
                min_hits: r.min_hits,
                top_k: r.top_k,
                search_limit: r.search_limit,
                short_thresholds: r.short_thresholds,
                normal_thresholds: r.normal_thresholds,
                relative_keep: r.relative_keep,
                search_timeout: Duration::from_millis(t.search_ms),
            },
        }
    }

    pub fn generation_config(&self, api_key: Option<String>) -> HttpGenerationConfig {
        HttpGenerationConfig {
            endpoint: self.generation.endpoint.clone(),
            api_key,
            model: self.generation.model.clone(),
            timeout: Duration::from_millis(self.timeouts.http_ms),
        }
    }

    pub fn speech_config(&self, api_key: Option<String>) -> HttpSpeechConfig {
        HttpSpeechConfig {
            base_url: self.speech.base_url.clone(),
            api_key,
            fast_model: self.speech.fast_model.clone(),
            quality_model: self.speech.quality_model.clone(),
            tts_model: self.speech.tts_model.clone(),
            timeout: Duration::from_millis(self.timeouts.http_ms),
        }
    }
}

/// Resolve the generation/speech API key
///
/// **Priority:** ENV → TOML
pub fn resolve_llm_api_key(toml_config: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(LLM_API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config.llm_api_key.as_ref().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("LLM API key found in multiple sources: environment, TOML. Using environment (highest priority).");
    }

    if let Some(key) = env_key {
        info!("LLM API key loaded from environment variable");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("LLM API key loaded from TOML config");
        return Ok(key.clone());
    }

    Err(Error::Config(format!(
        "LLM API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: llm_api_key = \"your-key\"",
        LLM_API_KEY_ENV
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
