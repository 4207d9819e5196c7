//! Configuration resolution tests
//!
//! Tests that touch ONBOARD_LLM_API_KEY are marked #[serial] so they never
//! race on the process environment.

use serial_test::serial;
use std::io::Write;
use std::time::Duration;

use onboard_common::config::{LoggingConfig, TomlConfig};
use onboard_common::Error;
use onboard_sim::config::{is_valid_key, resolve_llm_api_key, SimulatorConfig, LLM_API_KEY_ENV};

fn toml_with_key(key: Option<&str>) -> TomlConfig {
    TomlConfig {
        root_folder: None,
        logging: LoggingConfig::default(),
        content_dir: None,
        llm_api_key: key.map(str::to_string),
    }
}

// ============================================================================
// API key resolution
// ============================================================================

#[test]
#[serial]
fn env_overrides_toml() {
    std::env::set_var(LLM_API_KEY_ENV, "env-key");

    let result = resolve_llm_api_key(&toml_with_key(Some("toml-key"))).unwrap();
    assert_eq!(result, "env-key");

    std::env::remove_var(LLM_API_KEY_ENV);
}

#[test]
#[serial]
fn toml_fallback_when_env_missing() {
    std::env::remove_var(LLM_API_KEY_ENV);

    let result = resolve_llm_api_key(&toml_with_key(Some("toml-key"))).unwrap();
    assert_eq!(result, "toml-key");
}

#[test]
#[serial]
fn whitespace_env_key_is_ignored() {
    std::env::set_var(LLM_API_KEY_ENV, "   ");

    let result = resolve_llm_api_key(&toml_with_key(Some("toml-key"))).unwrap();
    assert_eq!(result, "toml-key");

    std::env::remove_var(LLM_API_KEY_ENV);
}

#[test]
#[serial]
fn missing_key_is_config_error() {
    std::env::remove_var(LLM_API_KEY_ENV);

    let result = resolve_llm_api_key(&toml_with_key(None));
    match result {
        Err(Error::Config(msg)) => assert!(msg.contains(LLM_API_KEY_ENV)),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn key_validation_rejects_blank() {
    assert!(is_valid_key("sk-live"));
    assert!(!is_valid_key(""));
    assert!(!is_valid_key("\t \n"));
}

// ============================================================================
// Simulator config file
// ============================================================================

#[test]
fn no_path_yields_defaults() {
    let config = SimulatorConfig::load(None).unwrap();
    let settings = config.engine_settings();
    assert_eq!(settings.scoring_timeout, Duration::from_secs(30));
    assert_eq!(settings.language, "ko");
}

#[test]
fn file_overrides_selected_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[generation]
model = "dialogue-small"
dialogue_temperature = 0.4

[speech]
enabled = false

[timeouts]
search_ms = 750
http_ms = 12000

[retrieval]
top_k = 3
"#
    )
    .unwrap();

    let config = SimulatorConfig::load(Some(file.path())).unwrap();
    assert!(!config.speech.enabled);

    let settings = config.engine_settings();
    assert_eq!(settings.dialogue_temperature, 0.4);
    assert_eq!(settings.router.top_k, 3);
    assert_eq!(settings.router.search_timeout, Duration::from_millis(750));

    let generation = config.generation_config(Some("key".to_string()));
    assert_eq!(generation.model, "dialogue-small");
    assert_eq!(generation.timeout, Duration::from_secs(12));
    assert_eq!(generation.api_key.as_deref(), Some("key"));
}

#[test]
fn invalid_values_fail_to_load() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[retrieval]\ntop_k = 0").unwrap();

    assert!(matches!(SimulatorConfig::load(Some(file.path())), Err(Error::Config(_))));
}

#[test]
fn malformed_file_fails_to_load() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[timeouts\ngeneration_ms = ").unwrap();

    assert!(matches!(SimulatorConfig::load(Some(file.path())), Err(Error::Config(_))));
}

#[test]
fn missing_file_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let result = SimulatorConfig::load(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}
