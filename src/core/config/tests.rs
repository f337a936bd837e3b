use super::data::{Config, SearchConfig};
use super::env::{API_KEY_ENV, BASE_URL_ENV, FALLBACK_API_KEY_ENV};
use crate::retrieval::ExtractDepth;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.text_model(), "deepseek-ai/DeepSeek-R1");
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let config = Config {
        text_model: Some("deepseek-ai/DeepSeek-V3".to_string()),
        temperature: Some(1.0),
        search: SearchConfig {
            enabled: Some(true),
            max_results: Some(3),
            ..Default::default()
        },
        ..Default::default()
    };
    config
        .save_to_path(&config_path)
        .expect("Failed to save config");

    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);
    assert!(loaded.search_enabled());
    assert_eq!(loaded.fetch_options().max_results, 3);
    assert_eq!(loaded.generation_params().temperature, 1.0);
}

#[test]
fn invalid_toml_reports_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "text_model = [").unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(err.to_string().starts_with("Failed to parse config at"));
}

#[test]
fn search_table_is_parsed_from_toml() {
    let config: Config = toml::from_str(
        r#"
        max_tokens = 2048

        [search]
        enabled = true
        concurrency = 0
        timeout_secs = 3
        arxiv_full_text = true
        "#,
    )
    .unwrap();

    let options = config.fetch_options();
    assert_eq!(options.concurrency, 1);
    assert_eq!(options.timeout, Duration::from_secs(3));
    assert_eq!(options.depth, ExtractDepth::FullText);
    assert_eq!(config.generation_params().max_tokens, 2048);
    assert_eq!(config.context_settings().vision_max_tokens, 4096);
}

#[test]
fn credentials_prefer_dedicated_variables() {
    let env: HashMap<&str, &str> = HashMap::from([
        (API_KEY_ENV, "primary"),
        (FALLBACK_API_KEY_ENV, "fallback"),
        (BASE_URL_ENV, "http://localhost:8000/v1"),
    ]);
    let creds = Config::default()
        .resolve_credentials_with(|name| env.get(name).map(|value| value.to_string()));
    assert_eq!(creds.api_key, "primary");
    assert_eq!(creds.base_url, "http://localhost:8000/v1");
}

#[test]
fn credentials_fall_back_to_openai_key_and_config_url() {
    let env: HashMap<&str, &str> = HashMap::from([(API_KEY_ENV, "  "), (FALLBACK_API_KEY_ENV, "sk")]);
    let config = Config {
        base_url: Some("https://example.com/v1".to_string()),
        ..Default::default()
    };
    let creds = config.resolve_credentials_with(|name| env.get(name).map(|value| value.to_string()));
    assert_eq!(creds.api_key, "sk");
    assert_eq!(creds.base_url, "https://example.com/v1");
}

#[test]
fn history_dir_prefers_configured_path() {
    let config = Config {
        history_dir: Some(PathBuf::from("/tmp/chats")),
        ..Default::default()
    };
    assert_eq!(config.history_dir(), PathBuf::from("/tmp/chats"));
}
