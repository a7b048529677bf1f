//! Configuration loader and validator for the review preprocessor.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub openai: OpenAi,
}

/// App-level settings for the consumer loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_ms: u64,
    pub max_backoff_seconds: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    5
}

/// Thresholds and toggles for cleaning, classification and translation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    pub default_lang: String,
    /// Cap on the id list carried by the completion event; 0 disables the cap.
    pub publish_ids_limit: usize,
    pub max_review_len: usize,
    pub min_content_len: usize,
    pub html_strip: bool,
    pub emoji_strip: bool,
    pub whitespace_normalize: bool,

    pub min_words: usize,
    pub min_chars: usize,
    pub min_alpha_ratio: f64,
    pub save_skipped: bool,

    pub lang_detect_min_conf: f64,
    pub translate_enabled: bool,
    pub translate_target_lang: String,
    pub translate_batch_size: usize,
    pub translate_timeout_seconds: u64,
    pub translate_provider: String,

    pub translate_fallback_enabled: bool,
    pub translate_fallback_model: String,
    pub translate_fallback_sample: usize,
    pub translate_fallback_adequacy_ratio: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            default_lang: "en".into(),
            publish_ids_limit: 0,
            max_review_len: 4000,
            min_content_len: 1,
            html_strip: true,
            emoji_strip: true,
            whitespace_normalize: true,
            min_words: 0,
            min_chars: 0,
            min_alpha_ratio: 0.0,
            save_skipped: false,
            lang_detect_min_conf: 0.0,
            translate_enabled: false,
            translate_target_lang: "en".into(),
            translate_batch_size: 20,
            translate_timeout_seconds: 15,
            translate_provider: "none".into(),
            translate_fallback_enabled: false,
            translate_fallback_model: String::new(),
            translate_fallback_sample: 0,
            translate_fallback_adequacy_ratio: 0.0,
        }
    }
}

impl ProcessingConfig {
    /// Per sub-batch translation deadline, `None` when disabled.
    pub fn translate_timeout(&self) -> Option<Duration> {
        (self.translate_timeout_seconds > 0).then(|| Duration::from_secs(self.translate_timeout_seconds))
    }
}

/// OpenAI-compatible translation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OpenAi {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
}

impl Default for OpenAi {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }
}

impl App {
    /// `data_dir` with a leading `~/` expanded to `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - An empty `openai.api_key` is filled from `OPENAI_API_KEY`.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if cfg.openai.api_key.trim().is_empty() {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            cfg.openai.api_key = key;
        }
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }
    if cfg.app.max_attempts == 0 {
        return Err(ConfigError::Invalid("app.max_attempts must be > 0"));
    }

    let p = &cfg.processing;
    if p.default_lang.trim().is_empty() {
        return Err(ConfigError::Invalid("processing.default_lang must be non-empty"));
    }
    if !(0.0..=1.0).contains(&p.min_alpha_ratio) {
        return Err(ConfigError::Invalid("processing.min_alpha_ratio must be within [0, 1]"));
    }
    if !(0.0..=1.0).contains(&p.lang_detect_min_conf) {
        return Err(ConfigError::Invalid("processing.lang_detect_min_conf must be within [0, 1]"));
    }
    if p.translate_fallback_adequacy_ratio < 0.0 || p.translate_fallback_adequacy_ratio.is_nan() {
        return Err(ConfigError::Invalid(
            "processing.translate_fallback_adequacy_ratio must be >= 0",
        ));
    }
    if p.translate_target_lang.trim().is_empty() {
        return Err(ConfigError::Invalid("processing.translate_target_lang must be non-empty"));
    }

    match p.translate_provider.as_str() {
        "none" | "" => {}
        "openai" => {
            if cfg.openai.endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid("openai.endpoint must be non-empty"));
            }
            if cfg.openai.model.trim().is_empty() {
                return Err(ConfigError::Invalid("openai.model must be non-empty"));
            }
            if p.translate_enabled && cfg.openai.api_key.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "openai.api_key (or OPENAI_API_KEY) must be set when translation is enabled",
                ));
            }
            if p.translate_fallback_enabled && p.translate_fallback_model.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "processing.translate_fallback_model must be non-empty when fallback is enabled",
                ));
            }
        }
        _ => {
            return Err(ConfigError::Invalid(
                "processing.translate_provider must be one of: openai, none",
            ))
        }
    }

    Ok(())
}

/// Returns a complete example configuration document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 500
  max_backoff_seconds: 60
  max_attempts: 5

processing:
  default_lang: "en"
  publish_ids_limit: 1000
  max_review_len: 4000
  min_content_len: 3
  html_strip: true
  emoji_strip: true
  whitespace_normalize: true

  min_words: 2
  min_chars: 10
  min_alpha_ratio: 0.5
  save_skipped: false

  lang_detect_min_conf: 0.5
  translate_enabled: true
  translate_target_lang: "en"
  translate_batch_size: 20
  translate_timeout_seconds: 15
  translate_provider: "openai"

  translate_fallback_enabled: true
  translate_fallback_model: "gpt-4o"
  translate_fallback_sample: 3
  translate_fallback_adequacy_ratio: 0.4

openai:
  api_key: "YOUR_OPENAI_API_KEY"
  model: "gpt-4o-mini"
  endpoint: "https://api.openai.com/v1/chat/completions"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.processing.translate_fallback_sample, 3);
        assert_eq!(cfg.processing.translate_timeout(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn processing_section_defaults_when_missing() {
        let yaml = r#"app:
  data_dir: "./data"
  poll_interval_ms: 100
  max_backoff_seconds: 10
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.max_attempts, 5);
        assert_eq!(cfg.processing, ProcessingConfig::default());
        assert!(!cfg.processing.translate_enabled);
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let mut cfg = example_cfg();
        cfg.processing.translate_timeout_seconds = 0;
        assert_eq!(cfg.processing.translate_timeout(), None);
    }

    #[test]
    fn invalid_app_settings() {
        let mut cfg = example_cfg();
        cfg.app.data_dir = " ".into();
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("data_dir")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_cfg();
        cfg.app.poll_interval_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_ratios() {
        let mut cfg = example_cfg();
        cfg.processing.min_alpha_ratio = 1.5;
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("min_alpha_ratio")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_cfg();
        cfg.processing.translate_fallback_adequacy_ratio = -0.1;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_provider_settings() {
        let mut cfg = example_cfg();
        cfg.processing.translate_provider = "deepl".into();
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("translate_provider")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_cfg();
        cfg.openai.api_key = "".into();
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("api_key")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_cfg();
        cfg.processing.translate_fallback_model = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        // A disabled provider needs no credentials.
        let mut cfg = example_cfg();
        cfg.processing.translate_provider = "none".into();
        cfg.openai.api_key = "".into();
        validate(&cfg).unwrap();
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_cfg();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.openai.model, "gpt-4o-mini");
        assert_eq!(cfg.processing.min_chars, 10);
    }
}
