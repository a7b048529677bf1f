use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

pub mod cascade;
pub mod openai;

pub use cascade::Cascade;
pub use openai::OpenAiTranslator;

/// Unit of work handed to a translator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub text: String,
}

/// Per-item translator output. An empty `translated` means nothing was
/// produced, usually because the text already is in the target language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub id: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub translated: String,
}

/// Results keyed by item id.
pub type Translations = HashMap<String, TranslationResult>;

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate_batch(&self, items: &[Item], target: &str) -> Result<Translations>;
}

/// Translator used when no provider is configured; produces nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

#[async_trait]
impl Translator for Noop {
    async fn translate_batch(&self, _items: &[Item], _target: &str) -> Result<Translations> {
        Ok(Translations::new())
    }
}

/// Build the translator selected by `processing.translate_provider`.
///
/// `openai` yields a cascade whose fallback uses the same endpoint with
/// `translate_fallback_model`; anything else yields [`Noop`].
pub fn from_config(cfg: &Config) -> Result<Arc<dyn Translator>> {
    let p = &cfg.processing;
    match p.translate_provider.as_str() {
        "openai" => {
            let timeout = p.translate_timeout();
            let primary = OpenAiTranslator::new(
                &cfg.openai.endpoint,
                cfg.openai.model.clone(),
                cfg.openai.api_key.clone(),
                timeout,
            )?;
            let fallback: Option<Arc<dyn Translator>> = if p.translate_fallback_enabled {
                Some(Arc::new(OpenAiTranslator::new(
                    &cfg.openai.endpoint,
                    p.translate_fallback_model.clone(),
                    cfg.openai.api_key.clone(),
                    timeout,
                )?))
            } else {
                None
            };
            info!(
                model = %cfg.openai.model,
                fallback = fallback.is_some(),
                sample = p.translate_fallback_sample,
                "using openai translator"
            );
            Ok(Arc::new(Cascade::new(
                Some(Arc::new(primary)),
                fallback,
                p.translate_fallback_sample,
                p.translate_fallback_adequacy_ratio,
            )))
        }
        _ => Ok(Arc::new(Noop)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_returns_nothing() {
        let items = vec![Item {
            id: "1".into(),
            text: "hola".into(),
        }];
        let out = Noop.translate_batch(&items, "en").await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn result_decodes_with_missing_fields() {
        let r: TranslationResult = serde_json::from_str(r#"{"id":"a"}"#).unwrap();
        assert_eq!(r.id, "a");
        assert!(r.lang.is_empty());
        assert!(r.translated.is_empty());
    }

    #[test]
    fn from_config_builds_for_each_provider() {
        let mut cfg: Config = serde_yaml::from_str(crate::config::example()).unwrap();
        assert!(from_config(&cfg).is_ok());
        cfg.processing.translate_provider = "none".into();
        assert!(from_config(&cfg).is_ok());
    }
}
