use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{Item, TranslationResult, Translations, Translator};

const SYSTEM_PROMPT: &str = "You are a translator. Return strict JSON. \
If an input is already in the target language, set translated to an empty string. \
Schema: {\"items\":[{\"id\":\"\",\"lang\":\"\",\"translated\":\"\"}]}";

/// Translator backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiTranslator {
    http: Client,
    endpoint: Url,
    model: String,
    api_key: String,
}

impl fmt::Debug for OpenAiTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiTranslator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    response_format: serde_json::Value,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ModelOutput {
    items: Vec<TranslationResult>,
}

impl OpenAiTranslator {
    /// `timeout` bounds each HTTP call on top of the caller's own deadline.
    pub fn new(endpoint: &str, model: String, api_key: String, timeout: Option<Duration>) -> Result<Self> {
        let endpoint = Url::parse(endpoint).with_context(|| format!("invalid translation endpoint: {endpoint}"))?;
        let mut builder = Client::builder().user_agent("review-prep/0.1");
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build translation HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            model,
            api_key,
        })
    }

    pub fn build_request(&self, items: &[Item], target: &str) -> Result<reqwest::Request> {
        let prompt = serde_json::to_string(&json!({ "items": items, "target": target }))
            .context("failed to encode translation prompt")?;
        let body = ChatRequest {
            model: &self.model,
            response_format: json!({ "type": "json_object" }),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: prompt,
                },
            ],
        };
        self.http
            .post(self.endpoint.clone())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .build()
            .context("failed to build translation request")
    }
}

/// Decode a chat-completions body into per-id results.
pub fn parse_completion(body: &str) -> Result<Translations> {
    let resp: ChatResponse = serde_json::from_str(body).context("invalid chat completion JSON")?;
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("chat completion returned no choices"))?;
    let output: ModelOutput =
        serde_json::from_str(&choice.message.content).context("model output is not the expected JSON")?;
    Ok(output
        .items
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect())
}

#[async_trait]
impl Translator for OpenAiTranslator {
    #[instrument(skip_all, fields(model = %self.model, items = items.len()))]
    async fn translate_batch(&self, items: &[Item], target: &str) -> Result<Translations> {
        if items.is_empty() {
            return Ok(Translations::new());
        }
        let request = self.build_request(items, target)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach translation endpoint")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "translation endpoint error");
            return Err(anyhow!("translation endpoint error {}: {}", status, body));
        }
        let body = res.text().await.context("failed to read translation response")?;
        let out = parse_completion(&body)?;
        debug!(returned = out.len(), "translation batch done");
        Ok(out)
    }
}
