use crate::types::{ChatMessage, ChatRequest, ChatResponse};
use agent_pool_core::{TaskPayload, DEFAULT_MODEL};
use agent_pool_worker::{HandlerResult, TaskHandler};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u64 = 150;

#[derive(Error, Debug)]
pub enum OpenAiError {
    #[error("Payload field `{0}` is missing or not a string")]
    MissingField(&'static str),

    #[error("Payload field `{0}` is not a number")]
    InvalidField(&'static str),

    #[error("OpenAI API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("OpenAI response contained no choices")]
    EmptyChoices,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Fallbacks for sampling parameters absent from the payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionDefaults {
    pub temperature: f64,
    pub max_tokens: u64,
}

impl Default for CompletionDefaults {
    fn default() -> Self {
        CompletionDefaults {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Everything needed to send one completion call
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub url: String,
    pub api_key: String,
    pub body: ChatRequest,
}

/// `{api_base}/chat/completions`, with the public endpoint when unset
pub fn completions_url(api_base: Option<&str>) -> String {
    let base = api_base
        .map(str::trim)
        .filter(|base| !base.is_empty())
        .unwrap_or(DEFAULT_API_BASE);
    format!("{}/chat/completions", base.trim_end_matches('/'))
}

fn required_str<'a>(payload: &'a TaskPayload, field: &'static str) -> Result<&'a str, OpenAiError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or(OpenAiError::MissingField(field))
}

fn optional_number<'a>(
    payload: &'a TaskPayload,
    field: &'static str,
) -> Result<Option<&'a Value>, OpenAiError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) if value.is_number() => Ok(Some(value)),
        Some(_) => Err(OpenAiError::InvalidField(field)),
    }
}

/// Turn a task payload into a completion call.
///
/// `api_key` and `prompt` are required; `api_base`, `model`, `temperature`
/// and `max_tokens` fall back to defaults when absent or null.
pub fn prepare_call(
    payload: &TaskPayload,
    defaults: &CompletionDefaults,
) -> Result<PreparedCall, OpenAiError> {
    let api_key = required_str(payload, "api_key")?.to_string();
    let prompt = required_str(payload, "prompt")?;
    let api_base = payload.get("api_base").and_then(Value::as_str);
    let model = payload
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_MODEL);

    let temperature = match optional_number(payload, "temperature")? {
        Some(value) => value
            .as_f64()
            .ok_or(OpenAiError::InvalidField("temperature"))?,
        None => defaults.temperature,
    };
    let max_tokens = match optional_number(payload, "max_tokens")? {
        Some(value) => value
            .as_u64()
            .ok_or(OpenAiError::InvalidField("max_tokens"))?,
        None => defaults.max_tokens,
    };

    Ok(PreparedCall {
        url: completions_url(api_base),
        api_key,
        body: ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            temperature,
            max_tokens,
        },
    })
}

/// Handler that answers each task with one OpenAI chat completion
pub struct OpenAiHandler {
    client: reqwest::Client,
    defaults: CompletionDefaults,
}

impl OpenAiHandler {
    pub fn new() -> Self {
        Self::with_defaults(CompletionDefaults::default())
    }

    pub fn with_defaults(defaults: CompletionDefaults) -> Self {
        OpenAiHandler {
            client: reqwest::Client::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &CompletionDefaults {
        &self.defaults
    }

    async fn complete(&self, payload: &TaskPayload) -> Result<String, OpenAiError> {
        let call = prepare_call(payload, &self.defaults)?;

        debug!(model = %call.body.model, "OpenAI request to {}", call.url);

        let response = self
            .client
            .post(&call.url)
            .bearer_auth(&call.api_key)
            .json(&call.body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenAiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatResponse = response.json().await?;
        response.first_content().ok_or(OpenAiError::EmptyChoices)
    }
}

impl Default for OpenAiHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskHandler for OpenAiHandler {
    async fn handle(&self, payload: TaskPayload) -> HandlerResult {
        Ok(self.complete(&payload).await?)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
