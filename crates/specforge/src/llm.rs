//! OpenRouter-compatible chat client
//!
//! One blocking concern lives here: transport. Retry with exponential
//! backoff on rate limits and server errors happens inside `chat`;
//! callers see a single `Result`. The bridge never touches this module
//! directly, it only receives closures built on top of it.

use crate::config::LlmSection;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Rate limit retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;
const BACKOFF_MULTIPLIER: u64 = 2;

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{API_KEY_ENV} not set; export it to enable synthesis")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model returned no choices")]
    EmptyChoices,
}

pub type Result<T> = std::result::Result<T, LlmError>;

// ============================================================================
// Wire types (chat completions)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ============================================================================
// Client
// ============================================================================

/// Thin chat-completions client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    /// Build a client from config; the API key comes from the
    /// environment only.
    pub fn new(config: &LlmSection) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One chat call: system + user message, assistant text back.
    /// Retries 429 and 5xx with exponential backoff, honoring a
    /// `Retry-After` header when the server sends one.
    pub async fn chat(&self, system: &str, user: &str, json_mode: bool) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message { role: "system".to_string(), content: system.to_string() },
                Message { role: "user".to_string(), content: user.to_string() },
            ],
            max_tokens: self.max_tokens,
            stream: false,
            response_format: json_mode
                .then(|| ResponseFormat { format_type: "json_object".to_string() }),
        };

        let mut retry = 0u32;
        loop {
            let response = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("X-Title", "specforge")
                .json(&request)
                .send()
                .await?;

            if response.status().is_success() {
                let parsed: ChatResponse = response.json().await?;
                if let Some(usage) = &parsed.usage {
                    debug!(
                        model = parsed.model.as_deref().unwrap_or(&self.model),
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "chat completion"
                    );
                }
                return parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or(LlmError::EmptyChoices);
            }

            let status = response.status().as_u16();
            let retry_after = retry_after_secs(response.headers());
            let body = response.text().await.unwrap_or_default();

            let retryable = status == 429 || (500..600).contains(&status);
            if retryable && retry < MAX_RETRIES {
                retry += 1;
                let backoff = retry_after
                    .unwrap_or_else(|| INITIAL_BACKOFF_MS * BACKOFF_MULTIPLIER.pow(retry - 1) / 1000)
                    .max(1);
                warn!(status, retry, backoff_secs = backoff, "retrying chat call");
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                continue;
            }

            let message = match status {
                401 => format!("invalid API key; check {}", API_KEY_ENV),
                429 => format!("rate limited after {} retries", retry),
                500..=599 => "server error; the service may be temporarily unavailable".to_string(),
                _ => truncate(&body, MAX_ERROR_BODY_LEN),
            };
            return Err(LlmError::Api { status, message });
        }
    }
}

fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&secs| secs > 0 && secs < 300)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .take_while(|(i, _)| *i <= max)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("{}... (truncated)", &text[..cut])
}
