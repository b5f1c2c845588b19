//! Vision backends: the pluggable oracle behind alt-text generation.
//!
//! Every backend satisfies one contract — take a self-contained image, an
//! instruction and optional before/after context, return freeform text —
//! so the [`crate::pipeline::describe::Describer`] never knows which provider
//! it is talking to. The concrete backend is chosen once, at construction
//! time, from [`crate::config::VisionBackend`].
//!
//! | Backend | Transport |
//! |---------|-----------|
//! | [`LlmVisionOracle`]  | any `edgequake-llm` chat provider with vision (OpenAI, Anthropic, Gemini, Ollama, …) |
//! | [`HttpVisionOracle`] | a JSON `generate` endpoint that accepts a data-URI image |

use crate::pipeline::context::Context;
use crate::pipeline::encode::to_data_uri;
use crate::prompts::context_message;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure reported by a vision backend.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// The request never got a response (DNS, TLS, timeout…).
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status (quota, auth, 5xx).
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered but the payload held no usable text.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The LLM provider returned an error.
    #[error("provider error: {0}")]
    Provider(String),
}

/// A vision model that turns an image plus context into text.
#[async_trait]
pub trait VisionOracle: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        image: &ImageData,
        instruction: &str,
        context: &Context,
    ) -> Result<String, OracleError>;
}

// ── edgequake-llm chat providers ─────────────────────────────────────────

/// Chat-completion backend built on an `edgequake-llm` provider.
///
/// ## Message Layout
/// 1. **System message** — the alt-text instruction
/// 2. **User message** — the surrounding text (may be empty) with the image attached
pub struct LlmVisionOracle {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmVisionOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            temperature: 0.2,
            max_tokens: 120,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl VisionOracle for LlmVisionOracle {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(
        &self,
        image: &ImageData,
        instruction: &str,
        context: &Context,
    ) -> Result<String, OracleError> {
        let text = context_message(context);
        let messages = vec![
            ChatMessage::system(instruction),
            ChatMessage::user_with_images(text.as_str(), vec![image.clone()]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.build_options()))
            .await
            .map_err(|e| OracleError::Provider(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(OracleError::MalformedResponse("empty completion".into()));
        }
        Ok(response.content)
    }
}

// ── JSON generate endpoint ───────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    image: String,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    before_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    after_text: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(alias = "description", alias = "response")]
    text: Option<String>,
}

/// Backend for a self-hosted vision service with a single `generate` route.
pub struct HttpVisionOracle {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpVisionOracle {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, OracleError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OracleError::Request(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl VisionOracle for HttpVisionOracle {
    fn name(&self) -> &str {
        "endpoint"
    }

    async fn generate(
        &self,
        image: &ImageData,
        instruction: &str,
        context: &Context,
    ) -> Result<String, OracleError> {
        let body = GenerateRequest {
            image: to_data_uri(image),
            prompt: instruction,
            before_text: context.before(),
            after_text: context.after(),
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;
        parse_generate_response(&text)
    }
}

/// Accept either `{"text": …}` (or an aliased key) or a bare JSON string.
fn parse_generate_response(body: &str) -> Result<String, OracleError> {
    if let Ok(parsed) = serde_json::from_str::<GenerateResponse>(body) {
        return parsed
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| OracleError::MalformedResponse("no text field".into()));
    }
    match serde_json::from_str::<String>(body) {
        Ok(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(OracleError::MalformedResponse(format!(
            "unexpected body: {}",
            body.chars().take(80).collect::<String>()
        ))),
    }
}
