//! Chat-completion clients for the section generator.
//!
//! Both providers implement [`MessageSender`], which takes a provider-agnostic
//! [`ChatRequest`] and returns the raw assistant text. [`Provider`] picks one
//! of them at runtime from configuration.

pub mod anthropic;
pub mod error;
pub mod groq;

pub use anthropic::AnthropicClient;
pub use error::LlmError;
pub use groq::GroqClient;

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

/// One chat request: a system prompt, one user turn, and sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Sends a chat request and returns the assistant's text.
#[allow(async_fn_in_trait)]
pub trait MessageSender {
    async fn send_message(&self, req: &ChatRequest) -> Result<String, LlmError>;
}

impl<T: MessageSender> MessageSender for &T {
    async fn send_message(&self, req: &ChatRequest) -> Result<String, LlmError> {
        (**self).send_message(req).await
    }
}

/// The configured LLM backend.
pub enum Provider {
    Groq(GroqClient),
    Anthropic(AnthropicClient),
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Groq(_) => "groq",
            Provider::Anthropic(_) => "anthropic",
        }
    }
}

impl MessageSender for Provider {
    async fn send_message(&self, req: &ChatRequest) -> Result<String, LlmError> {
        match self {
            Provider::Groq(client) => client.send_message(req).await,
            Provider::Anthropic(client) => client.send_message(req).await,
        }
    }
}

/// HTTP client shared by both providers.
pub(crate) fn http_client() -> Result<Client, LlmError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| LlmError::Misconfiguration(format!("failed to build HTTP client: {e}")))
}

/// Pass a 2xx response through; turn anything else into [`LlmError::Api`].
pub(crate) async fn check_status(response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = retry_after_header(response.headers());
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(LlmError::Api {
        status: status.as_u16(),
        message: error_message_from_body(&text),
        retry_after,
    })
}

/// Read the `retry-after` header as a string, if present.
pub(crate) fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Pull a readable message out of an error body.
///
/// Both providers wrap errors as `{"error": {"message", "code"|"type"}}`; the
/// code (or type) is kept as a prefix since it carries the rate-limit
/// signature. Bodies that don't match are returned trimmed.
pub(crate) fn error_message_from_body(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.code.or(envelope.error.kind) {
            Some(code) if !code.is_empty() => format!("{code}: {}", envelope.error.message),
            _ => envelope.error.message,
        },
        Err(_) => body.trim().to_string(),
    }
}
