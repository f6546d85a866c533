//! Groq client over the OpenAI-compatible chat completions endpoint.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatRequest, LlmError, MessageSender, check_status, http_client};

const API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

pub struct GroqClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl GroqClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Self::with_base_url(api_key, API_URL.to_string())
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, LlmError> {
        Ok(Self {
            api_key,
            client: http_client()?,
            base_url,
        })
    }
}

impl MessageSender for GroqClient {
    async fn send_message(&self, req: &ChatRequest) -> Result<String, LlmError> {
        let body = CompletionRequest::from(req);
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let parsed = check_status(response)
            .await?
            .json::<CompletionResponse>()
            .await
            .map_err(|e| LlmError::MalformedResponse(format!("groq response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::MalformedResponse("groq response has no content".into()))
    }
}

#[derive(Debug, Clone, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<CompletionMessage>,
    temperature: f32,
    max_tokens: u32,
}

impl From<&ChatRequest> for CompletionRequest {
    fn from(req: &ChatRequest) -> Self {
        Self {
            model: req.model.clone(),
            messages: vec![
                CompletionMessage {
                    role: "system".into(),
                    content: Some(req.system.clone()),
                },
                CompletionMessage {
                    role: "user".into(),
                    content: Some(req.user.clone()),
                },
            ],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompletionMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: CompletionMessage,
}
