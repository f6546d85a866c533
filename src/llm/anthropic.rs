//! Cliente da API Anthropic Messages, usado no "money mode".
//!
//! Tipos de requisição e resposta seguem o formato do endpoint `v1/messages`.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatRequest, LlmError, MessageSender, check_status, http_client};

const API_URL: &str = "https://api.anthropic.com/v1/messages";

pub struct AnthropicClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl AnthropicClient {
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

impl MessageSender for AnthropicClient {
    async fn send_message(&self, req: &ChatRequest) -> Result<String, LlmError> {
        let body = MessagesRequest::from(req);
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let parsed = check_status(response)
            .await?
            .json::<MessagesResponse>()
            .await
            .map_err(|e| LlmError::MalformedResponse(format!("anthropic response: {e}")))?;

        let text: String = parsed
            .content
            .iter()
            .filter(|b| b.content_type == "text")
            .map(|b| b.text.as_str())
            .collect();
        if text.trim().is_empty() {
            return Err(LlmError::MalformedResponse(
                "anthropic response missing text content".into(),
            ));
        }
        Ok(text)
    }
}

/// Corpo da requisição para o endpoint `/v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Prompt de sistema, fora da lista de mensagens no formato da Anthropic.
    pub system: String,
    pub messages: Vec<Message>,
}

impl From<&ChatRequest> for MessagesRequest {
    fn from(req: &ChatRequest) -> Self {
        Self {
            model: req.model.clone(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            system: req.system.clone(),
            messages: vec![Message {
                role: "user".into(),
                content: req.user.clone(),
            }],
        }
    }
}

/// Uma única mensagem da conversa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Resposta do endpoint `/v1/messages`. Apenas os campos usados.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Um bloco de conteúdo; `content_type` é serializado como `"type"`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat() -> ChatRequest {
        ChatRequest {
            model: "claude-haiku-4-5-20251001".into(),
            system: "Output JSON only.".into(),
            user: "Mobility Measure: Bike sharing".into(),
            temperature: 0.7,
            max_tokens: 2048,
        }
    }

    #[test]
    fn request_moves_system_prompt_out_of_messages() {
        let req = MessagesRequest::from(&chat());
        assert_eq!(req.system, "Output JSON only.");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, "user");
        assert_eq!(req.messages[0].content, "Mobility Measure: Bike sharing");
    }

    #[test]
    fn response_deserialize_from_api_format() {
        let api_json = r#"{
            "id": "msg_123",
            "content": [{"type": "text", "text": "{\"a\": 1}"}],
            "model": "claude-haiku-4-5-20251001",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 15}
        }"#;
        let resp: MessagesResponse = serde_json::from_str(api_json).unwrap();
        assert_eq!(resp.content[0].content_type, "text");
        assert_eq!(resp.content[0].text, "{\"a\": 1}");
        assert_eq!(resp.stop_reason.as_deref(), Some("end_turn"));
    }
}
