//! Tipos de erro para os clientes de LLM.
//!
//! Define [`LlmError`] com variantes para respostas HTTP de erro (incluindo
//! rate limiting), falhas de rede e corpos de resposta inesperados. A
//! classificação (retentar, esperar, desistir) não acontece aqui: fica a
//! cargo de [`crate::rate_limit::RateLimitInterpreter`].

use thiserror::Error;

/// Erros que podem ocorrer ao chamar um provedor de LLM.
#[derive(Debug, Error)]
pub enum LlmError {
    /// A API respondeu com status diferente de 2xx.
    ///
    /// `retry_after` guarda o valor bruto do cabeçalho `retry-after`, quando
    /// presente, e `message` o texto de erro do corpo da resposta.
    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        retry_after: Option<String>,
    },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A resposta chegou com sucesso mas sem o formato esperado.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// O cliente não pôde ser construído.
    #[error("client misconfigured: {0}")]
    Misconfiguration(String),
}

impl LlmError {
    /// HTTP status of an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => Some(*status),
            LlmError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
