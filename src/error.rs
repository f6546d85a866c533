use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum MobilityError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    Llm(#[from] LlmError),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
