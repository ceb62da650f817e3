//! Error types for the browser-assistant library.

use thiserror::Error;

/// Unified error type for the assistant core.
#[derive(Debug, Error)]
pub enum Error {
    /// LLM-related error
    #[error("LLM error: {0}")]
    LLM(#[from] crate::llm::LLMError),

    /// Tool-related error
    #[error("Tool error: {0}")]
    Tool(#[from] crate::tool::ToolError),

    /// A turn ended without an answer
    #[error("Turn error: {0}")]
    Turn(#[from] crate::agent::TurnError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
