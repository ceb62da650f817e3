use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use crate::session::{Message, MessageContent};
use crate::tool::{ToolCall, ToolDefinition};
use super::openai::OpenAIClient;

/// Input for an LLM request.
#[derive(Debug, Clone)]
pub struct LLMInput {
    /// The model to use
    pub model: String,
    /// The messages to send
    pub messages: Vec<Message>,
    /// The system prompt
    pub system_prompt: String,
    /// Available tools for the LLM; empty means text-only
    pub tools: Vec<ToolDefinition>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Optional temperature (0.0 to 2.0)
    pub temperature: Option<f32>,
}

/// Output from an LLM response.
#[derive(Debug, Clone)]
pub struct LLMOutput {
    /// The content of the response
    pub content: Vec<MessageContent>,
    /// The reason the response finished
    pub finish_reason: FinishReason,
    /// Token usage statistics, when the backend reports them
    pub usage: Option<Usage>,
}

impl LLMOutput {
    /// Creates a text-only response.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            content: vec![MessageContent::text(text)],
            finish_reason: FinishReason::Stop,
            usage: None,
        }
    }

    /// Concatenated text content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                MessageContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Requested tool calls, in the order the model issued them.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content.iter().filter_map(MessageContent::as_tool_call).collect()
    }
}

/// The reason the LLM finished generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop point reached
    Stop,
    /// Stopped due to tool calls
    ToolCalls,
    /// Maximum tokens reached
    MaxTokens,
    /// Stopped due to an error
    Error,
}

impl FinishReason {
    pub(crate) fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("length") => FinishReason::MaxTokens,
            _ => FinishReason::Error,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of input tokens
    pub input_tokens: u32,
    /// Number of output tokens
    pub output_tokens: u32,
}

impl Usage {
    /// Sums usage across calls; absent reports contribute nothing.
    pub fn accumulate(existing: Option<Usage>, new: Option<Usage>) -> Option<Usage> {
        match (existing, new) {
            (Some(e), Some(n)) => Some(Usage {
                input_tokens: e.input_tokens.saturating_add(n.input_tokens),
                output_tokens: e.output_tokens.saturating_add(n.output_tokens),
            }),
            (Some(e), None) => Some(e),
            (None, n) => n,
        }
    }
}

/// Errors that can occur when communicating with an LLM.
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    /// An API error occurred
    #[error("API error: {0}")]
    ApiError(String),
    /// A network error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    /// The response from the LLM was invalid
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),
    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),
}

/// Trait for LLM clients.
///
/// The orchestration loop is agnostic to the transport behind it.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Sends a request and returns a complete response.
    async fn complete(&self, input: LLMInput) -> Result<LLMOutput, LLMError>;
}

/// A builder for creating LLM clients.
#[derive(Debug, Default)]
pub struct LLMClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Option<std::time::Duration>,
    headers: BTreeMap<String, String>,
}

impl LLMClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Creates an OpenAI-compatible client.
    pub fn build_openai(self) -> Result<Arc<dyn LLMClient>, LLMError> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or(LLMError::AuthError("OpenAI API key not provided".to_string()))?;
        Ok(Arc::new(OpenAIClient::new(
            api_key,
            self.base_url,
            self.timeout,
            &self.headers,
        )?))
    }
}
