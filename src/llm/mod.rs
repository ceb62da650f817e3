pub mod client;
pub mod openai;

pub use client::{LLMClient, LLMClientBuilder, LLMInput, LLMOutput, FinishReason, Usage, LLMError};
pub use openai::OpenAIClient;
