//! # Browser Assistant
//!
//! Tool orchestration core for a browser assistant: capability providers
//! advertise tools, a registry validates and dispatches the model's tool calls,
//! and a bounded loop lets the model iterate toward an answer.
//!
//! ## Features
//!
//! - **Tool Registry**: Providers, tools, enable/disable cascades and execution history
//! - **Validation**: Argument checks against each tool's parameter schema
//! - **Providers**: Browser automation, memory search and connected app actions
//! - **Orchestration**: Multi-round tool use with a forced final answer
//! - **OpenAI Integration**: Built-in OpenAI-compatible model client
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use browser_assistant::prelude::*;
//! use browser_assistant::provider::{InMemoryStore, MemoryProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let llm_client = LLMClientBuilder::new()
//!         .with_api_key(std::env::var("OPENAI_API_KEY")?)
//!         .build_openai()?;
//!
//!     let registry = Arc::new(ToolRegistry::new());
//!     let memories = MemoryProvider::new(None, Arc::new(InMemoryStore::new(Vec::new())))?;
//!     registry
//!         .register_provider(Arc::new(memories), RegisterProviderOptions::default())
//!         .await?;
//!
//!     let orchestrator = Orchestrator::new(llm_client, registry);
//!     let outcome = orchestrator
//!         .run_turn(Conversation::from_user("What did I save about Rust?"), TurnOptions::default())
//!         .await?;
//!
//!     println!("{}", outcome.answer);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod provider;
pub mod session;
pub mod tool;

// Re-exports for convenient usage
pub use agent::{ExecutionReportEntry, Orchestrator, TurnError, TurnOptions, TurnOutcome};
pub use config::{AssistantConfig, ConfigError};
pub use error::{Error, Result};
pub use llm::{LLMClient, LLMClientBuilder, LLMError, LLMInput, LLMOutput, OpenAIClient, Usage};
pub use session::{Conversation, Identity, IdentityProvider, Message, MessageContent, MessageRole};
pub use tool::{
    ErrorKind, ProviderInfo, Tool, ToolArgs, ToolCall, ToolError, ToolExecutionResult,
    ToolOutput, ToolProvider, ToolRegistry,
};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::agent::{Orchestrator, TurnOptions, TurnOutcome};
    pub use crate::llm::{LLMClient, LLMClientBuilder, OpenAIClient};
    pub use crate::session::{Conversation, Message};
    pub use crate::tool::{
        ParamType, ParameterSchema, ProviderInfo, RegisterProviderOptions, Tool, ToolArgs,
        ToolError, ToolOutput, ToolProvider, ToolRegistry,
    };
}
