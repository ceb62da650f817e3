use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::{ToolCall, ToolExecutionResult};

/// Represents a message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message
    pub id: String,
    /// The role of the message sender
    pub role: MessageRole,
    /// The content of the message
    pub content: Vec<MessageContent>,
    /// Timestamp when the message was created
    pub created_at: DateTime<Utc>,
}

/// The role of the message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions for the model
    System,
    /// User message
    User,
    /// Assistant message (from the LLM)
    Assistant,
    /// Tool result message
    Tool,
}

/// The content of a message, which can be text or a tool call/result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text content
    Text {
        /// The text content
        text: String,
    },
    /// A tool call request
    ToolCall {
        /// Unique identifier for the tool call
        id: String,
        /// The name of the tool to call
        name: String,
        /// The raw JSON arguments to pass to the tool
        arguments: String,
    },
    /// The result of a tool execution
    ToolResult {
        /// The ID of the tool call this result is for
        tool_call_id: String,
        /// The result returned by the tool
        result: String,
        /// Whether the tool execution resulted in an error
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    /// Builds the tool-result entry for an execution outcome.
    pub fn tool_result(tool_call_id: impl Into<String>, result: &ToolExecutionResult) -> Self {
        MessageContent::ToolResult {
            tool_call_id: tool_call_id.into(),
            result: result.to_model_content(),
            is_error: (!result.success).then_some(true),
        }
    }

    /// Returns the tool call carried by this content, if any.
    pub fn as_tool_call(&self) -> Option<ToolCall> {
        match self {
            MessageContent::ToolCall { id, name, arguments } => {
                Some(ToolCall::new(id.clone(), name.clone(), arguments.clone()))
            }
            _ => None,
        }
    }
}

impl From<&ToolCall> for MessageContent {
    fn from(call: &ToolCall) -> Self {
        MessageContent::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        }
    }
}

impl Message {
    fn with_role(role: MessageRole, content: Vec<MessageContent>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
        }
    }

    /// Creates a new system message.
    pub fn new_system(text: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, vec![MessageContent::text(text)])
    }

    /// Creates a new user message.
    pub fn new_user(text: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, vec![MessageContent::text(text)])
    }

    /// Creates a new assistant message.
    pub fn new_assistant(content: Vec<MessageContent>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    /// Creates a new tool result message.
    pub fn new_tool_result(results: Vec<MessageContent>) -> Self {
        Self::with_role(MessageRole::Tool, results)
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

    /// Tool calls carried by this message, in order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content.iter().filter_map(MessageContent::as_tool_call).collect()
    }
}
