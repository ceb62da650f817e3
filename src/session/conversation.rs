use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Message, MessageRole};

/// An ordered exchange between the user, the assistant and its tools.
///
/// Lives only as long as the turn or session that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier for the conversation
    pub id: String,
    /// The messages in the conversation
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Creates an empty conversation.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
        }
    }

    /// Creates a conversation holding a single user message.
    pub fn from_user(text: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.push(Message::new_user(text));
        conversation
    }

    /// Adds a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }

    /// A reduced copy keeping system messages and the latest user message.
    pub fn simplified(&self) -> Self {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .cloned()
            .collect();
        if let Some(user) = self.last_user_message() {
            messages.push(user.clone());
        }
        Self {
            id: self.id.clone(),
            messages,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
