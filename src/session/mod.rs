pub mod conversation;
pub mod identity;
pub mod message;

pub use conversation::Conversation;
pub use identity::{Identity, IdentityProvider, StaticIdentity};
pub use message::{Message, MessageContent, MessageRole};
