//! Concrete capability providers.
//!
//! Each provider is independent of the others; they only share the
//! [`ToolProvider`](crate::tool::ToolProvider) contract.

pub mod app_actions;
pub mod browser;
pub mod memory;

pub use app_actions::{ActionService, AppActionsProvider, HttpActionService, RemoteAction};
pub use browser::{
    BrowserHost, BrowserProvider, ChannelError, MessagePageChannel, PageChannel, PageEnvelope,
    PageRequest, PageResponse, TabInfo, page_channel,
};
pub use memory::{InMemoryStore, MemoryProvider, MemoryRecord, MemoryStore, SearchHit, SemanticSearch};
