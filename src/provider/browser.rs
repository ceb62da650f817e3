//! Browser automation tools.
//!
//! Tab-level tools (URL, title, screenshot) are answered by the [`BrowserHost`].
//! DOM tools are forwarded to the page-resident agent over a [`PageChannel`]
//! and bounded by a timeout.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::tool::{
    ModelToolSchema, ParamType, ParameterSchema, ProviderInfo, Tool, ToolArgs, ToolError,
    ToolOutput, ToolProvider,
};

pub const PROVIDER_ID: &str = "browser";

/// How long a DOM request may wait for the page agent.
pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_secs(10);

const DOM_TOOLS: [&str; 4] = ["find_elements", "click_element", "scroll_page", "extract_text"];

/// URL schemes where no content script can run.
const RESTRICTED_SCHEMES: [&str; 5] = [
    "chrome://",
    "chrome-extension://",
    "edge://",
    "about:",
    "view-source:",
];

/// The tab the user is looking at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: u64,
    pub url: String,
    pub title: String,
}

/// Browser-level operations that do not need the page agent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserHost: Send + Sync {
    async fn active_tab(&self) -> Option<TabInfo>;

    /// Captures the visible part of the active tab as a data URL.
    async fn capture_visible_tab(&self) -> Result<String, ToolError>;
}

/// A DOM request sent to the page agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub tab_id: u64,
    pub tool_name: String,
    pub args: ToolArgs,
}

/// The page agent's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PageResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    /// No page agent is listening
    #[error("content script not available")]
    Unavailable,
    #[error("page agent disconnected: {0}")]
    Disconnected(String),
}

/// Request/response transport to the page agent.
#[async_trait]
pub trait PageChannel: Send + Sync {
    async fn request(&self, request: PageRequest) -> Result<PageResponse, ChannelError>;
}

/// A request waiting for the page agent, with the slot for its reply.
#[derive(Debug)]
pub struct PageEnvelope {
    pub request: PageRequest,
    reply: oneshot::Sender<PageResponse>,
}

impl PageEnvelope {
    /// Sends the reply. Returns false when the requester stopped waiting.
    pub fn respond(self, response: PageResponse) -> bool {
        self.reply.send(response).is_ok()
    }
}

/// [`PageChannel`] over an in-process message queue.
#[derive(Debug, Clone)]
pub struct MessagePageChannel {
    sender: mpsc::Sender<PageEnvelope>,
}

/// Creates a channel and the receiving end the page agent drains.
pub fn page_channel(buffer: usize) -> (MessagePageChannel, mpsc::Receiver<PageEnvelope>) {
    let (sender, receiver) = mpsc::channel(buffer.max(1));
    (MessagePageChannel { sender }, receiver)
}

#[async_trait]
impl PageChannel for MessagePageChannel {
    async fn request(&self, request: PageRequest) -> Result<PageResponse, ChannelError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(PageEnvelope { request, reply })
            .await
            .map_err(|_| ChannelError::Unavailable)?;
        response
            .await
            .map_err(|_| ChannelError::Disconnected("request dropped without a reply".to_string()))
    }
}

/// Provider for tools that inspect or drive the active page.
pub struct BrowserProvider {
    info: ProviderInfo,
    host: Arc<dyn BrowserHost>,
    channel: Arc<dyn PageChannel>,
    timeout: Duration,
    tools: Vec<Tool>,
}

impl BrowserProvider {
    pub fn new(host: Arc<dyn BrowserHost>, channel: Arc<dyn PageChannel>) -> Self {
        Self {
            info: ProviderInfo::new(
                PROVIDER_ID,
                "Browser",
                "Inspect and interact with the active browser tab",
                env!("CARGO_PKG_VERSION"),
            ),
            host,
            channel,
            timeout: DEFAULT_CHANNEL_TIMEOUT,
            tools: browser_tools(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn forward(&self, tab: &TabInfo, name: &str, args: &ToolArgs) -> ToolOutput {
        if RESTRICTED_SCHEMES.iter().any(|scheme| tab.url.starts_with(scheme)) {
            return ToolOutput::error(format!(
                "content script not available on {}",
                tab.url
            ));
        }

        let request = PageRequest {
            tab_id: tab.id,
            tool_name: name.to_string(),
            args: args.clone(),
        };

        debug!(tool = %name, tab = tab.id, "Forwarding to page agent");
        match tokio::time::timeout(self.timeout, self.channel.request(request)).await {
            Err(_) => {
                let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(tool = %name, timeout_ms = millis, "Page agent timed out");
                ToolOutput::failure(ToolError::ChannelTimeout(millis))
            }
            Ok(Err(error)) => ToolOutput::error(error.to_string()),
            Ok(Ok(response)) if response.success => {
                ToolOutput::ok(response.data.unwrap_or(Value::Null))
            }
            Ok(Ok(response)) => ToolOutput::error(
                response
                    .error
                    .unwrap_or_else(|| "page agent reported a failure".to_string()),
            ),
        }
    }
}

#[async_trait]
impl ToolProvider for BrowserProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    fn tool_definitions(&self) -> Vec<Tool> {
        self.tools.clone()
    }

    async fn execute(&self, name: &str, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        if !self.tools.iter().any(|tool| tool.name == name) {
            return Err(ToolError::ToolNotFound(name.to_string()));
        }

        let Some(tab) = self.host.active_tab().await else {
            return Ok(ToolOutput::error("no active tab"));
        };

        let output = match name {
            "get_current_url" => ToolOutput::ok(json!({ "url": tab.url })),
            "get_page_title" => ToolOutput::ok(json!({ "title": tab.title })),
            "take_screenshot" => match self.host.capture_visible_tab().await {
                Ok(image) => ToolOutput::ok(json!({ "image": image, "url": tab.url })),
                Err(error) => ToolOutput::failure(error),
            },
            dom if DOM_TOOLS.contains(&dom) => self.forward(&tab, dom, args).await,
            other => return Err(ToolError::ToolNotFound(other.to_string())),
        };
        Ok(output)
    }

    fn schemas(&self) -> Option<BTreeMap<String, ModelToolSchema>> {
        Some(
            self.tools
                .iter()
                .map(|tool| (tool.name.clone(), ModelToolSchema::from_tool(tool)))
                .collect(),
        )
    }
}

fn browser_tool(name: &str, description: &str, parameters: ParameterSchema) -> Tool {
    Tool::new(format!("{}.{}", PROVIDER_ID, name), name, description, PROVIDER_ID)
        .with_parameters(parameters)
}

fn browser_tools() -> Vec<Tool> {
    vec![
        browser_tool(
            "get_current_url",
            "Get the URL of the active browser tab",
            ParameterSchema::new(),
        ),
        browser_tool(
            "get_page_title",
            "Get the title of the active browser tab",
            ParameterSchema::new(),
        ),
        browser_tool(
            "find_elements",
            "Find elements on the page matching a CSS selector",
            ParameterSchema::new()
                .required("selector", ParamType::String, "CSS selector to match")
                .optional("limit", ParamType::Number, "Maximum number of elements to return"),
        ),
        browser_tool(
            "click_element",
            "Click the first element matching a CSS selector",
            ParameterSchema::new().required("selector", ParamType::String, "CSS selector of the element"),
        ),
        browser_tool(
            "scroll_page",
            "Scroll the page",
            ParameterSchema::new()
                .required("direction", ParamType::String, "Where to scroll")
                .with_enum("direction", ["up", "down", "top", "bottom"])
                .optional("amount", ParamType::Number, "Distance in pixels for up/down"),
        ),
        browser_tool(
            "extract_text",
            "Extract visible text from the page or from elements matching a selector",
            ParameterSchema::new().optional("selector", ParamType::String, "CSS selector; whole page when omitted"),
        ),
        browser_tool(
            "take_screenshot",
            "Capture a screenshot of the visible part of the active tab",
            ParameterSchema::new(),
        )
        .with_output_schema(json!({
            "type": "object",
            "properties": {
                "image": {"type": "string", "description": "PNG data URL"},
                "url": {"type": "string"}
            }
        })),
    ]
}
