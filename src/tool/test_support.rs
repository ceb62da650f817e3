//! Providers and tools shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use super::{ParamType, ParameterSchema, ProviderInfo, Tool, ToolArgs, ToolError, ToolOutput, ToolProvider};

/// A provider whose behavior is keyed off the tool name.
///
/// `explode` returns `Err`, `panic` panics, `miss` returns a soft failure and
/// anything else echoes its arguments.
pub(crate) struct StubProvider {
    info: ProviderInfo,
    tools: Vec<Tool>,
    calls: Arc<AtomicUsize>,
    init_error: Option<String>,
}

impl StubProvider {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            info: ProviderInfo::new(id, format!("{} provider", id), "Test provider", "0.1.0"),
            tools: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            init_error: None,
        }
    }

    pub(crate) fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub(crate) fn failing_init(mut self, message: &str) -> Self {
        self.init_error = Some(message.to_string());
        self
    }

    pub(crate) fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl ToolProvider for StubProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    async fn initialize(&self) -> Result<(), ToolError> {
        match &self.init_error {
            Some(message) => Err(ToolError::Initialization(message.clone())),
            None => Ok(()),
        }
    }

    fn tool_definitions(&self) -> Vec<Tool> {
        self.tools.clone()
    }

    async fn execute(&self, name: &str, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match name {
            "explode" => Err(ToolError::Execution("provider exploded".to_string())),
            "panic" => panic!("provider panicked"),
            "miss" => Ok(ToolOutput::error("nothing matched")),
            _ => Ok(ToolOutput::ok(json!({ "tool": name, "args": args }))),
        }
    }
}

/// A tool requiring `query` with an optional `mode` restricted to `a`/`b`.
pub(crate) fn search_tool(provider_id: &str) -> Tool {
    Tool::new(
        format!("{}.search_memories", provider_id),
        "search_memories",
        "Search saved memories",
        provider_id,
    )
    .with_parameters(
        ParameterSchema::new()
            .required("query", ParamType::String, "Search text")
            .optional("mode", ParamType::String, "Match mode")
            .with_enum("mode", ["a", "b"]),
    )
}

/// A parameterless tool.
pub(crate) fn simple_tool(provider_id: &str, name: &str) -> Tool {
    Tool::new(
        format!("{}.{}", provider_id, name),
        name,
        format!("Runs {}", name),
        provider_id,
    )
}

pub(crate) fn args(value: serde_json::Value) -> ToolArgs {
    value.as_object().cloned().unwrap_or_default()
}
