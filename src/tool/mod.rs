pub mod history;
pub mod registry;
pub mod schema;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use history::{ExecutionHistory, ExecutionHistoryEntry, DEFAULT_HISTORY_CAPACITY};
pub use registry::{
    ProviderSummary, RegisterProviderOptions, RegisterToolOptions, ToolRegistry,
};
pub use schema::{ModelToolSchema, ParamType, ParameterSchema, ParameterSpec};
pub use tool_trait::{DynProvider, ToolProvider};
pub use tool_types::{
    ErrorKind, ProviderInfo, Tool, ToolArgs, ToolCall, ToolDefinition, ToolError,
    ToolExecutionResult, ToolOutput, parse_arguments,
};
pub use validation::{validate_arguments, validate_tool};

mod tool_types {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use super::schema::ParameterSchema;

    /// Arguments passed to a tool, keyed by parameter name.
    pub type ToolArgs = serde_json::Map<String, Value>;

    /// Definition of a tool as offered to the language model.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ToolDefinition {
        /// The name of the tool
        pub name: String,
        /// A description of what the tool does
        pub description: String,
        /// JSON Schema for the tool's input parameters
        pub input_schema: Value,
    }

    /// A callable capability owned by a provider.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Tool {
        /// Registry-wide identifier
        pub id: String,
        /// Public lookup key used by the model
        pub name: String,
        /// Natural-language description shown to the model
        pub description: String,
        /// Declared parameters
        pub parameters: ParameterSchema,
        /// Optional schema describing the tool's result
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub output_schema: Option<Value>,
        /// Whether the tool can currently be executed
        pub enabled: bool,
        /// The provider that owns this tool
        pub provider_id: String,
        /// Free-form metadata merged at registration time
        #[serde(default)]
        pub metadata: serde_json::Map<String, Value>,
    }

    impl Tool {
        /// Creates an enabled tool with no parameters.
        pub fn new(
            id: impl Into<String>,
            name: impl Into<String>,
            description: impl Into<String>,
            provider_id: impl Into<String>,
        ) -> Self {
            Self {
                id: id.into(),
                name: name.into(),
                description: description.into(),
                parameters: ParameterSchema::default(),
                output_schema: None,
                enabled: true,
                provider_id: provider_id.into(),
                metadata: serde_json::Map::new(),
            }
        }

        pub fn with_parameters(mut self, parameters: ParameterSchema) -> Self {
            self.parameters = parameters;
            self
        }

        pub fn with_output_schema(mut self, schema: Value) -> Self {
            self.output_schema = Some(schema);
            self
        }

        /// Converts the tool to its model-facing definition.
        pub fn to_definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.name.clone(),
                description: self.description.clone(),
                input_schema: self.parameters.to_json_schema(),
            }
        }
    }

    /// Identity of a capability provider.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ProviderInfo {
        pub id: String,
        pub name: String,
        pub description: String,
        pub version: String,
    }

    impl ProviderInfo {
        pub fn new(
            id: impl Into<String>,
            name: impl Into<String>,
            description: impl Into<String>,
            version: impl Into<String>,
        ) -> Self {
            Self {
                id: id.into(),
                name: name.into(),
                description: description.into(),
                version: version.into(),
            }
        }
    }

    /// A tool invocation requested by the model.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ToolCall {
        /// Correlation id echoed back in the tool result
        pub id: String,
        /// The name of the tool to call
        pub name: String,
        /// Raw JSON argument payload
        pub arguments: String,
    }

    impl ToolCall {
        pub fn new(
            id: impl Into<String>,
            name: impl Into<String>,
            arguments: impl Into<String>,
        ) -> Self {
            Self {
                id: id.into(),
                name: name.into(),
                arguments: arguments.into(),
            }
        }
    }

    /// Parses a raw argument payload into a parameter map.
    ///
    /// An empty payload is treated as `{}`.
    pub fn parse_arguments(raw: &str) -> Result<ToolArgs, ToolError> {
        if raw.trim().is_empty() {
            return Ok(ToolArgs::new());
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ToolError::Validation(
                "tool arguments must be a JSON object".to_string(),
            )),
            Err(e) => Err(ToolError::Validation(format!(
                "invalid tool arguments: {}",
                e
            ))),
        }
    }

    /// Coarse classification of invocation failures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ErrorKind {
        NotFound,
        Disabled,
        Validation,
        Execution,
        ChannelTimeout,
    }

    /// Errors raised by the registry and by providers.
    #[derive(Debug, Clone, PartialEq, thiserror::Error)]
    pub enum ToolError {
        #[error("tool not found: {0}")]
        ToolNotFound(String),
        #[error("provider not found: {0}")]
        ProviderNotFound(String),
        #[error("tool disabled: {0}")]
        ToolDisabled(String),
        #[error("provider disabled: {0}")]
        ProviderDisabled(String),
        #[error("{0}")]
        Validation(String),
        #[error("{0}")]
        Execution(String),
        #[error("page agent did not respond within {0} ms")]
        ChannelTimeout(u64),
        #[error("provider initialization failed: {0}")]
        Initialization(String),
    }

    impl ToolError {
        pub fn kind(&self) -> ErrorKind {
            match self {
                ToolError::ToolNotFound(_) | ToolError::ProviderNotFound(_) => {
                    ErrorKind::NotFound
                }
                ToolError::ToolDisabled(_) | ToolError::ProviderDisabled(_) => {
                    ErrorKind::Disabled
                }
                ToolError::Validation(_) => ErrorKind::Validation,
                ToolError::ChannelTimeout(_) => ErrorKind::ChannelTimeout,
                ToolError::Execution(_) | ToolError::Initialization(_) => ErrorKind::Execution,
            }
        }
    }

    /// Structured outcome returned by a provider.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ToolOutput {
        /// The output from the tool
        pub data: Value,
        /// Set when the tool hit an expected failure
        pub error: Option<ToolError>,
    }

    impl ToolOutput {
        /// Creates a successful output.
        pub fn ok(data: impl Into<Value>) -> Self {
            Self {
                data: data.into(),
                error: None,
            }
        }

        /// Creates an output describing an expected failure.
        pub fn failure(error: ToolError) -> Self {
            Self {
                data: Value::Null,
                error: Some(error),
            }
        }

        /// Shorthand for a domain-level execution failure.
        pub fn error(message: impl Into<String>) -> Self {
            Self::failure(ToolError::Execution(message.into()))
        }
    }

    /// Outcome of one invocation through the registry.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ToolExecutionResult {
        pub success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error_kind: Option<ErrorKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tool_call_id: Option<String>,
        pub execution_time_ms: u64,
    }

    impl ToolExecutionResult {
        pub fn succeeded(result: Value, tool_call_id: Option<String>, execution_time_ms: u64) -> Self {
            Self {
                success: true,
                result: Some(result),
                error: None,
                error_kind: None,
                tool_call_id,
                execution_time_ms,
            }
        }

        pub fn failed(error: &ToolError, tool_call_id: Option<String>, execution_time_ms: u64) -> Self {
            Self {
                success: false,
                result: None,
                error: Some(error.to_string()),
                error_kind: Some(error.kind()),
                tool_call_id,
                execution_time_ms,
            }
        }

        /// Renders the result as the text fed back to the model.
        pub fn to_model_content(&self) -> String {
            if self.success {
                match &self.result {
                    Some(Value::String(s)) => s.clone(),
                    Some(value) => value.to_string(),
                    None => String::new(),
                }
            } else {
                serde_json::json!({
                    "success": false,
                    "error": self.error.clone().unwrap_or_default(),
                })
                .to_string()
            }
        }
    }
}

mod tool_trait {
    use super::schema::ModelToolSchema;
    use super::tool_types::{ProviderInfo, Tool, ToolArgs, ToolError, ToolOutput};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// A source of tools with its own lifecycle.
    ///
    /// Expected failures (no active tab, nothing matched, remote timeout) are
    /// reported through [`ToolOutput::failure`]. `Err` is reserved for
    /// exceptional conditions; the registry converts both into failed results.
    #[async_trait]
    pub trait ToolProvider: Send + Sync {
        /// Returns the provider's identity.
        fn info(&self) -> &ProviderInfo;

        /// Performs setup before the provider's tools are registered.
        async fn initialize(&self) -> Result<(), ToolError> {
            Ok(())
        }

        /// Returns the tools this provider offers.
        fn tool_definitions(&self) -> Vec<Tool>;

        /// Executes the named tool with already-validated arguments.
        async fn execute(&self, name: &str, args: &ToolArgs) -> Result<ToolOutput, ToolError>;

        /// Exports model-facing schemas, keyed by tool name.
        fn schemas(&self) -> Option<BTreeMap<String, ModelToolSchema>> {
            None
        }
    }

    /// A type alias for a shared provider reference.
    pub type DynProvider = Arc<dyn ToolProvider>;
}
