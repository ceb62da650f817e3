use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::history::{DEFAULT_HISTORY_CAPACITY, ExecutionHistory, ExecutionHistoryEntry};
use super::schema::ModelToolSchema;
use super::validation::{validate_arguments, validate_tool};
use super::{
    DynProvider, ProviderInfo, Tool, ToolArgs, ToolCall, ToolDefinition, ToolError,
    ToolExecutionResult, ToolOutput, parse_arguments,
};
use crate::session::MessageContent;

/// Options for [`ToolRegistry::register_provider`].
#[derive(Debug, Clone)]
pub struct RegisterProviderOptions {
    pub enabled: bool,
    /// Register every tool the provider declares
    pub auto_register_tools: bool,
}

impl Default for RegisterProviderOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_register_tools: true,
        }
    }
}

/// Options for [`ToolRegistry::register_tool`].
#[derive(Debug, Clone, Default)]
pub struct RegisterToolOptions {
    /// Overrides the tool's own enabled flag
    pub enabled: Option<bool>,
    /// Merged over the tool's metadata
    pub metadata: serde_json::Map<String, Value>,
}

/// A read-only view of a registered provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub info: ProviderInfo,
    pub enabled: bool,
    pub tool_count: usize,
}

struct ProviderEntry {
    provider: DynProvider,
    enabled: bool,
    tool_ids: BTreeSet<String>,
}

#[derive(Default)]
struct RegistryState {
    providers: HashMap<String, ProviderEntry>,
    tools: HashMap<String, Tool>,
}

impl RegistryState {
    fn check_insertable(&self, tool: &Tool) -> Result<(), ToolError> {
        validate_tool(tool)?;
        if !self.providers.contains_key(&tool.provider_id) {
            return Err(ToolError::ProviderNotFound(tool.provider_id.clone()));
        }
        self.check_name_free(tool)
    }

    fn check_name_free(&self, tool: &Tool) -> Result<(), ToolError> {
        if let Some(existing) = self
            .tools
            .values()
            .find(|t| t.name == tool.name && t.id != tool.id)
        {
            return Err(ToolError::Validation(format!(
                "tool name {} is already registered as {}",
                tool.name, existing.id
            )));
        }
        Ok(())
    }

    /// Inserts into the global map and the owning provider's set. Callers
    /// must have run `check_insertable`.
    fn insert_tool(&mut self, tool: Tool) {
        if let Some(entry) = self.providers.get_mut(&tool.provider_id) {
            entry.tool_ids.insert(tool.id.clone());
        }
        let provider_id = tool.provider_id.clone();
        if let Some(previous) = self.tools.insert(tool.id.clone(), tool) {
            if previous.provider_id != provider_id {
                if let Some(entry) = self.providers.get_mut(&previous.provider_id) {
                    entry.tool_ids.remove(&previous.id);
                }
            }
        }
    }

    /// A tool is callable only while both it and its provider are enabled.
    fn is_active(&self, tool: &Tool) -> bool {
        tool.enabled
            && self
                .providers
                .get(&tool.provider_id)
                .is_some_and(|entry| entry.enabled)
    }

    fn active_tool_by_name(&self, name: &str) -> Option<&Tool> {
        self.tools
            .values()
            .find(|tool| tool.name == name && self.is_active(tool))
    }

    fn remove_tool(&mut self, id: &str) -> Option<Tool> {
        let tool = self.tools.remove(id)?;
        if let Some(entry) = self.providers.get_mut(&tool.provider_id) {
            entry.tool_ids.remove(id);
        }
        Some(tool)
    }
}

/// Owns every registered provider and tool, and is the single entry point
/// for invoking them.
///
/// Tool and provider maps live behind one lock so that registration changes
/// are atomic with respect to lookups. History appends go through a separate
/// mutex and are never interleaved.
pub struct ToolRegistry {
    state: RwLock<RegistryState>,
    history: Mutex<ExecutionHistory>,
}

impl ToolRegistry {
    /// Creates an empty registry with the default history capacity.
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates an empty registry keeping at most `capacity` history entries.
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            history: Mutex::new(ExecutionHistory::new(capacity)),
        }
    }

    /// Initializes and stores a provider, registering its tools unless told not to.
    ///
    /// A provider with an id that is already registered replaces the old one
    /// and inherits its tool set.
    pub async fn register_provider(
        &self,
        provider: DynProvider,
        options: RegisterProviderOptions,
    ) -> Result<(), ToolError> {
        let info = provider.info().clone();
        if info.id.trim().is_empty() {
            return Err(ToolError::Validation("provider id must not be empty".to_string()));
        }

        provider.initialize().await.map_err(|e| match e {
            ToolError::Initialization(_) => e,
            other => ToolError::Initialization(other.to_string()),
        })?;

        let tools = if options.auto_register_tools {
            provider.tool_definitions()
        } else {
            Vec::new()
        };

        let mut state = self.state.write().await;
        {
            let mut batch_names: HashSet<&str> = HashSet::new();
            tools.iter().try_for_each(|tool| {
                if tool.provider_id != info.id {
                    return Err(ToolError::Validation(format!(
                        "tool {} declares provider {} but was offered by {}",
                        tool.id, tool.provider_id, info.id
                    )));
                }
                if !batch_names.insert(tool.name.as_str()) {
                    return Err(ToolError::Validation(format!(
                        "provider {} declares tool name {} twice",
                        info.id, tool.name
                    )));
                }
                validate_tool(tool)?;
                state.check_name_free(tool)
            })?;
        }

        let tool_ids = state
            .providers
            .remove(&info.id)
            .map(|entry| entry.tool_ids)
            .unwrap_or_default();
        for tool_id in &tool_ids {
            if let Some(tool) = state.tools.get_mut(tool_id) {
                tool.enabled = options.enabled;
            }
        }
        state.providers.insert(
            info.id.clone(),
            ProviderEntry {
                provider,
                enabled: options.enabled,
                tool_ids,
            },
        );

        let count = tools.len();
        for mut tool in tools {
            tool.enabled = tool.enabled && options.enabled;
            state.insert_tool(tool);
        }

        info!(
            provider = %info.id,
            version = %info.version,
            tools = count,
            enabled = options.enabled,
            "Provider registered"
        );
        Ok(())
    }

    /// Removes a provider together with every tool it owns.
    pub async fn unregister_provider(&self, id: &str) -> Result<(), ToolError> {
        let mut state = self.state.write().await;
        let entry = state
            .providers
            .remove(id)
            .ok_or_else(|| ToolError::ProviderNotFound(id.to_string()))?;

        for tool_id in &entry.tool_ids {
            state.tools.remove(tool_id);
        }
        state.tools.retain(|_, tool| tool.provider_id != id);

        info!(provider = %id, tools = entry.tool_ids.len(), "Provider unregistered");
        Ok(())
    }

    /// Registers a single tool. Its provider must already be registered.
    pub async fn register_tool(
        &self,
        mut tool: Tool,
        options: RegisterToolOptions,
    ) -> Result<(), ToolError> {
        if let Some(enabled) = options.enabled {
            tool.enabled = enabled;
        }
        tool.metadata.extend(options.metadata);

        let mut state = self.state.write().await;
        state.check_insertable(&tool)?;
        if let Some(entry) = state.providers.get(&tool.provider_id) {
            tool.enabled = tool.enabled && entry.enabled;
        }

        debug!(tool = %tool.name, provider = %tool.provider_id, "Tool registered");
        state.insert_tool(tool);
        Ok(())
    }

    /// Unregisters a tool.
    pub async fn unregister_tool(&self, id: &str) -> Result<Tool, ToolError> {
        let mut state = self.state.write().await;
        let tool = state
            .remove_tool(id)
            .ok_or_else(|| ToolError::ToolNotFound(id.to_string()))?;
        debug!(tool = %tool.name, "Tool unregistered");
        Ok(tool)
    }

    /// Gets a tool by id, enabled or not.
    pub async fn get_tool(&self, id: &str) -> Option<Tool> {
        self.state.read().await.tools.get(id).cloned()
    }

    /// Gets an enabled tool by its public name.
    pub async fn get_tool_by_name(&self, name: &str) -> Option<Tool> {
        self.state
            .read()
            .await
            .active_tool_by_name(name)
            .cloned()
    }

    /// Returns every registered tool, sorted by name.
    pub async fn get_all_tools(&self) -> Vec<Tool> {
        let state = self.state.read().await;
        sorted(state.tools.values().cloned())
    }

    /// Returns the tools that can currently be executed, sorted by name.
    pub async fn get_enabled_tools(&self) -> Vec<Tool> {
        let state = self.state.read().await;
        sorted(state.tools.values().filter(|tool| state.is_active(tool)).cloned())
    }

    /// Returns the tools owned by a provider, sorted by name.
    pub async fn get_tools_by_provider(&self, provider_id: &str) -> Vec<Tool> {
        let state = self.state.read().await;
        match state.providers.get(provider_id) {
            Some(entry) => sorted(
                entry
                    .tool_ids
                    .iter()
                    .filter_map(|id| state.tools.get(id))
                    .cloned(),
            ),
            None => Vec::new(),
        }
    }

    /// Returns a summary of each registered provider, sorted by id.
    pub async fn providers(&self) -> Vec<ProviderSummary> {
        let state = self.state.read().await;
        let mut summaries: Vec<_> = state
            .providers
            .values()
            .map(|entry| ProviderSummary {
                info: entry.provider.info().clone(),
                enabled: entry.enabled,
                tool_count: entry.tool_ids.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.info.id.cmp(&b.info.id));
        summaries
    }

    /// Sets a tool's own flag. While its provider is disabled the tool stays
    /// out of every enabled-only lookup regardless of this flag.
    pub async fn set_tool_enabled(&self, id: &str, enabled: bool) -> Result<(), ToolError> {
        let mut state = self.state.write().await;
        let tool = state
            .tools
            .get_mut(id)
            .ok_or_else(|| ToolError::ToolNotFound(id.to_string()))?;
        tool.enabled = enabled;
        debug!(tool = %tool.name, enabled, "Tool toggled");
        Ok(())
    }

    /// Enables or disables a provider and, with it, every tool it owns.
    pub async fn set_provider_enabled(&self, id: &str, enabled: bool) -> Result<(), ToolError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let entry = state
            .providers
            .get_mut(id)
            .ok_or_else(|| ToolError::ProviderNotFound(id.to_string()))?;
        entry.enabled = enabled;
        for tool_id in &entry.tool_ids {
            if let Some(tool) = state.tools.get_mut(tool_id) {
                tool.enabled = enabled;
            }
        }
        info!(provider = %id, enabled, tools = entry.tool_ids.len(), "Provider toggled");
        Ok(())
    }

    /// Validates and runs an enabled tool by name.
    ///
    /// Never fails: every problem is reported as a failed result. Lookups
    /// that find no enabled tool leave no trace; everything else is recorded
    /// in the execution history.
    pub async fn execute_tool(
        &self,
        name: &str,
        args: &ToolArgs,
        tool_call_id: Option<&str>,
    ) -> ToolExecutionResult {
        let started = Instant::now();
        let call_id = tool_call_id.map(str::to_string);

        let (tool, provider) = {
            let state = self.state.read().await;
            let Some(tool) = state.active_tool_by_name(name).cloned() else {
                debug!(tool = %name, "Tool not found");
                return ToolExecutionResult::failed(
                    &ToolError::ToolNotFound(name.to_string()),
                    call_id,
                    elapsed_ms(started),
                );
            };
            let provider = state
                .providers
                .get(&tool.provider_id)
                .map(|entry| (entry.provider.clone(), entry.enabled));
            (tool, provider)
        };

        let outcome = dispatch(&tool, provider, args).await;
        let execution_time_ms = elapsed_ms(started);
        let result = match outcome {
            Ok(data) => ToolExecutionResult::succeeded(data, call_id, execution_time_ms),
            Err(error) => {
                debug!(tool = %tool.name, error = %error, "Tool execution failed");
                ToolExecutionResult::failed(&error, call_id, execution_time_ms)
            }
        };

        self.history.lock().await.push(ExecutionHistoryEntry {
            tool_id: tool.id.clone(),
            tool_name: tool.name.clone(),
            args: args.clone(),
            result: result.clone(),
            timestamp_ms: Utc::now().timestamp_millis(),
        });

        result
    }

    /// Resolves a model-issued call's tool, parses its arguments and executes it.
    ///
    /// An unknown name is reported as not found before the arguments are
    /// looked at.
    pub async fn execute_tool_call(&self, call: &ToolCall) -> ToolExecutionResult {
        let started = Instant::now();
        match parse_arguments(&call.arguments) {
            Ok(args) => self.execute_tool(&call.name, &args, Some(&call.id)).await,
            Err(error) => {
                let error = if self.get_tool_by_name(&call.name).await.is_some() {
                    warn!(tool = %call.name, error = %error, "Unparseable tool arguments");
                    error
                } else {
                    debug!(tool = %call.name, "Tool not found");
                    ToolError::ToolNotFound(call.name.clone())
                };
                ToolExecutionResult::failed(&error, Some(call.id.clone()), elapsed_ms(started))
            }
        }
    }

    /// Executes calls in order and returns one tool-result message per call.
    pub async fn execute_tool_calls(&self, calls: &[ToolCall]) -> Vec<MessageContent> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.execute_tool_call(call).await;
            results.push(MessageContent::tool_result(call.id.clone(), &result));
        }
        results
    }

    /// Collects model-facing schemas from every enabled provider that exports them.
    pub async fn get_schemas_for_model(&self) -> BTreeMap<String, ModelToolSchema> {
        let providers: Vec<DynProvider> = {
            let state = self.state.read().await;
            state
                .providers
                .values()
                .filter(|entry| entry.enabled)
                .map(|entry| entry.provider.clone())
                .collect()
        };

        let mut schemas = BTreeMap::new();
        for provider in providers {
            if let Some(exported) = provider.schemas() {
                schemas.extend(exported);
            }
        }
        schemas
    }

    /// Returns the definitions of every enabled tool, as offered to the model.
    pub async fn enabled_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.get_enabled_tools()
            .await
            .iter()
            .map(Tool::to_definition)
            .collect()
    }

    /// Returns the newest `limit` history entries (all when `None`), oldest first.
    pub async fn get_execution_history(&self, limit: Option<usize>) -> Vec<ExecutionHistoryEntry> {
        self.history.lock().await.recent(limit)
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    /// Drops every provider, tool and history entry.
    pub async fn dispose(&self) {
        let mut state = self.state.write().await;
        state.providers.clear();
        state.tools.clear();
        drop(state);
        self.clear_history().await;
    }
}

async fn dispatch(
    tool: &Tool,
    provider: Option<(DynProvider, bool)>,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    if !tool.enabled {
        return Err(ToolError::ToolDisabled(tool.name.clone()));
    }
    let (provider, provider_enabled) =
        provider.ok_or_else(|| ToolError::ProviderNotFound(tool.provider_id.clone()))?;
    if !provider_enabled {
        return Err(ToolError::ProviderDisabled(tool.provider_id.clone()));
    }

    validate_arguments(&tool.parameters, args)?;

    debug!(tool = %tool.name, provider = %tool.provider_id, "Executing tool");
    let execution = AssertUnwindSafe(provider.execute(&tool.name, args)).catch_unwind();
    match execution.await {
        Ok(Ok(ToolOutput { error: Some(error), .. })) => Err(error),
        Ok(Ok(ToolOutput { data, error: None })) => Ok(data),
        Ok(Err(error)) => {
            warn!(tool = %tool.name, error = %error, "Provider raised an error");
            Err(error)
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(tool = %tool.name, panic = %message, "Provider panicked");
            Err(ToolError::Execution(format!("tool {} panicked: {}", tool.name, message)))
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn sorted(tools: impl Iterator<Item = Tool>) -> Vec<Tool> {
    let mut tools: Vec<Tool> = tools.collect();
    tools.sort_by(|a, b| a.name.cmp(&b.name));
    tools
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (providers, tools) = match self.state.try_read() {
            Ok(state) => (Some(state.providers.len()), Some(state.tools.len())),
            Err(_) => (None, None),
        };
        f.debug_struct("ToolRegistry")
            .field("providers_count", &providers)
            .field("tools_count", &tools)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ErrorKind;
    use crate::tool::test_support::{StubProvider, args, search_tool, simple_tool};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use tokio_test::{assert_err, assert_ok};

    async fn registry_with(provider: StubProvider) -> ToolRegistry {
        let registry = ToolRegistry::new();
        assert_ok!(
            registry
                .register_provider(Arc::new(provider), RegisterProviderOptions::default())
                .await
        );
        registry
    }

    #[tokio::test]
    async fn test_register_tool_requires_provider() {
        let registry = ToolRegistry::new();
        let err = registry
            .register_tool(search_tool("memory"), RegisterToolOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::ProviderNotFound("memory".to_string()));

        assert_ok!(
            registry
                .register_provider(
                    Arc::new(StubProvider::new("memory")),
                    RegisterProviderOptions::default()
                )
                .await
        );
        assert_ok!(
            registry
                .register_tool(search_tool("memory"), RegisterToolOptions::default())
                .await
        );
        assert!(registry.get_tool("memory.search_memories").await.is_some());
    }

    #[tokio::test]
    async fn test_register_tool_rejects_bad_shape() {
        let registry = registry_with(StubProvider::new("memory")).await;
        let mut tool = search_tool("memory");
        tool.description.clear();

        let err = assert_err!(registry.register_tool(tool, RegisterToolOptions::default()).await);
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_register_tool_options_override() {
        let registry = registry_with(StubProvider::new("memory")).await;
        let mut metadata = serde_json::Map::new();
        metadata.insert("category".to_string(), json!("memory"));

        registry
            .register_tool(
                search_tool("memory"),
                RegisterToolOptions {
                    enabled: Some(false),
                    metadata,
                },
            )
            .await
            .unwrap();

        let tool = registry.get_tool("memory.search_memories").await.unwrap();
        assert!(!tool.enabled);
        assert_eq!(tool.metadata["category"], json!("memory"));
        assert!(registry.get_tool_by_name("search_memories").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let registry = registry_with(StubProvider::new("a").with_tool(simple_tool("a", "ping"))).await;
        registry
            .register_provider(Arc::new(StubProvider::new("b")), RegisterProviderOptions::default())
            .await
            .unwrap();

        let err = registry
            .register_tool(simple_tool("b", "ping"), RegisterToolOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_provider_initialization_failure_is_propagated() {
        let registry = ToolRegistry::new();
        let provider = StubProvider::new("apps")
            .with_tool(simple_tool("apps", "ping"))
            .failing_init("service offline");

        let err = registry
            .register_provider(Arc::new(provider), RegisterProviderOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Initialization("service offline".to_string()));
        assert!(registry.providers().await.is_empty());
        assert!(registry.get_all_tools().await.is_empty());
    }

    #[tokio::test]
    async fn test_auto_register_can_be_skipped() {
        let registry = ToolRegistry::new();
        registry
            .register_provider(
                Arc::new(StubProvider::new("a").with_tool(simple_tool("a", "ping"))),
                RegisterProviderOptions {
                    enabled: true,
                    auto_register_tools: false,
                },
            )
            .await
            .unwrap();

        assert!(registry.get_all_tools().await.is_empty());
        assert_eq!(registry.providers().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reregistering_provider_keeps_tools() {
        let registry = registry_with(StubProvider::new("a").with_tool(simple_tool("a", "ping"))).await;
        registry
            .register_provider(
                Arc::new(StubProvider::new("a")),
                RegisterProviderOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(registry.providers().await.len(), 1);
        assert_eq!(registry.get_tools_by_provider("a").await.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_provider_removes_tools() {
        let registry = registry_with(
            StubProvider::new("memory")
                .with_tool(search_tool("memory"))
                .with_tool(simple_tool("memory", "ping")),
        )
        .await;
        assert_eq!(registry.get_tools_by_provider("memory").await.len(), 2);

        registry.unregister_provider("memory").await.unwrap();

        assert!(registry.get_tools_by_provider("memory").await.is_empty());
        assert!(registry.get_all_tools().await.is_empty());
        let result = registry
            .execute_tool("search_memories", &args(json!({"query": "ai"})), None)
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::NotFound));

        let err = registry.unregister_provider("memory").await.unwrap_err();
        assert_eq!(err, ToolError::ProviderNotFound("memory".to_string()));
    }

    #[tokio::test]
    async fn test_unregister_tool() {
        let registry = registry_with(StubProvider::new("a").with_tool(simple_tool("a", "ping"))).await;

        let removed = registry.unregister_tool("a.ping").await.unwrap();
        assert_eq!(removed.name, "ping");
        assert!(registry.get_tools_by_provider("a").await.is_empty());
        assert_eq!(
            registry.unregister_tool("a.ping").await.unwrap_err(),
            ToolError::ToolNotFound("a.ping".to_string())
        );
    }

    #[tokio::test]
    async fn test_disabling_provider_cascades() {
        let registry = registry_with(
            StubProvider::new("memory")
                .with_tool(search_tool("memory"))
                .with_tool(simple_tool("memory", "ping")),
        )
        .await;
        registry
            .register_provider(
                Arc::new(StubProvider::new("web").with_tool(simple_tool("web", "open"))),
                RegisterProviderOptions::default(),
            )
            .await
            .unwrap();

        registry.set_provider_enabled("memory", false).await.unwrap();

        let enabled: Vec<_> = registry
            .get_enabled_tools()
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(enabled, vec!["open"]);
        assert!(registry.get_tool_by_name("search_memories").await.is_none());
        assert!(registry.get_tool_by_name("ping").await.is_none());

        registry.set_provider_enabled("memory", true).await.unwrap();
        assert_eq!(registry.get_enabled_tools().await.len(), 3);
    }

    #[tokio::test]
    async fn test_tool_toggle() {
        let registry = registry_with(StubProvider::new("a").with_tool(simple_tool("a", "ping"))).await;

        registry.set_tool_enabled("a.ping", false).await.unwrap();
        assert!(registry.get_tool_by_name("ping").await.is_none());
        assert!(registry.get_tool("a.ping").await.is_some());

        let result = registry.execute_tool("ping", &ToolArgs::new(), None).await;
        assert_eq!(result.error_kind, Some(ErrorKind::NotFound));

        assert!(registry.set_tool_enabled("missing", true).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_required_never_reaches_provider() {
        let provider = StubProvider::new("memory").with_tool(search_tool("memory"));
        let calls = provider.call_counter();
        let registry = registry_with(provider).await;

        let result = registry
            .execute_tool("search_memories", &ToolArgs::new(), Some("call_1"))
            .await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("missing required parameter: query"));
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
        assert_eq!(result.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enum_validation_gates_execution() {
        let provider = StubProvider::new("memory").with_tool(search_tool("memory"));
        let calls = provider.call_counter();
        let registry = registry_with(provider).await;

        let rejected = registry
            .execute_tool("search_memories", &args(json!({"query": "x", "mode": "c"})), None)
            .await;
        assert!(!rejected.success);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let accepted = registry
            .execute_tool("search_memories", &args(json!({"query": "x", "mode": "a"})), None)
            .await;
        assert!(accepted.success);
        assert_eq!(accepted.result.unwrap()["args"]["mode"], json!("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_errors_become_failed_results() {
        let registry = registry_with(
            StubProvider::new("x")
                .with_tool(simple_tool("x", "explode"))
                .with_tool(simple_tool("x", "panic"))
                .with_tool(simple_tool("x", "miss")),
        )
        .await;

        let exploded = registry.execute_tool("explode", &ToolArgs::new(), None).await;
        assert!(!exploded.success);
        assert_eq!(exploded.error.as_deref(), Some("provider exploded"));
        assert_eq!(exploded.error_kind, Some(ErrorKind::Execution));

        let panicked = registry.execute_tool("panic", &ToolArgs::new(), None).await;
        assert!(!panicked.success);
        assert!(panicked.error.unwrap().contains("provider panicked"));

        let missed = registry.execute_tool("miss", &ToolArgs::new(), None).await;
        assert!(!missed.success);
        assert_eq!(missed.error.as_deref(), Some("nothing matched"));

        assert_eq!(registry.get_execution_history(None).await.len(), 3);
    }

    #[tokio::test]
    async fn test_not_found_leaves_no_history() {
        let registry = ToolRegistry::new();
        let result = registry.execute_tool("nope", &ToolArgs::new(), Some("c")).await;
        assert_eq!(result.error.as_deref(), Some("tool not found: nope"));
        assert!(registry.get_execution_history(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let capacity = 3;
        let registry = ToolRegistry::with_history_capacity(capacity);
        registry
            .register_provider(
                Arc::new(StubProvider::new("a").with_tool(simple_tool("a", "ping"))),
                RegisterProviderOptions::default(),
            )
            .await
            .unwrap();

        for n in 0..capacity + 2 {
            registry
                .execute_tool("ping", &args(json!({ "n": n })), None)
                .await;
        }

        let history = registry.get_execution_history(None).await;
        assert_eq!(history.len(), capacity);
        let seen: Vec<_> = history.iter().map(|e| e.args["n"].clone()).collect();
        assert_eq!(seen, vec![json!(2), json!(3), json!(4)]);

        registry.clear_history().await;
        assert!(registry.get_execution_history(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_executions_are_all_recorded() {
        let registry = Arc::new(
            registry_with(
                StubProvider::new("a")
                    .with_tool(simple_tool("a", "ping"))
                    .with_tool(simple_tool("a", "pong")),
            )
            .await,
        );

        let mut handles = Vec::new();
        for n in 0..20 {
            let registry = registry.clone();
            let name = if n % 2 == 0 { "ping" } else { "pong" };
            handles.push(tokio::spawn(async move {
                registry.execute_tool(name, &ToolArgs::new(), None).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().success);
        }

        let history = registry.get_execution_history(None).await;
        assert_eq!(history.len(), 20);
        assert_eq!(history.iter().filter(|e| e.tool_name == "ping").count(), 10);
    }

    #[tokio::test]
    async fn test_execute_tool_calls_reports_parse_failures() {
        let registry = registry_with(StubProvider::new("memory").with_tool(search_tool("memory"))).await;
        let calls = vec![
            ToolCall::new("call_1", "search_memories", r#"{"query":"ai"}"#),
            ToolCall::new("call_2", "search_memories", "{not json"),
        ];

        let results = registry.execute_tool_calls(&calls).await;
        assert_eq!(results.len(), 2);
        match &results[0] {
            MessageContent::ToolResult { tool_call_id, is_error, .. } => {
                assert_eq!(tool_call_id, "call_1");
                assert_eq!(*is_error, None);
            }
            other => panic!("unexpected content: {:?}", other),
        }
        match &results[1] {
            MessageContent::ToolResult { tool_call_id, result, is_error } => {
                assert_eq!(tool_call_id, "call_2");
                assert_eq!(*is_error, Some(true));
                assert!(result.contains("invalid tool arguments"));
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_reregistration_keeps_previous_provider() {
        let registry = registry_with(StubProvider::new("a").with_tool(simple_tool("a", "ping"))).await;

        let replacement = StubProvider::new("a")
            .with_tool(simple_tool("a", "pong"))
            .with_tool(Tool::new("a.pong2", "pong", "Duplicate name", "a"));
        let err = assert_err!(
            registry
                .register_provider(
                    Arc::new(replacement),
                    RegisterProviderOptions {
                        enabled: false,
                        auto_register_tools: true,
                    },
                )
                .await
        );
        assert_eq!(err.kind(), ErrorKind::Validation);

        let providers = registry.providers().await;
        assert_eq!(providers.len(), 1);
        assert!(providers[0].enabled);
        assert_eq!(providers[0].tool_count, 1);
        assert!(registry.get_tool("a.pong").await.is_none());
        assert!(registry.execute_tool("ping", &ToolArgs::new(), None).await.success);
    }

    #[tokio::test]
    async fn test_failed_first_registration_leaves_nothing() {
        let registry = ToolRegistry::new();
        let provider = StubProvider::new("a")
            .with_tool(simple_tool("a", "ping"))
            .with_tool(simple_tool("b", "stray"));

        assert_err!(
            registry
                .register_provider(Arc::new(provider), RegisterProviderOptions::default())
                .await
        );
        assert!(registry.providers().await.is_empty());
        assert!(registry.get_all_tools().await.is_empty());
    }

    #[tokio::test]
    async fn test_reregistering_disabled_disables_inherited_tools() {
        let registry = registry_with(StubProvider::new("a").with_tool(simple_tool("a", "ping"))).await;

        registry
            .register_provider(
                Arc::new(StubProvider::new("a")),
                RegisterProviderOptions {
                    enabled: false,
                    auto_register_tools: true,
                },
            )
            .await
            .unwrap();

        assert!(registry.get_enabled_tools().await.is_empty());
        assert!(registry.get_tool_by_name("ping").await.is_none());
        assert!(!registry.get_tool("a.ping").await.unwrap().enabled);

        registry.set_provider_enabled("a", true).await.unwrap();
        assert!(registry.get_tool_by_name("ping").await.is_some());
    }

    #[tokio::test]
    async fn test_tool_toggle_under_disabled_provider_stays_hidden() {
        let registry = registry_with(StubProvider::new("a").with_tool(simple_tool("a", "ping"))).await;

        registry.set_provider_enabled("a", false).await.unwrap();
        registry.set_tool_enabled("a.ping", true).await.unwrap();

        assert!(registry.get_enabled_tools().await.is_empty());
        assert!(registry.get_tool_by_name("ping").await.is_none());
        assert!(registry.enabled_tool_definitions().await.is_empty());
        let result = registry.execute_tool("ping", &ToolArgs::new(), None).await;
        assert_eq!(result.error_kind, Some(ErrorKind::NotFound));

        registry.set_provider_enabled("a", true).await.unwrap();
        assert_eq!(registry.get_enabled_tools().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_call_is_not_found_before_parsing() {
        let registry = registry_with(StubProvider::new("memory").with_tool(search_tool("memory"))).await;

        let unknown = registry
            .execute_tool_call(&ToolCall::new("c1", "does_not_exist", "not json"))
            .await;
        assert_eq!(unknown.error_kind, Some(ErrorKind::NotFound));
        assert_eq!(unknown.tool_call_id.as_deref(), Some("c1"));

        let malformed = registry
            .execute_tool_call(&ToolCall::new("c2", "search_memories", "not json"))
            .await;
        assert_eq!(malformed.error_kind, Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn test_dispose_clears_everything() {
        let registry = registry_with(StubProvider::new("a").with_tool(simple_tool("a", "ping"))).await;
        registry.execute_tool("ping", &ToolArgs::new(), None).await;

        registry.dispose().await;
        assert!(registry.providers().await.is_empty());
        assert!(registry.get_all_tools().await.is_empty());
        assert!(registry.get_execution_history(None).await.is_empty());
    }
}
