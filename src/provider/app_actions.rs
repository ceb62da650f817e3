//! Third-party app actions proxied from a remote action service.
//!
//! Action descriptors are fetched when the provider is initialized. If the
//! service cannot be reached a small fixed tool set is exposed instead, so the
//! assistant still has something to tell the user.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::session::{Identity, IdentityProvider};
use crate::tool::{
    ModelToolSchema, ParameterSchema, ProviderInfo, Tool, ToolArgs, ToolError, ToolOutput,
    ToolProvider,
};

pub const PROVIDER_ID: &str = "apps";

/// Action descriptor as published by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: Value,
    #[serde(default, alias = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// The connected app the action belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
}

/// The remote service that lists and runs app actions.
#[async_trait]
pub trait ActionService: Send + Sync {
    async fn list_actions(&self, identity: Option<&Identity>) -> Result<Vec<RemoteAction>, ToolError>;

    async fn execute_action(
        &self,
        name: &str,
        args: &ToolArgs,
        identity: Option<&Identity>,
    ) -> Result<Value, ToolError>;
}

/// Response from the `tools/list` method.
#[derive(Debug, Clone, Deserialize)]
struct ActionsListResponse {
    #[serde(default, alias = "tools")]
    actions: Vec<RemoteAction>,
}

/// [`ActionService`] speaking JSON-RPC over HTTP (`POST {base_url}/rpc`).
#[derive(Debug)]
pub struct HttpActionService {
    client: reqwest::Client,
    base_url: String,
    message_id: AtomicU64,
}

impl HttpActionService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Initialization(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            message_id: AtomicU64::new(1),
        })
    }

    /// Creates a JSON-RPC request.
    fn create_json_rpc_request(&self, method: &str, params: Value) -> Value {
        let id = self.message_id.fetch_add(1, Ordering::SeqCst);
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        })
    }

    /// Calls a JSON-RPC method and returns the result.
    async fn call_json_rpc_method<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        identity: Option<&Identity>,
    ) -> Result<T, ToolError> {
        let request = self.create_json_rpc_request(method, params);
        let mut builder = self
            .client
            .post(format!("{}/rpc", self.base_url))
            .json(&request);
        if let Some(identity) = identity {
            builder = builder.header("x-user-id", &identity.user_id);
            if let Some(workspace) = &identity.workspace_id {
                builder = builder.header("x-workspace-id", workspace);
            }
            if let Some(key) = &identity.api_key {
                builder = builder.header("X-API-Key", key);
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("action service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::Execution(format!(
                "action service returned {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let response_value: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Execution(format!("invalid action service response: {}", e)))?;

        // Check for JSON-RPC error
        if let Some(error) = response_value.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ToolError::Execution(message));
        }

        let result = response_value
            .get("result")
            .cloned()
            .ok_or_else(|| ToolError::Execution("no result in action service response".to_string()))?;

        serde_json::from_value(result)
            .map_err(|e| ToolError::Execution(format!("invalid action service result: {}", e)))
    }
}

#[async_trait]
impl ActionService for HttpActionService {
    async fn list_actions(&self, identity: Option<&Identity>) -> Result<Vec<RemoteAction>, ToolError> {
        let response: ActionsListResponse = self
            .call_json_rpc_method("tools/list", json!({}), identity)
            .await?;
        Ok(response.actions)
    }

    async fn execute_action(
        &self,
        name: &str,
        args: &ToolArgs,
        identity: Option<&Identity>,
    ) -> Result<Value, ToolError> {
        self.call_json_rpc_method(
            "tools/call",
            json!({ "name": name, "arguments": args }),
            identity,
        )
        .await
    }
}

#[derive(Debug, Default)]
struct ActionCatalog {
    tools: Vec<Tool>,
    remote: bool,
    last_error: Option<String>,
}

/// Provider exposing actions of the user's connected apps.
pub struct AppActionsProvider {
    info: ProviderInfo,
    service: Arc<dyn ActionService>,
    identity: Arc<dyn IdentityProvider>,
    catalog: RwLock<ActionCatalog>,
}

impl AppActionsProvider {
    pub fn new(service: Arc<dyn ActionService>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            info: ProviderInfo::new(
                PROVIDER_ID,
                "Connected apps",
                "Run actions in the user's connected third-party apps",
                env!("CARGO_PKG_VERSION"),
            ),
            service,
            identity,
            catalog: RwLock::new(ActionCatalog {
                tools: fallback_tools(),
                remote: false,
                last_error: None,
            }),
        }
    }

    /// Whether the tool set came from the service rather than the fallback.
    pub fn is_remote(&self) -> bool {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .remote
    }

    fn remote_tool(&self, action: RemoteAction) -> Result<Tool, ToolError> {
        let parameters = if action.input_schema.is_null() {
            ParameterSchema::new()
        } else {
            ParameterSchema::from_json_schema(&action.input_schema)?
        };
        let description = if action.description.trim().is_empty() {
            format!("Run the {} action", action.name)
        } else {
            action.description
        };

        let mut tool = Tool::new(
            format!("{}.{}", PROVIDER_ID, action.name),
            action.name,
            description,
            PROVIDER_ID,
        )
        .with_parameters(parameters);
        tool.output_schema = action.output_schema;
        if let Some(app) = action.app {
            tool.metadata.insert("app".to_string(), Value::String(app));
        }
        crate::tool::validate_tool(&tool)?;
        Ok(tool)
    }

    fn execute_fallback(&self, name: &str) -> Result<ToolOutput, ToolError> {
        let last_error = self
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_error
            .clone();
        match name {
            "list_connected_apps" => Ok(ToolOutput::ok(json!({
                "apps": [],
                "available": false,
                "message": "Connected apps are unavailable right now. Try again later.",
            }))),
            "app_actions_status" => Ok(ToolOutput::ok(json!({
                "available": false,
                "error": last_error,
            }))),
            other => Err(ToolError::ToolNotFound(other.to_string())),
        }
    }
}

#[async_trait]
impl ToolProvider for AppActionsProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    async fn initialize(&self) -> Result<(), ToolError> {
        let identity = self.identity.current_identity();
        let catalog = match self.service.list_actions(identity.as_ref()).await {
            Ok(actions) => {
                let mut tools = Vec::with_capacity(actions.len());
                let mut seen = HashSet::new();
                for action in actions {
                    let name = action.name.clone();
                    if !seen.insert(name.clone()) {
                        warn!(action = %name, "Skipping duplicate app action");
                        continue;
                    }
                    match self.remote_tool(action) {
                        Ok(tool) => tools.push(tool),
                        Err(error) => warn!(action = %name, error = %error, "Skipping malformed app action"),
                    }
                }
                info!(count = tools.len(), apps = ?actions_by_app(&tools), "Loaded app actions");
                ActionCatalog {
                    tools,
                    remote: true,
                    last_error: None,
                }
            }
            Err(error) => {
                warn!(error = %error, "Action service unreachable, using fallback tools");
                ActionCatalog {
                    tools: fallback_tools(),
                    remote: false,
                    last_error: Some(error.to_string()),
                }
            }
        };

        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = catalog;
        Ok(())
    }

    fn tool_definitions(&self) -> Vec<Tool> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tools
            .clone()
    }

    async fn execute(&self, name: &str, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let (known, remote) = {
            let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
            (catalog.tools.iter().any(|t| t.name == name), catalog.remote)
        };
        if !known {
            return Err(ToolError::ToolNotFound(name.to_string()));
        }
        if !remote {
            return self.execute_fallback(name);
        }

        let identity = self.identity.current_identity();
        debug!(action = %name, "Proxying app action");
        match self.service.execute_action(name, args, identity.as_ref()).await {
            Ok(value) => Ok(ToolOutput::ok(value)),
            Err(error) => Ok(ToolOutput::failure(error)),
        }
    }

    fn schemas(&self) -> Option<BTreeMap<String, ModelToolSchema>> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        Some(
            catalog
                .tools
                .iter()
                .map(|tool| (tool.name.clone(), ModelToolSchema::from_tool(tool)))
                .collect(),
        )
    }
}

fn fallback_tools() -> Vec<Tool> {
    let mut tools = vec![
        Tool::new(
            format!("{}.list_connected_apps", PROVIDER_ID),
            "list_connected_apps",
            "List the third-party apps the user has connected",
            PROVIDER_ID,
        ),
        Tool::new(
            format!("{}.app_actions_status", PROVIDER_ID),
            "app_actions_status",
            "Report whether connected app actions are currently available",
            PROVIDER_ID,
        ),
    ];
    for tool in &mut tools {
        tool.metadata.insert("fallback".to_string(), Value::Bool(true));
    }
    tools
}

/// Counts actions by the app they belong to.
pub fn actions_by_app(tools: &[Tool]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for tool in tools {
        let app = tool
            .metadata
            .get("app")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        *counts.entry(app).or_insert(0) += 1;
    }
    counts
}
