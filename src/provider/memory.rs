//! Memory search tools.
//!
//! Queries go to the semantic index first. When it errors or finds nothing,
//! the provider quietly answers from a local exact/substring scan instead.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::Error;
use crate::tool::{
    ModelToolSchema, ParameterSchema, ProviderInfo, Tool, ToolArgs, ToolError, ToolOutput,
    ToolProvider,
};

pub const PROVIDER_ID: &str = "memory";

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 50;

/// A piece of content the user saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A match reported by the semantic index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// The semantic search backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError>;
}

/// Local record lookup.
pub trait MemoryStore: Send + Sync {
    fn get(&self, id: &str) -> Option<MemoryRecord>;
    fn records(&self) -> Vec<MemoryRecord>;
}

/// A [`MemoryStore`] held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Vec<MemoryRecord>,
}

impl InMemoryStore {
    pub fn new(records: Vec<MemoryRecord>) -> Self {
        Self { records }
    }

    /// Loads records from a JSON array file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let records: Vec<MemoryRecord> = serde_json::from_str(&raw)?;
        debug!(path = %path.as_ref().display(), count = records.len(), "Loaded memory records");
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MemoryStore for InMemoryStore {
    fn get(&self, id: &str) -> Option<MemoryRecord> {
        self.records.iter().find(|r| r.id == id).cloned()
    }

    fn records(&self) -> Vec<MemoryRecord> {
        self.records.clone()
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchMemoriesArgs {
    /// Text to search for in saved memories
    query: String,
    /// Maximum number of results to return (default 5)
    limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GetMemoryArgs {
    /// Identifier of the memory to fetch
    id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum SearchSource {
    Semantic,
    Local,
}

/// Provider for tools that search the user's saved memories.
pub struct MemoryProvider {
    info: ProviderInfo,
    semantic: Option<Arc<dyn SemanticSearch>>,
    store: Arc<dyn MemoryStore>,
    tools: Vec<Tool>,
}

impl MemoryProvider {
    /// Creates a provider. Without a semantic backend every query is local.
    pub fn new(
        semantic: Option<Arc<dyn SemanticSearch>>,
        store: Arc<dyn MemoryStore>,
    ) -> Result<Self, ToolError> {
        let tools = vec![
            Tool::new(
                format!("{}.search_memories", PROVIDER_ID),
                "search_memories",
                "Search the user's saved memories and captured pages",
                PROVIDER_ID,
            )
            .with_parameters(ParameterSchema::for_type::<SearchMemoriesArgs>()?),
            Tool::new(
                format!("{}.get_memory", PROVIDER_ID),
                "get_memory",
                "Fetch a saved memory by id",
                PROVIDER_ID,
            )
            .with_parameters(ParameterSchema::for_type::<GetMemoryArgs>()?),
        ];

        Ok(Self {
            info: ProviderInfo::new(
                PROVIDER_ID,
                "Memories",
                "Search content the user has saved",
                env!("CARGO_PKG_VERSION"),
            ),
            semantic,
            store,
            tools,
        })
    }

    async fn search(&self, args: SearchMemoriesArgs) -> ToolOutput {
        let limit = args
            .limit
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);
        let query = args.query.trim();

        let semantic = match &self.semantic {
            Some(backend) => match backend.search(query, limit).await {
                Ok(hits) => self.resolve_hits(hits, limit),
                Err(error) => {
                    warn!(error = %error, "Semantic search failed, using local search");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let (source, results) = if semantic.is_empty() {
            debug!(query = %query, "Answering from local search");
            (SearchSource::Local, local_search(&self.store.records(), query, limit))
        } else {
            (SearchSource::Semantic, semantic)
        };

        let mut payload = json!({
            "query": query,
            "source": source,
            "count": results.len(),
            "results": results
                .iter()
                .map(|(record, score)| json!({ "score": score, "memory": record }))
                .collect::<Vec<_>>(),
        });
        if results.is_empty() {
            payload["message"] = Value::String("No memories matched the query".to_string());
        }
        ToolOutput::ok(payload)
    }

    fn resolve_hits(&self, mut hits: Vec<SearchHit>, limit: usize) -> Vec<(MemoryRecord, f32)> {
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.into_iter()
            .filter_map(|hit| self.store.get(&hit.id).map(|record| (record, hit.score)))
            .take(limit)
            .collect()
    }
}

/// Exact title matches first, then title substrings, then content or tag
/// substrings. Case-insensitive; ties keep store order.
fn local_search(records: &[MemoryRecord], query: &str, limit: usize) -> Vec<(MemoryRecord, f32)> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(MemoryRecord, f32)> = records
        .iter()
        .filter_map(|record| {
            let title = record.title.to_lowercase();
            let score = if title == needle {
                1.0
            } else if title.contains(&needle) {
                0.8
            } else if record.content.to_lowercase().contains(&needle)
                || record.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            {
                0.5
            } else {
                return None;
            };
            Some((record.clone(), score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(limit);
    scored
}

fn parse<T: serde::de::DeserializeOwned>(args: &ToolArgs) -> Result<T, ToolOutput> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| ToolOutput::failure(ToolError::Validation(format!("invalid arguments: {}", e))))
}

#[async_trait]
impl ToolProvider for MemoryProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    fn tool_definitions(&self) -> Vec<Tool> {
        self.tools.clone()
    }

    async fn execute(&self, name: &str, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let output = match name {
            "search_memories" => match parse::<SearchMemoriesArgs>(args) {
                Ok(args) => self.search(args).await,
                Err(output) => output,
            },
            "get_memory" => match parse::<GetMemoryArgs>(args) {
                Ok(args) => match self.store.get(&args.id) {
                    Some(record) => ToolOutput::ok(json!({ "memory": record })),
                    None => ToolOutput::error(format!("memory {} not found", args.id)),
                },
                Err(output) => output,
            },
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::test_support::args;
    use std::io::Write;

    fn record(id: &str, title: &str, content: &str) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            url: None,
            tags: Vec::new(),
            created_at: None,
        }
    }

    fn store() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::new(vec![
            record("m1", "Notes on compilers", "Parsing and AI-assisted codegen"),
            record("m2", "AI", "Exact title match"),
            record("m3", "Gardening", "Tomatoes need sun"),
            record("m4", "AI safety reading list", "Papers"),
        ]))
    }

    fn ids(output: &ToolOutput) -> Vec<String> {
        output.data["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["memory"]["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_semantic_results_are_preferred() {
        let mut semantic = MockSemanticSearch::new();
        semantic
            .expect_search()
            .withf(|query, limit| query.to_string() == "ai" && *limit == 5)
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    SearchHit { id: "m3".to_string(), score: 0.4 },
                    SearchHit { id: "m1".to_string(), score: 0.9 },
                    SearchHit { id: "gone".to_string(), score: 0.95 },
                ])
            });
        let provider = MemoryProvider::new(Some(Arc::new(semantic)), store()).unwrap();

        let output = provider
            .execute("search_memories", &args(json!({"query": "ai"})))
            .await
            .unwrap();

        assert_eq!(output.data["source"], "semantic");
        assert_eq!(ids(&output), vec!["m1", "m3"]);
    }

    #[tokio::test]
    async fn test_semantic_error_degrades_to_local() {
        let mut semantic = MockSemanticSearch::new();
        semantic
            .expect_search()
            .returning(|_, _| Err(ToolError::Execution("index offline".to_string())));
        let provider = MemoryProvider::new(Some(Arc::new(semantic)), store()).unwrap();

        let output = provider
            .execute("search_memories", &args(json!({"query": "AI"})))
            .await
            .unwrap();

        assert!(output.error.is_none());
        assert_eq!(output.data["source"], "local");
        assert_eq!(ids(&output), vec!["m2", "m4", "m1"]);
    }

    #[tokio::test]
    async fn test_empty_semantic_results_degrade_to_local() {
        let mut semantic = MockSemanticSearch::new();
        semantic.expect_search().returning(|_, _| Ok(Vec::new()));
        let provider = MemoryProvider::new(Some(Arc::new(semantic)), store()).unwrap();

        let output = provider
            .execute("search_memories", &args(json!({"query": "tomatoes", "limit": 1})))
            .await
            .unwrap();

        assert_eq!(output.data["source"], "local");
        assert_eq!(ids(&output), vec!["m3"]);
    }

    #[tokio::test]
    async fn test_no_match_is_still_a_success() {
        let provider = MemoryProvider::new(None, store()).unwrap();
        let output = provider
            .execute("search_memories", &args(json!({"query": "quantum"})))
            .await
            .unwrap();

        assert!(output.error.is_none());
        assert_eq!(output.data["count"], 0);
        assert!(output.data["message"].is_string());
    }

    #[tokio::test]
    async fn test_get_memory() {
        let provider = MemoryProvider::new(None, store()).unwrap();

        let found = provider.execute("get_memory", &args(json!({"id": "m2"}))).await.unwrap();
        assert_eq!(found.data["memory"]["title"], "AI");

        let missing = provider.execute("get_memory", &args(json!({"id": "zz"}))).await.unwrap();
        assert_eq!(missing.error, Some(ToolError::Execution("memory zz not found".to_string())));
    }

    #[test]
    fn test_tool_schemas_come_from_argument_types() {
        let provider = MemoryProvider::new(None, store()).unwrap();
        let tools = provider.tool_definitions();
        let search = tools.iter().find(|t| t.name == "search_memories").unwrap();

        assert_eq!(search.parameters.required, vec!["query".to_string()]);
        assert!(search.parameters.properties.contains_key("limit"));
        assert!(tools.iter().all(|t| crate::tool::validate_tool(t).is_ok()));
    }

    #[test]
    fn test_store_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "a", "title": "Rust", "content": "ownership", "tags": ["lang"]}}]"#
        )
        .unwrap();

        let store = InMemoryStore::from_json_file(file.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().tags, vec!["lang".to_string()]);
    }
}
