//! Runtime configuration.
//!
//! Values come from an optional JSON file, then environment variables, then
//! command-line flags (applied by the binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::TurnOptions;
use crate::session::Identity;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    pub system_prompt: String,
    pub max_rounds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub history_capacity: usize,
    pub request_timeout_secs: u64,
    /// JSON-RPC endpoint of the app action service; app actions are off when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_actions_url: Option<String>,
    /// JSON file of memory records for the local store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_records_path: Option<PathBuf>,
    pub memories_enabled: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            user_id: None,
            workspace_id: None,
            system_prompt: "You are a browser assistant. Use the available tools when they help answer the user.".to_string(),
            max_rounds: 5,
            temperature: None,
            max_tokens: 4096,
            history_capacity: crate::tool::DEFAULT_HISTORY_CAPACITY,
            request_timeout_secs: 60,
            app_actions_url: None,
            memory_records_path: None,
            memories_enabled: true,
        }
    }
}

impl AssistantConfig {
    /// Loads the config file if one is given, then applies the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Overrides fields from environment variables read through `lookup`.
    ///
    /// `ASSISTANT_API_KEY` takes precedence over `OPENAI_API_KEY`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = lookup("ASSISTANT_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(user_id) = lookup("ASSISTANT_USER_ID") {
            self.user_id = Some(user_id);
        }
        if let Some(base_url) = lookup("ASSISTANT_BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(model) = lookup("ASSISTANT_MODEL") {
            self.model = model;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL: {}",
                self.base_url
            )));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::Invalid(format!(
                    "temperature must be between 0.0 and 2.0: {}",
                    temperature
                )));
            }
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The identity requests are scoped to, when a user is configured.
    pub fn identity(&self) -> Option<Identity> {
        self.user_id.as_ref().map(|user_id| Identity {
            user_id: user_id.clone(),
            workspace_id: self.workspace_id.clone(),
            api_key: self.api_key.clone(),
        })
    }

    pub fn turn_options(&self) -> TurnOptions {
        TurnOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_rounds: self.max_rounds,
            max_tokens: self.max_tokens,
            system_prompt: self.system_prompt.clone(),
            cancel: None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AssistantConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.history_capacity, 100);
        assert!(config.identity().is_none());
        assert_ok!(config.validate());
    }

    #[test]
    fn test_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model": "from-file", "max_rounds": 3, "user_id": "file-user", "api_key": "file-key"}}"#
        )
        .unwrap();

        let config = AssistantConfig::from_file(file.path())
            .unwrap()
            .apply_env(env(&[
                ("OPENAI_API_KEY", "openai-key"),
                ("ASSISTANT_MODEL", "from-env"),
                ("ASSISTANT_USER_ID", ""),
            ]))
            .unwrap();

        assert_eq!(config.model, "from-env");
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.api_key.as_deref(), Some("openai-key"));
        // blank values do not override
        assert_eq!(config.user_id.as_deref(), Some("file-user"));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);

        let identity = config.identity().unwrap();
        assert_eq!(identity.user_id, "file-user");
        assert_eq!(identity.api_key.as_deref(), Some("openai-key"));
        assert_eq!(config.turn_options().max_rounds, 3);
    }

    #[test]
    fn test_assistant_key_wins() {
        let config = AssistantConfig::default()
            .apply_env(env(&[
                ("OPENAI_API_KEY", "openai-key"),
                ("ASSISTANT_API_KEY", "assistant-key"),
            ]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("assistant-key"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_url = AssistantConfig::default().apply_env(env(&[("ASSISTANT_BASE_URL", "ftp://x")]));
        assert!(matches!(bad_url, Err(ConfigError::Invalid(_))));

        let config = AssistantConfig {
            temperature: Some(3.5),
            ..Default::default()
        };
        assert_err!(config.validate());
    }

    #[test]
    fn test_unreadable_and_malformed_files() {
        let missing = AssistantConfig::from_file(Path::new("/definitely/not/here.json"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let malformed = AssistantConfig::from_file(file.path());
        assert!(matches!(malformed, Err(ConfigError::Parse { .. })));
    }
}
