//! Configuration loading, validation, and management for hybridrag.
//!
//! Loads configuration from `~/.hybridrag/config.toml` (or `HYBRIDRAG_CONFIG`)
//! with environment variable overrides. Validates all settings at startup.

use hybridrag_core::search::{GlobalContextOptions, LocalContextOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.hybridrag/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language-model and embedding endpoint
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Graph store (documents, chunks, entities, communities)
    #[serde(default)]
    pub graph: GraphConfig,

    /// Relational store (structured tables)
    #[serde(default)]
    pub relational: RelationalConfig,

    /// Reasoning loop
    #[serde(default)]
    pub agent: AgentSettings,

    /// Community report packing
    #[serde(default)]
    pub global_search: GlobalContextOptions,

    /// Chunk packing
    #[serde(default)]
    pub local_search: LocalContextOptions,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,

    #[serde(default = "default_reasoning_effort")]
    pub reasoning_effort: String,

    #[serde(default = "default_judge_model")]
    pub judge_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Turn packed search context into a prose answer with one extra completion
    #[serde(default = "default_true")]
    pub synthesize_answers: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_reasoning_model() -> String {
    "o4-mini".into()
}
fn default_reasoning_effort() -> String {
    "medium".into()
}
fn default_judge_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            reasoning_model: default_reasoning_model(),
            reasoning_effort: default_reasoning_effort(),
            judge_model: default_judge_model(),
            embedding_model: default_embedding_model(),
            synthesize_answers: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("reasoning_model", &self.reasoning_model)
            .field("reasoning_effort", &self.reasoning_effort)
            .field("judge_model", &self.judge_model)
            .field("embedding_model", &self.embedding_model)
            .field("synthesize_answers", &self.synthesize_answers)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Neo4j reached over its HTTP transactional endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Base HTTP URL, e.g. `http://localhost:7474`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_graph_database")]
    pub database: String,
}

fn default_graph_database() -> String {
    "neo4j".into()
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: None,
            username: None,
            password: None,
            database: default_graph_database(),
        }
    }
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RelationalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_pg_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_pg_port() -> u16 {
    5432
}
fn default_min_connections() -> u32 {
    1
}
fn default_max_connections() -> u32 {
    10
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_pg_port(),
            database: None,
            user: None,
            password: None,
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
        }
    }
}

impl std::fmt::Debug for RelationalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// History entries longer than this are cut and suffixed
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,

    /// Directory of `*.json` tool definitions; the built-in set when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_dir: Option<PathBuf>,

    /// Replaces the built-in reasoning prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_path: Option<PathBuf>,
}

fn default_max_iterations() -> usize {
    10
}
fn default_truncate_chars() -> usize {
    2000
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            truncate_chars: default_truncate_chars(),
            tools_dir: None,
            system_prompt_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from `HYBRIDRAG_CONFIG` or the default path
    /// (~/.hybridrag/config.toml), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("HYBRIDRAG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Overlay values from the environment. Set variables win over the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = Some(value);
            }
        };

        set(&mut self.provider.api_key, "OPENAI_API_KEY");
        if let Some(url) = lookup("HYBRIDRAG_API_URL") {
            self.provider.api_url = url;
        }

        set(&mut self.graph.uri, "NEO4J_URI");
        set(&mut self.graph.username, "NEO4J_USERNAME");
        set(&mut self.graph.password, "NEO4J_PASSWORD");
        if let Some(db) = lookup("NEO4J_DATABASE") {
            self.graph.database = db;
        }

        set(&mut self.relational.host, "POSTGRES_HOST");
        set(&mut self.relational.database, "POSTGRES_DATABASE");
        set(&mut self.relational.user, "POSTGRES_USER");
        set(&mut self.relational.password, "POSTGRES_PASSWORD");
        if let Some(port) = lookup("POSTGRES_PORT") {
            match port.parse() {
                Ok(p) => self.relational.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring unparsable POSTGRES_PORT"),
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".hybridrag")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.truncate_chars == 0 {
            return Err(ConfigError::ValidationError(
                "agent.truncate_chars must be at least 1".into(),
            ));
        }

        if self.global_search.max_context_tokens == 0 || self.local_search.max_context_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_context_tokens must be greater than 0".into(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.local_search.min_relevance) {
            return Err(ConfigError::ValidationError(
                "local_search.min_relevance must be between -1.0 and 1.0".into(),
            ));
        }

        if self.relational.max_connections == 0
            || self.relational.min_connections > self.relational.max_connections
        {
            return Err(ConfigError::ValidationError(
                "relational pool needs 0 < min_connections <= max_connections".into(),
            ));
        }

        Ok(())
    }

    /// Report every mandatory secret that is still unset.
    pub fn require_secrets(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        let checks = [
            ("OPENAI_API_KEY", &self.provider.api_key),
            ("NEO4J_URI", &self.graph.uri),
            ("NEO4J_USERNAME", &self.graph.username),
            ("NEO4J_PASSWORD", &self.graph.password),
            ("POSTGRES_HOST", &self.relational.host),
            ("POSTGRES_DATABASE", &self.relational.database),
            ("POSTGRES_USER", &self.relational.user),
        ];
        for (name, value) in checks {
            if value.as_deref().is_none_or(str::is_empty) {
                missing.push(name);
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingSecret(missing.join(", ")))
        }
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl RelationalConfig {
    /// `postgres://` URL assembled from the individual settings.
    pub fn connection_url(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        let database = self.database.as_deref()?;
        let user = self.user.as_deref()?;
        let auth = match self.password.as_deref() {
            Some(pw) if !pw.is_empty() => format!("{user}:{pw}"),
            _ => user.to_string(),
        };
        Some(format!("postgres://{auth}@{host}:{}/{database}", self.port))
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required secrets: {0}")]
    MissingSecret(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.reasoning_model, "o4-mini");
        assert_eq!(config.provider.judge_model, "gpt-4o-mini");
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.agent.truncate_chars, 2000);
        assert_eq!(config.relational.max_connections, 10);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.reasoning_model, config.provider.reasoning_model);
        assert_eq!(
            parsed.global_search.community_weight_name,
            config.global_search.community_weight_name
        );
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut config = AppConfig::default();
        config.local_search.min_relevance = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        let config = result.unwrap();
        assert_eq!(config.graph.database, "neo4j");
    }

    #[test]
    fn load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_iterations = 3\n\n[global_search]\nmax_context_tokens = 1200\nsingle_batch = true\n",
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.agent.truncate_chars, 2000);
        assert_eq!(config.global_search.max_context_tokens, 1200);
        assert!(config.global_search.single_batch);
    }

    #[test]
    fn invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\nmax_iterations = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("NEO4J_URI", "http://graph:7474"),
            ("POSTGRES_PORT", "6543"),
            ("POSTGRES_HOST", "db"),
        ]));
        assert!(config.has_api_key());
        assert_eq!(config.graph.uri.as_deref(), Some("http://graph:7474"));
        assert_eq!(config.relational.port, 6543);
        assert_eq!(config.relational.host.as_deref(), Some("db"));
    }

    #[test]
    fn bad_port_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[("POSTGRES_PORT", "not-a-port")]));
        assert_eq!(config.relational.port, 5432);
    }

    #[test]
    fn require_secrets_lists_missing() {
        let config = AppConfig::default();
        let err = config.require_secrets().unwrap_err().to_string();
        assert!(err.contains("OPENAI_API_KEY"));
        assert!(err.contains("NEO4J_URI"));
        assert!(err.contains("POSTGRES_USER"));

        let mut full = AppConfig::default();
        full.apply_env_overrides(env(&[
            ("OPENAI_API_KEY", "sk"),
            ("NEO4J_URI", "http://g:7474"),
            ("NEO4J_USERNAME", "neo4j"),
            ("NEO4J_PASSWORD", "pw"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_DATABASE", "analytics"),
            ("POSTGRES_USER", "reader"),
        ]));
        assert!(full.require_secrets().is_ok());
    }

    #[test]
    fn connection_url_assembled() {
        let relational = RelationalConfig {
            host: Some("db".into()),
            database: Some("analytics".into()),
            user: Some("reader".into()),
            password: Some("pw".into()),
            ..RelationalConfig::default()
        };
        assert_eq!(
            relational.connection_url().as_deref(),
            Some("postgres://reader:pw@db:5432/analytics")
        );
        assert!(RelationalConfig::default().connection_url().is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        config.graph.password = Some("hunter2".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("o4-mini"));
        assert!(toml_str.contains("occurrence weight"));
    }
}
