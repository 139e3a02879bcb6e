//! Configuration loading, validation, and management for docchat.
//!
//! Loads configuration from `~/.docchat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.docchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key shared by providers that do not set their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Generative model settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking, retrieval and context assembly settings
    #[serde(default)]
    pub rag: RagConfig,

    /// Chat history persistence
    #[serde(default)]
    pub history: HistoryConfig,

    /// Per-provider endpoint and credential overrides
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("generation", &self.generation)
            .field("embedding", &self.embedding)
            .field("rag", &self.rag)
            .field("history", &self.history)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Provider name: "openai", "openrouter", "ollama", "none", or a key of `providers`
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-provider timeout inside the fallback chain
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Providers tried in order after `provider` fails
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<String>,
}

fn default_generation_provider() -> String {
    "openai".into()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            fallbacks: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "hashing" (offline), "openai", "ollama", "none", or a key of `providers`
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector length for the hashing embedder
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_embedding_provider() -> String {
    "hashing".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
        }
    }
}

/// Retrieval pipeline knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Upper bound on chunk length, in characters
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Characters carried from the end of one chunk into the next
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_max_conversation_turns")]
    pub max_conversation_turns: usize,

    /// Below this many characters the fallback excerpts are appended
    #[serde(default = "default_min_context_length")]
    pub min_context_length: usize,

    /// Characters taken from the start of each document for fallback context
    #[serde(default = "default_fallback_excerpt_chars")]
    pub fallback_excerpt_chars: usize,
}

fn default_max_chunk_size() -> usize {
    500
}
fn default_overlap_size() -> usize {
    50
}
fn default_top_k() -> usize {
    3
}
fn default_max_conversation_turns() -> usize {
    5
}
fn default_min_context_length() -> usize {
    500
}
fn default_fallback_excerpt_chars() -> usize {
    2000
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            overlap_size: default_overlap_size(),
            top_k: default_top_k(),
            max_conversation_turns: default_max_conversation_turns(),
            min_context_length: default_min_context_length(),
            fallback_excerpt_chars: default_fallback_excerpt_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Override for the JSONL file (default: `~/.docchat/history.jsonl`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.docchat/config.toml).
    ///
    /// Also checks environment variables:
    /// - `DOCCHAT_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `DOCCHAT_MODEL` overrides the generation model
    /// - `DOCCHAT_EMBEDDING_PROVIDER` overrides the embedding provider
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("DOCCHAT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("DOCCHAT_MODEL") {
            config.generation.model = model;
        }

        if let Ok(provider) = std::env::var("DOCCHAT_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".docchat")
    }

    /// Resolved chat history file.
    pub fn history_path(&self) -> PathBuf {
        self.history
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("history.jsonl"))
    }

    /// API key for a named provider: its own key first, then the shared one.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Endpoint override for a named provider.
    pub fn api_url_for(&self, provider: &str) -> Option<String> {
        self.providers.get(provider).and_then(|p| p.api_url.clone())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.temperature < 0.0 || self.generation.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.rag.max_chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "rag.max_chunk_size must be > 0".into(),
            ));
        }

        if self.rag.overlap_size >= self.rag.max_chunk_size {
            return Err(ConfigError::ValidationError(
                "rag.overlap_size must be smaller than rag.max_chunk_size".into(),
            ));
        }

        if self.rag.top_k == 0 {
            return Err(ConfigError::ValidationError("rag.top_k must be > 0".into()));
        }

        if self.embedding.provider == "hashing" && self.embedding.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimensions must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            generation: GenerationConfig::default(),
            embedding: EmbeddingConfig::default(),
            rag: RagConfig::default(),
            history: HistoryConfig::default(),
            providers: HashMap::new(),
        }
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
}
