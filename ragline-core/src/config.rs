//! Configuration system for ragline.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit config file -> environment -> CLI overrides. The user-level file
//! lives at `~/.config/ragline/config.toml`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embeddings::EmbeddingConfig;
use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaglineConfig {
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Engine settings: retrieval depth, caching, deadlines and context budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    /// Collection used when the caller does not name one.
    #[serde(default = "default_collection")]
    pub default_collection: String,
    /// Number of passages retrieved per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum number of collection pipelines kept alive.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Deadline for one retrieval call, in seconds.
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_timeout_secs: u64,
    /// Deadline for one full generation stream, in seconds.
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
    /// Upper bound on the formatted context, in characters. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_chars: Option<usize>,
    /// Capacity of the internal provider-to-generator channel.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

fn default_collection() -> String {
    "docs".to_string()
}

fn default_top_k() -> usize {
    4
}

fn default_cache_capacity() -> usize {
    8
}

fn default_retrieval_timeout() -> u64 {
    30
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_stream_buffer() -> usize {
    64
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            default_collection: default_collection(),
            top_k: default_top_k(),
            cache_capacity: default_cache_capacity(),
            retrieval_timeout_secs: default_retrieval_timeout(),
            generation_timeout_secs: default_generation_timeout(),
            max_context_chars: None,
            stream_buffer: default_stream_buffer(),
        }
    }
}

/// Configuration for the language model provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai", "openai-compatible", "ollama" or "vllm".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o-mini").
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable name containing the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: None,
            max_tokens: None,
            temperature: default_temperature(),
        }
    }
}

/// Configuration for the Chroma vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Base URL of the Chroma server.
    #[serde(default = "default_index_url")]
    pub url: String,
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// Environment variable holding a Chroma Cloud token, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn default_index_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_tenant() -> String {
    "default_tenant".to_string()
}

fn default_database() -> String {
    "default_database".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            tenant: default_tenant(),
            database: default_database(),
            api_key_env: None,
        }
    }
}

/// Command-line overrides applied on top of every other layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub default_collection: Option<String>,
    pub top_k: Option<usize>,
}

impl RaglineConfig {
    /// Check values that deserialize fine but cannot drive the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;
        if rag.default_collection.trim().is_empty() {
            return Err(invalid("rag.default_collection must not be empty"));
        }
        if rag.top_k == 0 {
            return Err(invalid("rag.top_k must be at least 1"));
        }
        if rag.cache_capacity == 0 {
            return Err(invalid("rag.cache_capacity must be at least 1"));
        }
        if rag.retrieval_timeout_secs == 0 || rag.generation_timeout_secs == 0 {
            return Err(invalid("rag timeouts must be greater than zero"));
        }
        if rag.stream_buffer == 0 {
            return Err(invalid("rag.stream_buffer must be at least 1"));
        }
        if rag.max_context_chars == Some(0) {
            return Err(invalid("rag.max_context_chars must be greater than zero"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid("llm.temperature must be within 0.0..=2.0"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}

/// Path of the user-level configuration file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "ragline", "ragline")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration with layered sources and validate the result.
pub fn load_config(
    config_file: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<RaglineConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(RaglineConfig::default()));

    // User-level config
    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    // Explicit config file must exist when named
    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (RAGLINE_LLM__MODEL, RAGLINE_RAG__TOP_K, etc.)
    figment = figment.merge(Env::prefixed("RAGLINE_").split("__"));

    if let Some(overrides) = overrides {
        if let Some(model) = &overrides.model {
            figment = figment.merge(Serialized::default("llm.model", model));
        }
        if let Some(collection) = &overrides.default_collection {
            figment = figment.merge(Serialized::default("rag.default_collection", collection));
        }
        if let Some(top_k) = overrides.top_k {
            figment = figment.merge(Serialized::default("rag.top_k", top_k));
        }
    }

    let config: RaglineConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
