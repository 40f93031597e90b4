//! Configuration for the memory subsystem
//!
//! Loaded from TOML with per-section defaults, so an empty file (or no
//! file at all) yields a working configuration.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{MemoriaError, Result};
use crate::policy::MemoryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Durable storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// External embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Policy cache tuning and seeded tenant policies
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Retention sweep scheduling
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Search defaults
    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration from an explicit path, or from the default
    /// locations (`~/.memoria/config.toml`, the XDG config dir,
    /// `./config.toml`), falling back to defaults when nothing exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(&path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".memoria").join("config.toml")),
            dirs::config_dir().map(|c| c.join("memoria").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for candidate in default_paths.iter().flatten() {
            if candidate.exists() {
                tracing::info!("Loading config from: {}", candidate.display());
                return Self::from_file(candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoriaError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| MemoriaError::Config(format!("Failed to parse config: {e}")))
    }
}

/// Durable storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all durable data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".memoria"))
        .unwrap_or_else(|| PathBuf::from(".memoria"))
}

/// External embedding provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Full URL of the embeddings endpoint
    #[serde(default = "default_embedding_url")]
    pub api_url: String,
    /// Model identifier passed to the provider
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Environment variable holding the API key; no auth header when unset
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Embedding dimensionality, fixed per deployment
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: default_embedding_url(),
            model: default_embedding_model(),
            api_key_env: None,
            timeout_secs: default_embedding_timeout_secs(),
            dimension: default_embedding_dimension(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:8080/v1/embeddings".to_string()
}

fn default_embedding_model() -> String {
    "e5-small-v2".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_embedding_dimension() -> usize {
    384
}

/// Policy cache tuning and seeded tenant policies
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Maximum tenants held in the policy cache
    #[serde(default = "default_policy_cache_capacity")]
    pub cache_capacity: usize,
    /// Seconds before a cached policy is re-read from the provider
    #[serde(default = "default_policy_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Tenant policies seeded at startup
    #[serde(default)]
    pub tenants: Vec<MemoryPolicy>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_policy_cache_capacity(),
            cache_ttl_secs: default_policy_cache_ttl_secs(),
            tenants: Vec::new(),
        }
    }
}

fn default_policy_cache_capacity() -> usize {
    1024
}

fn default_policy_cache_ttl_secs() -> u64 {
    5
}

/// Retention sweep scheduling
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Seconds between sweep passes
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

/// Search defaults applied when a request leaves them unset
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Default result limit
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
    /// Default minimum similarity
    #[serde(default = "default_min_similarity")]
    pub default_min_similarity: f32,
    /// Multiplier sizing the ANN candidate pool before exact re-ranking
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            default_min_similarity: default_min_similarity(),
            candidate_multiplier: default_candidate_multiplier(),
        }
    }
}

fn default_search_limit() -> usize {
    10
}

fn default_min_similarity() -> f32 {
    0.0
}

fn default_candidate_multiplier() -> usize {
    4
}
