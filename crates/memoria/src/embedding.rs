//! External embedding provider client
//!
//! Embedding generation is delegated to an external service; this module
//! defines the provider trait and the HTTP client implementation for
//! OpenAI-compatible `/embeddings` endpoints. Every transport or shape
//! failure maps to `EmbeddingUnavailable` so ingestion can abort without
//! persisting anything.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::error::{MemoriaError, Result};

/// Trait for embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a piece of text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The vector dimensionality this provider produces.
    fn dimension(&self) -> usize;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Embedding client for OpenAI-compatible HTTP APIs
#[derive(Debug)]
pub struct RemoteEmbedder {
    client: Client,
    config: EmbeddingConfig,
    api_key: Option<String>,
}

/// OpenAI-compatible embeddings request
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// OpenAI-compatible embeddings response
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

/// Single embedding in the response
#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    /// Create a new embedding client.
    ///
    /// When `config.api_key_env` names an environment variable, its value
    /// is sent as a bearer token; the variable must be set in that case.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(env::var(var).map_err(|_| {
                MemoriaError::Config(format!("API key env var '{var}' not set"))
            })?),
            None => None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MemoriaError::EmbeddingUnavailable(e.to_string()))?;

        info!(
            "RemoteEmbedder initialized with model: {}, api_url: {}",
            config.model, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingsRequest {
            model: &self.config.model,
            input: text,
        };

        let mut builder = self.client.post(&self.config.api_url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            MemoriaError::EmbeddingUnavailable(format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoriaError::EmbeddingUnavailable(format!(
                "provider returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            MemoriaError::EmbeddingUnavailable(format!("malformed response: {e}"))
        })?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                MemoriaError::EmbeddingUnavailable("response contained no embedding".to_string())
            })?;

        if embedding.len() != self.config.dimension {
            return Err(MemoriaError::EmbeddingUnavailable(format!(
                "expected {} dimensions, provider returned {}",
                self.config.dimension,
                embedding.len()
            )));
        }

        debug!("Embedded {} chars into {} dims", text.len(), embedding.len());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
