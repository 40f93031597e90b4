//! Content ingestion: normalize, deduplicate, embed, store
//!
//! The Scribe is the write path into long-term memory. Identical content
//! (after normalization) is stored once per tenant; the duplicate path
//! performs no write and no embedding call. Short-term memory never goes
//! through here and is never deduplicated.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::coordinator::Coordinator;
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoriaError, Result};
use crate::librarian::{RecordFilter, StoreOutcome};
use crate::memory::request::{MemoryKind, MemoryResponse};
use crate::memory::types::SearchResult;

/// Collapse whitespace runs to single spaces and lowercase, so content
/// differing only in spacing or case deduplicates.
pub fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical digest of the normalized content: lowercase hex SHA-256.
pub fn content_fingerprint(content: &str) -> String {
    let normalized = normalize_content(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Ingestion pipeline over the coordinator and the external embedding
/// provider.
pub struct Scribe {
    coordinator: Arc<Coordinator>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Scribe {
    pub fn new(coordinator: Arc<Coordinator>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            coordinator,
            embedder,
        }
    }

    /// Ingest content into long-term memory.
    ///
    /// Returns a duplicate-skipped response (no write) when the tenant
    /// already holds the same normalized content. Embedding failure
    /// aborts the ingestion with `EmbeddingUnavailable` and persists
    /// nothing; policy and quota violations propagate from the
    /// coordinator unchanged.
    pub async fn ingest(
        &self,
        content: &str,
        tenant_id: &str,
        origin: &str,
        metadata: HashMap<String, String>,
    ) -> Result<MemoryResponse> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MemoriaError::InvalidRequest(
                "cannot ingest empty content".to_string(),
            ));
        }

        let content_hash = content_fingerprint(content);
        let source = self.coordinator.source_for(MemoryKind::LongTerm);

        // Cheap pre-check so the common duplicate path skips the
        // embedding call. The store itself is conditional, so a race
        // between identical ingestions still yields exactly one record.
        if let Some(existing) = self
            .coordinator
            .existing_memory(tenant_id, &content_hash)
            .await?
        {
            debug!(tenant_id, %existing, "Ingest matched existing content");
            return Ok(MemoryResponse::duplicate(existing, source));
        }

        let embedding = self.embedder.embed(content).await?;

        let mut metadata = metadata;
        metadata.insert("origin".to_string(), origin.to_string());
        metadata.insert("ingested_at".to_string(), Utc::now().to_rfc3339());

        let outcome = self
            .coordinator
            .store_long(
                tenant_id,
                content,
                Some(content_hash),
                embedding,
                metadata,
                false,
            )
            .await?;

        Ok(match outcome {
            StoreOutcome::Inserted(id) => MemoryResponse::stored(Some(id), source),
            StoreOutcome::Duplicate(id) => MemoryResponse::duplicate(id, source),
        })
    }

    /// Embed a query and search long-term memory with it.
    pub async fn recall(
        &self,
        query: &str,
        tenant_id: &str,
        limit: Option<usize>,
        min_similarity: Option<f32>,
        filter: RecordFilter,
    ) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed(query).await?;
        self.coordinator
            .search(tenant_id, &query_embedding, limit, min_similarity, filter)
            .await
    }

    /// The embedding provider backing this pipeline.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }
}
