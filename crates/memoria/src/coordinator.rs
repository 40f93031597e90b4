//! Single entry point routing memory operations
//!
//! The coordinator validates tenant policy on every call, applies TTL
//! defaults and quota checks, then delegates to the Archivist or
//! Librarian. Backend degradation is reported through the response
//! `source` field; it is never an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::archivist::Archivist;
use crate::config::SearchConfig;
use crate::error::{MemoriaError, Result};
use crate::librarian::{Librarian, RecordFilter, StoreOutcome};
use crate::memory::request::{MemoryKind, MemoryRequest, MemoryResponse, Operation, ResponseSource};
use crate::memory::types::{MemoryRecord, SearchResult};
use crate::policy::{MemoryPolicy, PolicyCache};
use crate::scribe::content_fingerprint;

pub struct Coordinator {
    archivist: Arc<Archivist>,
    librarian: Arc<Librarian>,
    policies: PolicyCache,
    search_defaults: SearchConfig,
}

impl Coordinator {
    pub fn new(
        archivist: Arc<Archivist>,
        librarian: Arc<Librarian>,
        policies: PolicyCache,
        search_defaults: SearchConfig,
    ) -> Self {
        Self {
            archivist,
            librarian,
            policies,
            search_defaults,
        }
    }

    /// Handle one request envelope. Failures are reported through the
    /// response; this never panics and never surfaces backend outages.
    pub async fn handle(&self, request: MemoryRequest) -> MemoryResponse {
        let source = self.source_for(request.memory_type);

        let outcome = match request.deadline() {
            Some(deadline) if deadline.is_zero() => Err(MemoriaError::Timeout),
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.dispatch(&request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(MemoriaError::Timeout),
                }
            }
            None => self.dispatch(&request).await,
        };

        match outcome {
            Ok(response) => response,
            Err(e) => {
                debug!(
                    tenant_id = %request.tenant_id,
                    operation = ?request.operation,
                    memory_type = ?request.memory_type,
                    "Request failed: {e}"
                );
                MemoryResponse::failure(source, e.kind())
            }
        }
    }

    async fn dispatch(&self, request: &MemoryRequest) -> Result<MemoryResponse> {
        let source = self.source_for(request.memory_type);

        match (request.operation, request.memory_type) {
            (Operation::Store, MemoryKind::ShortTerm) => {
                let key = request
                    .key
                    .as_deref()
                    .ok_or_else(|| missing_field("key"))?;
                let value = request
                    .value
                    .clone()
                    .ok_or_else(|| missing_field("value"))?;

                self.store_short(&request.tenant_id, key, value, request.ttl())
                    .await?;
                Ok(MemoryResponse::stored(None, source))
            }
            (Operation::Retrieve, MemoryKind::ShortTerm) => {
                let key = request
                    .key
                    .as_deref()
                    .ok_or_else(|| missing_field("key"))?;

                match self.retrieve_short(&request.tenant_id, key).await? {
                    Some(value) => Ok(MemoryResponse::retrieved(None, value, source)),
                    None => Err(MemoriaError::NotFound(format!(
                        "no live entry for key '{key}'"
                    ))),
                }
            }
            (Operation::Store, MemoryKind::LongTerm) => {
                let content = request
                    .content
                    .as_deref()
                    .ok_or_else(|| missing_field("content"))?;
                let embedding = request
                    .embedding
                    .clone()
                    .ok_or_else(|| missing_field("embedding"))?;

                let outcome = self
                    .store_long(
                        &request.tenant_id,
                        content,
                        request.content_hash.clone(),
                        embedding,
                        request.metadata.clone(),
                        request.retained,
                    )
                    .await?;

                Ok(match outcome {
                    StoreOutcome::Inserted(id) => MemoryResponse::stored(Some(id), source),
                    StoreOutcome::Duplicate(id) => MemoryResponse::duplicate(id, source),
                })
            }
            (Operation::Retrieve, MemoryKind::LongTerm) => {
                let id = request.memory_id.ok_or_else(|| missing_field("memory_id"))?;

                match self.retrieve_long(&request.tenant_id, id).await? {
                    Some(record) => Ok(MemoryResponse::retrieved(
                        Some(record.id),
                        serde_json::Value::String(record.content),
                        source,
                    )),
                    None => Err(MemoriaError::NotFound(format!("no record with id '{id}'"))),
                }
            }
            (Operation::Search, MemoryKind::LongTerm) => {
                let embedding = request
                    .embedding
                    .as_deref()
                    .ok_or_else(|| missing_field("embedding"))?;

                let matches = self
                    .search(
                        &request.tenant_id,
                        embedding,
                        request.limit,
                        request.min_similarity,
                        request.filter.clone().unwrap_or_default(),
                    )
                    .await?;
                Ok(MemoryResponse::results(matches, source))
            }
            (Operation::Search, MemoryKind::ShortTerm) => Err(MemoriaError::InvalidRequest(
                "the short-term store does not support search".to_string(),
            )),
        }
    }

    /// Store a short-term value. Without an explicit ttl the tenant's
    /// default applies.
    pub async fn store_short(
        &self,
        tenant_id: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let policy = self.require_policy(tenant_id).await?;
        let ttl = ttl.unwrap_or_else(|| policy.short_term_ttl_default());
        self.archivist.store(tenant_id, key, value, ttl).await
    }

    /// Retrieve a short-term value; absent and expired keys read as `None`.
    pub async fn retrieve_short(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>> {
        self.require_policy(tenant_id).await?;
        self.archivist.retrieve(tenant_id, key).await
    }

    /// Store long-term content after policy and quota checks. The
    /// content hash is computed when the caller does not supply one.
    pub async fn store_long(
        &self,
        tenant_id: &str,
        content: &str,
        content_hash: Option<String>,
        embedding: Vec<f32>,
        metadata: HashMap<String, String>,
        retained: bool,
    ) -> Result<StoreOutcome> {
        let policy = self.require_policy(tenant_id).await?;

        if !policy.long_term_enabled {
            return Err(MemoriaError::PolicyViolation(format!(
                "long-term memory is disabled for tenant '{tenant_id}'"
            )));
        }

        if policy.max_memory_size > 0 {
            let usage = self.librarian.usage(tenant_id).await?;
            let projected = usage.content_bytes + content.len() as u64;
            if projected > policy.max_memory_size {
                return Err(MemoriaError::QuotaExceeded {
                    tenant_id: tenant_id.to_string(),
                    detail: format!(
                        "{projected} bytes would exceed the {} byte ceiling",
                        policy.max_memory_size
                    ),
                });
            }
        }

        let content_hash = content_hash.unwrap_or_else(|| content_fingerprint(content));

        self.librarian
            .store(tenant_id, content, &content_hash, embedding, metadata, retained)
            .await
    }

    /// Fetch a long-term record by id.
    pub async fn retrieve_long(&self, tenant_id: &str, id: Uuid) -> Result<Option<MemoryRecord>> {
        self.require_policy(tenant_id).await?;
        self.librarian.get(tenant_id, id).await
    }

    /// Similarity search, with configured defaults for unset knobs.
    pub async fn search(
        &self,
        tenant_id: &str,
        query_embedding: &[f32],
        limit: Option<usize>,
        min_similarity: Option<f32>,
        filter: RecordFilter,
    ) -> Result<Vec<SearchResult>> {
        self.require_policy(tenant_id).await?;

        let limit = limit.unwrap_or(self.search_defaults.default_limit);
        let min_similarity =
            min_similarity.unwrap_or(self.search_defaults.default_min_similarity);

        self.librarian
            .search(tenant_id, query_embedding, limit, min_similarity, &filter)
            .await
    }

    /// Id of the record already holding this content hash, if any. Used
    /// by the ingestion pipeline's dedup pre-check.
    pub async fn existing_memory(
        &self,
        tenant_id: &str,
        content_hash: &str,
    ) -> Result<Option<Uuid>> {
        self.require_policy(tenant_id).await?;
        self.librarian.find_by_hash(tenant_id, content_hash).await
    }

    /// Which source a response for `kind` will report.
    pub fn source_for(&self, kind: MemoryKind) -> ResponseSource {
        match kind {
            MemoryKind::ShortTerm if self.archivist.degraded() => ResponseSource::Fallback,
            MemoryKind::ShortTerm => ResponseSource::Archivist,
            MemoryKind::LongTerm if self.librarian.degraded() => ResponseSource::Fallback,
            MemoryKind::LongTerm => ResponseSource::Librarian,
        }
    }

    /// The short-term store behind this coordinator.
    pub fn archivist(&self) -> &Arc<Archivist> {
        &self.archivist
    }

    /// The long-term store behind this coordinator.
    pub fn librarian(&self) -> &Arc<Librarian> {
        &self.librarian
    }

    /// Drop a tenant's cached policy so the next call re-reads it.
    pub fn invalidate_policy(&self, tenant_id: &str) {
        self.policies.invalidate(tenant_id);
    }

    async fn require_policy(&self, tenant_id: &str) -> Result<MemoryPolicy> {
        match self.policies.get(tenant_id).await? {
            Some(policy) => {
                policy.validate()?;
                Ok(policy)
            }
            None => Err(MemoriaError::PolicyViolation(format!(
                "no policy for tenant '{tenant_id}'"
            ))),
        }
    }
}

fn missing_field(field: &str) -> MemoriaError {
    MemoriaError::InvalidRequest(format!("operation requires '{field}'"))
}
