//! Long-term memory: append-only records with similarity search
//!
//! The Librarian fronts one of two backends chosen once at construction:
//! a Lance-backed vector store, or an in-process linear scan substituted
//! when the vector store is unreachable at startup. Both backends share
//! the ranking contract in [`ranking`], so degraded mode only costs
//! durability and O(n) search, never different results.

pub mod filter;
pub mod lance;
pub mod memory;
pub mod ranking;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{MemoriaError, Result};
use crate::memory::types::{MemoryRecord, SearchResult};

pub use filter::RecordFilter;
pub use lance::LanceArchive;
pub use memory::MemoryArchive;

/// Outcome of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The record was written under this new id
    Inserted(Uuid),
    /// Identical content already existed; nothing was written
    Duplicate(Uuid),
}

impl StoreOutcome {
    pub fn memory_id(&self) -> Uuid {
        match self {
            StoreOutcome::Inserted(id) | StoreOutcome::Duplicate(id) => *id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreOutcome::Duplicate(_))
    }
}

/// Per-tenant storage volume, backing quota checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantUsage {
    pub records: u64,
    pub content_bytes: u64,
}

/// Trait for long-term storage backends
#[async_trait]
pub trait LongTermBackend: Send + Sync {
    /// Insert the record unless one with the same
    /// `(tenant_id, content_hash)` already exists. The check and the
    /// write are atomic with respect to concurrent identical inserts.
    async fn insert_unique(&self, record: MemoryRecord) -> Result<StoreOutcome>;

    /// Fetch a record by id within the tenant scope.
    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<MemoryRecord>>;

    /// Id of the record holding this content hash, if any.
    async fn find_by_hash(&self, tenant_id: &str, content_hash: &str) -> Result<Option<Uuid>>;

    /// Candidates within tenant scope matching `filter`, ranked by the
    /// canonical contract.
    async fn search(
        &self,
        tenant_id: &str,
        query_embedding: &[f32],
        limit: usize,
        min_similarity: f32,
        filter: &RecordFilter,
    ) -> Result<Vec<SearchResult>>;

    /// Exempt a record from the retention sweep. Returns false when the
    /// record does not exist in this tenant.
    async fn mark_retained(&self, tenant_id: &str, id: Uuid) -> Result<bool>;

    /// Delete one record unless it is retained. Returns true if deleted.
    async fn purge(&self, tenant_id: &str, id: Uuid) -> Result<bool>;

    /// Delete all non-retained records created before `cutoff`.
    async fn purge_older_than(&self, tenant_id: &str, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Current storage volume for a tenant.
    async fn usage(&self, tenant_id: &str) -> Result<TenantUsage>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Long-term store front. Assigns ids, enforces the deployment's
/// embedding dimensionality, and pins the backend choice for the
/// process lifetime.
pub struct Librarian {
    backend: Arc<dyn LongTermBackend>,
    degraded: bool,
    dimension: usize,
}

impl Librarian {
    /// Connect to the durable backend, substituting the in-process
    /// fallback if it is unreachable. The probe happens exactly once.
    pub async fn connect(data_dir: &Path, dimension: usize, candidate_multiplier: usize) -> Self {
        match LanceArchive::connect(data_dir, dimension, candidate_multiplier).await {
            Ok(store) => Self {
                backend: Arc::new(store),
                degraded: false,
                dimension,
            },
            Err(e) => {
                warn!("Long-term backend unreachable, serving degraded from memory: {e}");
                Self {
                    backend: Arc::new(MemoryArchive::new()),
                    degraded: true,
                    dimension,
                }
            }
        }
    }

    /// A Librarian over the in-process backend, chosen deliberately
    /// (not a degradation).
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            backend: Arc::new(MemoryArchive::new()),
            degraded: false,
            dimension,
        }
    }

    /// Build over an explicit backend.
    pub fn with_backend(
        backend: Arc<dyn LongTermBackend>,
        degraded: bool,
        dimension: usize,
    ) -> Self {
        Self {
            backend,
            degraded,
            dimension,
        }
    }

    /// True when the in-process fallback was substituted at startup.
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    /// The embedding dimensionality this deployment is fixed to.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(MemoriaError::Storage(format!(
                "embedding has {} dimensions, this deployment is fixed to {}",
                embedding.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    /// Store content with its embedding, assigning a new id. Returns
    /// `Duplicate` without writing when the tenant already holds the
    /// same content hash.
    pub async fn store(
        &self,
        tenant_id: &str,
        content: &str,
        content_hash: &str,
        embedding: Vec<f32>,
        metadata: HashMap<String, String>,
        retained: bool,
    ) -> Result<StoreOutcome> {
        self.check_dimension(&embedding)?;

        let mut record = MemoryRecord::new(tenant_id, content, content_hash, embedding, metadata);
        record.retained = retained;
        let id = record.id;

        let outcome = self.backend.insert_unique(record).await?;
        match outcome {
            StoreOutcome::Inserted(_) => {
                debug!(backend = self.backend.name(), tenant_id, %id, "Stored memory record");
            }
            StoreOutcome::Duplicate(existing) => {
                debug!(tenant_id, %existing, "Skipped duplicate content");
            }
        }
        Ok(outcome)
    }

    /// Fetch a record by id within the tenant scope.
    pub async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<MemoryRecord>> {
        self.backend.get(tenant_id, id).await
    }

    /// Id of the record holding this content hash, if any.
    pub async fn find_by_hash(&self, tenant_id: &str, content_hash: &str) -> Result<Option<Uuid>> {
        self.backend.find_by_hash(tenant_id, content_hash).await
    }

    /// Similarity search within the tenant scope.
    pub async fn search(
        &self,
        tenant_id: &str,
        query_embedding: &[f32],
        limit: usize,
        min_similarity: f32,
        filter: &RecordFilter,
    ) -> Result<Vec<SearchResult>> {
        self.check_dimension(query_embedding)?;
        self.backend
            .search(tenant_id, query_embedding, limit, min_similarity, filter)
            .await
    }

    /// Exempt a record from the retention sweep.
    pub async fn mark_retained(&self, tenant_id: &str, id: Uuid) -> Result<bool> {
        self.backend.mark_retained(tenant_id, id).await
    }

    /// Delete one record unless it is retained.
    pub async fn purge(&self, tenant_id: &str, id: Uuid) -> Result<bool> {
        self.backend.purge(tenant_id, id).await
    }

    /// Delete all non-retained records created before `cutoff`.
    pub async fn purge_older_than(&self, tenant_id: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        self.backend.purge_older_than(tenant_id, cutoff).await
    }

    /// Current storage volume for a tenant.
    pub async fn usage(&self, tenant_id: &str) -> Result<TenantUsage> {
        self.backend.usage(tenant_id).await
    }
}
