//! Operation envelope exposed to in-process callers
//!
//! The subsystem boundary is a callable interface: hosts build a
//! [`MemoryRequest`] and receive a [`MemoryResponse`]. No wire format is
//! prescribed here; both types are serde-friendly so a transport layer
//! can carry them however it likes.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::librarian::filter::RecordFilter;
use crate::memory::types::SearchResult;

/// The operation being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Store,
    Retrieve,
    Search,
}

/// Which store the operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryKind {
    ShortTerm,
    LongTerm,
}

/// Which component produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Archivist,
    Librarian,
    /// An in-process substitute is serving because the durable backend
    /// was unreachable at startup
    Fallback,
}

/// Request envelope. Operation-specific fields are optional; the
/// constructors populate the ones each operation needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRequest {
    pub operation: Operation,
    pub memory_type: MemoryKind,
    pub tenant_id: String,

    /// Short-term key (store/retrieve on the short-term store)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Short-term value (store)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Long-term content (store)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Canonical digest of the normalized content; computed when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Content embedding (long-term store) or query embedding (search)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Free-form tags attached to a long-term store
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Exempt the stored record from the retention sweep
    #[serde(default)]
    pub retained: bool,
    /// Long-term record id (retrieve by id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<Uuid>,
    /// Short-term expiry override; the tenant default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    /// Maximum search results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Minimum cosine similarity for search results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_similarity: Option<f32>,
    /// Metadata/time filter applied before ranking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<RecordFilter>,
    /// Overall deadline; on expiry the operation fails fast with Timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl MemoryRequest {
    fn base(operation: Operation, memory_type: MemoryKind, tenant_id: impl Into<String>) -> Self {
        Self {
            operation,
            memory_type,
            tenant_id: tenant_id.into(),
            key: None,
            value: None,
            content: None,
            content_hash: None,
            embedding: None,
            metadata: HashMap::new(),
            retained: false,
            memory_id: None,
            ttl_secs: None,
            limit: None,
            min_similarity: None,
            filter: None,
            deadline_ms: None,
        }
    }

    /// Store a value in the short-term store. Without a ttl the tenant's
    /// default applies.
    pub fn store_short(
        tenant_id: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        let mut request = Self::base(Operation::Store, MemoryKind::ShortTerm, tenant_id);
        request.key = Some(key.into());
        request.value = Some(value);
        request
    }

    /// Retrieve a short-term value by key.
    pub fn retrieve_short(tenant_id: impl Into<String>, key: impl Into<String>) -> Self {
        let mut request = Self::base(Operation::Retrieve, MemoryKind::ShortTerm, tenant_id);
        request.key = Some(key.into());
        request
    }

    /// Store content with its embedding in the long-term store.
    pub fn store_long(
        tenant_id: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
        metadata: HashMap<String, String>,
    ) -> Self {
        let mut request = Self::base(Operation::Store, MemoryKind::LongTerm, tenant_id);
        request.content = Some(content.into());
        request.embedding = Some(embedding);
        request.metadata = metadata;
        request
    }

    /// Retrieve a long-term record by id.
    pub fn retrieve_long(tenant_id: impl Into<String>, memory_id: Uuid) -> Self {
        let mut request = Self::base(Operation::Retrieve, MemoryKind::LongTerm, tenant_id);
        request.memory_id = Some(memory_id);
        request
    }

    /// Search the long-term store by query embedding.
    pub fn search(
        tenant_id: impl Into<String>,
        query_embedding: Vec<f32>,
        limit: usize,
        min_similarity: f32,
    ) -> Self {
        let mut request = Self::base(Operation::Search, MemoryKind::LongTerm, tenant_id);
        request.embedding = Some(query_embedding);
        request.limit = Some(limit);
        request.min_similarity = Some(min_similarity);
        request
    }

    /// Set a short-term ttl override.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = Some(ttl.as_secs());
        self
    }

    /// Attach a search filter.
    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Fail the operation with `Timeout` if it outlives `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis() as u64);
        self
    }

    /// The effective deadline, if one was supplied.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// The ttl override, if one was supplied.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResponse {
    pub success: bool,
    /// Id of the stored or matched record, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<Uuid>,
    /// Retrieved short-term value or long-term content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Search results, most similar first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<SearchResult>,
    pub source: ResponseSource,
    /// True when identical content already existed and no write occurred
    #[serde(default)]
    pub deduplicated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl MemoryResponse {
    /// A successful store.
    pub fn stored(memory_id: Option<Uuid>, source: ResponseSource) -> Self {
        Self {
            success: true,
            memory_id,
            value: None,
            matches: Vec::new(),
            source,
            deduplicated: false,
            error: None,
        }
    }

    /// A store that matched existing content; nothing was written.
    pub fn duplicate(memory_id: Uuid, source: ResponseSource) -> Self {
        Self {
            success: true,
            memory_id: Some(memory_id),
            value: None,
            matches: Vec::new(),
            source,
            deduplicated: true,
            error: None,
        }
    }

    /// A successful retrieve.
    pub fn retrieved(
        memory_id: Option<Uuid>,
        value: serde_json::Value,
        source: ResponseSource,
    ) -> Self {
        Self {
            success: true,
            memory_id,
            value: Some(value),
            matches: Vec::new(),
            source,
            deduplicated: false,
            error: None,
        }
    }

    /// A successful search.
    pub fn results(matches: Vec<SearchResult>, source: ResponseSource) -> Self {
        Self {
            success: true,
            memory_id: None,
            value: None,
            matches,
            source,
            deduplicated: false,
            error: None,
        }
    }

    /// A failed operation.
    pub fn failure(source: ResponseSource, error: ErrorKind) -> Self {
        Self {
            success: false,
            memory_id: None,
            value: None,
            matches: Vec::new(),
            source,
            deduplicated: false,
            error: Some(error),
        }
    }
}
