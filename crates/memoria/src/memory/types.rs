//! Core record types for the Memoria system
//!
//! Defines the long-term [`MemoryRecord`], the short-term
//! [`ScratchEntry`], and the [`SearchResult`] wrapper returned by
//! similarity search.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A long-term memory record.
///
/// Records are append-only: once stored they are never mutated, with the
/// single exception of the `retained` flag, which can transition from
/// `false` to `true` to exempt the record from the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier, assigned at store time
    pub id: Uuid,
    /// Tenant this record belongs to; no query crosses tenant boundaries
    pub tenant_id: String,
    /// The stored content
    pub content: String,
    /// Lowercase hex SHA-256 digest of the normalized content, unique
    /// per tenant
    pub content_hash: String,
    /// Vector embedding, fixed dimensionality per deployment
    pub embedding: Vec<f32>,
    /// Free-form key/value tags (the ingestion pipeline adds `origin`
    /// and `ingested_at`)
    pub metadata: HashMap<String, String>,
    /// When this record was created
    pub created_at: DateTime<Utc>,
    /// When true, the retention sweep never purges this record
    pub retained: bool,
}

impl MemoryRecord {
    /// Create a new record with a freshly assigned id.
    pub fn new(
        tenant_id: impl Into<String>,
        content: impl Into<String>,
        content_hash: impl Into<String>,
        embedding: Vec<f32>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            content: content.into(),
            content_hash: content_hash.into(),
            embedding,
            metadata,
            created_at: Utc::now(),
            retained: false,
        }
    }
}

/// A short-term key/value entry with mandatory expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchEntry {
    /// Tenant this entry belongs to
    pub tenant_id: String,
    /// Caller-chosen key, unique within the tenant
    pub key: String,
    /// Arbitrary JSON value
    pub value: serde_json::Value,
    /// When this entry was created
    pub created_at: DateTime<Utc>,
    /// After this instant the entry is no longer retrievable
    pub expires_at: DateTime<Utc>,
}

impl ScratchEntry {
    /// Create an entry expiring `ttl` from now.
    pub fn new(
        tenant_id: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
        ttl: std::time::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            key: key.into(),
            value,
            created_at: now,
            expires_at: now + chrono::Duration::milliseconds(ttl.as_millis() as i64),
        }
    }

    /// Whether this entry is expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The backing-store key, prefixed by tenant to prevent cross-tenant
    /// collisions.
    pub fn storage_key(&self) -> String {
        scoped_key(&self.tenant_id, &self.key)
    }
}

/// Compose the tenant-scoped key used by short-term backends.
pub fn scoped_key(tenant_id: &str, key: &str) -> String {
    format!("{tenant_id}:{key}")
}

/// A record matched by similarity search, with its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub record: MemoryRecord,
    /// Cosine similarity against the query embedding
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_record_serialization_roundtrip() {
        let mut metadata = HashMap::new();
        metadata.insert("origin".to_string(), "conversation".to_string());

        let record = MemoryRecord::new(
            "t1",
            "The sky is blue",
            "abc123",
            vec![0.1; 384],
            metadata,
        );

        let json = serde_json::to_string(&record).expect("Failed to serialize record");
        let deserialized: MemoryRecord =
            serde_json::from_str(&json).expect("Failed to deserialize record");

        assert_eq!(record.id, deserialized.id);
        assert_eq!(record.tenant_id, deserialized.tenant_id);
        assert_eq!(record.content, deserialized.content);
        assert_eq!(record.content_hash, deserialized.content_hash);
        assert_eq!(record.embedding.len(), deserialized.embedding.len());
        assert_eq!(record.metadata, deserialized.metadata);
    }

    #[test]
    fn test_new_record_defaults() {
        let record = MemoryRecord::new("t1", "content", "hash", vec![0.1; 8], HashMap::new());
        assert!(!record.retained);
        assert!(!record.id.is_nil());
    }

    #[test]
    fn test_scratch_entry_expiry() {
        let entry = ScratchEntry::new(
            "t1",
            "session-42",
            serde_json::json!({"turn": 1}),
            Duration::from_secs(60),
        );

        assert!(!entry.is_expired(Utc::now()));
        assert!(entry.is_expired(Utc::now() + chrono::Duration::seconds(61)));
        assert!(entry.expires_at > entry.created_at);
    }

    #[test]
    fn test_scoped_key_prevents_collisions() {
        let a = ScratchEntry::new("t1", "k", serde_json::json!(1), Duration::from_secs(1));
        let b = ScratchEntry::new("t2", "k", serde_json::json!(2), Duration::from_secs(1));
        assert_ne!(a.storage_key(), b.storage_key());
        assert_eq!(a.storage_key(), "t1:k");
    }
}
