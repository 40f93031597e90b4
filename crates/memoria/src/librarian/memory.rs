//! In-process long-term backend
//!
//! Linear-scan substitute for the vector store. Same dedup and ranking
//! contract; durability limited to the process lifetime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::types::{MemoryRecord, SearchResult};

use super::filter::RecordFilter;
use super::ranking;
use super::{LongTermBackend, StoreOutcome, TenantUsage};

/// In-memory record store with a `(tenant_id, content_hash)` uniqueness
/// index.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    records: DashMap<Uuid, MemoryRecord>,
    hash_index: DashMap<(String, String), Uuid>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held across all tenants.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl LongTermBackend for MemoryArchive {
    async fn insert_unique(&self, record: MemoryRecord) -> Result<StoreOutcome> {
        let index_key = (record.tenant_id.clone(), record.content_hash.clone());

        // The entry guard holds the index shard lock, making the
        // check-then-insert atomic against concurrent identical inserts.
        match self.hash_index.entry(index_key) {
            Entry::Occupied(existing) => Ok(StoreOutcome::Duplicate(*existing.get())),
            Entry::Vacant(slot) => {
                let id = record.id;
                slot.insert(id);
                self.records.insert(id, record);
                Ok(StoreOutcome::Inserted(id))
            }
        }
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<MemoryRecord>> {
        Ok(self
            .records
            .get(&id)
            .filter(|record| record.tenant_id == tenant_id)
            .map(|record| record.clone()))
    }

    async fn find_by_hash(&self, tenant_id: &str, content_hash: &str) -> Result<Option<Uuid>> {
        Ok(self
            .hash_index
            .get(&(tenant_id.to_string(), content_hash.to_string()))
            .map(|id| *id))
    }

    async fn search(
        &self,
        tenant_id: &str,
        query_embedding: &[f32],
        limit: usize,
        min_similarity: f32,
        filter: &RecordFilter,
    ) -> Result<Vec<SearchResult>> {
        let candidates: Vec<MemoryRecord> = self
            .records
            .iter()
            .filter(|record| record.tenant_id == tenant_id && filter.matches(record))
            .map(|record| record.clone())
            .collect();

        Ok(ranking::rank(
            candidates,
            query_embedding,
            limit,
            min_similarity,
        ))
    }

    async fn mark_retained(&self, tenant_id: &str, id: Uuid) -> Result<bool> {
        match self.records.get_mut(&id) {
            Some(mut record) if record.tenant_id == tenant_id => {
                record.retained = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge(&self, tenant_id: &str, id: Uuid) -> Result<bool> {
        let removed = self
            .records
            .remove_if(&id, |_, record| {
                record.tenant_id == tenant_id && !record.retained
            })
            .map(|(_, record)| record);

        match removed {
            Some(record) => {
                self.hash_index
                    .remove(&(record.tenant_id, record.content_hash));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_older_than(&self, tenant_id: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let expired: Vec<Uuid> = self
            .records
            .iter()
            .filter(|record| {
                record.tenant_id == tenant_id && !record.retained && record.created_at < cutoff
            })
            .map(|record| record.id)
            .collect();

        let mut purged = 0;
        for id in expired {
            if self.purge(tenant_id, id).await? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn usage(&self, tenant_id: &str) -> Result<TenantUsage> {
        let mut usage = TenantUsage::default();
        for record in self.records.iter() {
            if record.tenant_id == tenant_id {
                usage.records += 1;
                usage.content_bytes += record.content.len() as u64;
            }
        }
        Ok(usage)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(tenant: &str, content: &str, hash: &str) -> MemoryRecord {
        MemoryRecord::new(tenant, content, hash, vec![0.5; 4], HashMap::new())
    }

    #[tokio::test]
    async fn test_insert_unique_then_duplicate() {
        let archive = MemoryArchive::new();

        let first = archive
            .insert_unique(record("t1", "The sky is blue", "h1"))
            .await
            .unwrap();
        let StoreOutcome::Inserted(first_id) = first else {
            panic!("first insert should write");
        };

        let second = archive
            .insert_unique(record("t1", "The sky is blue", "h1"))
            .await
            .unwrap();
        assert_eq!(second, StoreOutcome::Duplicate(first_id));
        assert_eq!(archive.len(), 1);
    }

    #[tokio::test]
    async fn test_same_hash_different_tenants_both_insert() {
        let archive = MemoryArchive::new();

        let a = archive.insert_unique(record("t1", "x", "h1")).await.unwrap();
        let b = archive.insert_unique(record("t2", "x", "h1")).await.unwrap();

        assert!(!a.is_duplicate());
        assert!(!b.is_duplicate());
        assert_eq!(archive.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_identical_inserts_create_one_record() {
        let archive = std::sync::Arc::new(MemoryArchive::new());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let archive = archive.clone();
            handles.push(tokio::spawn(async move {
                archive
                    .insert_unique(record("t1", "same content", "h-same"))
                    .await
                    .unwrap()
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if !handle.await.unwrap().is_duplicate() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1, "exactly one concurrent insert should win");
        assert_eq!(archive.len(), 1);
    }

    #[tokio::test]
    async fn test_get_is_tenant_scoped() {
        let archive = MemoryArchive::new();
        let outcome = archive.insert_unique(record("t1", "x", "h1")).await.unwrap();
        let id = outcome.memory_id();

        assert!(archive.get("t1", id).await.unwrap().is_some());
        assert!(archive.get("t2", id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_skips_retained_records() {
        let archive = MemoryArchive::new();
        let id = archive
            .insert_unique(record("t1", "keep me", "h1"))
            .await
            .unwrap()
            .memory_id();

        assert!(archive.mark_retained("t1", id).await.unwrap());
        assert!(!archive.purge("t1", id).await.unwrap());
        assert!(archive.get("t1", id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_frees_hash_for_reinsertion() {
        let archive = MemoryArchive::new();
        let id = archive
            .insert_unique(record("t1", "x", "h1"))
            .await
            .unwrap()
            .memory_id();

        assert!(archive.purge("t1", id).await.unwrap());

        let again = archive.insert_unique(record("t1", "x", "h1")).await.unwrap();
        assert!(!again.is_duplicate());
    }

    #[tokio::test]
    async fn test_purge_older_than_respects_cutoff_and_retained() {
        let archive = MemoryArchive::new();

        let mut old = record("t1", "old", "h-old");
        old.created_at = Utc::now() - chrono::Duration::days(40);
        let old_id = archive.insert_unique(old).await.unwrap().memory_id();

        let mut old_retained = record("t1", "old but kept", "h-kept");
        old_retained.created_at = Utc::now() - chrono::Duration::days(40);
        old_retained.retained = true;
        let kept_id = archive.insert_unique(old_retained).await.unwrap().memory_id();

        let fresh_id = archive
            .insert_unique(record("t1", "fresh", "h-fresh"))
            .await
            .unwrap()
            .memory_id();

        let cutoff = Utc::now() - chrono::Duration::days(30);
        let purged = archive.purge_older_than("t1", cutoff).await.unwrap();

        assert_eq!(purged, 1);
        assert!(archive.get("t1", old_id).await.unwrap().is_none());
        assert!(archive.get("t1", kept_id).await.unwrap().is_some());
        assert!(archive.get("t1", fresh_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_usage_counts_only_the_tenant() {
        let archive = MemoryArchive::new();
        archive.insert_unique(record("t1", "abcd", "h1")).await.unwrap();
        archive.insert_unique(record("t1", "efgh", "h2")).await.unwrap();
        archive.insert_unique(record("t2", "ijkl", "h3")).await.unwrap();

        let usage = archive.usage("t1").await.unwrap();
        assert_eq!(usage.records, 2);
        assert_eq!(usage.content_bytes, 8);
    }

    #[tokio::test]
    async fn test_search_scopes_and_ranks() {
        let archive = MemoryArchive::new();

        let mut close = record("t1", "close", "h1");
        close.embedding = vec![1.0, 0.0, 0.0, 0.0];
        let mut far = record("t1", "far", "h2");
        far.embedding = vec![0.0, 1.0, 0.0, 0.0];
        let mut other_tenant = record("t2", "other", "h3");
        other_tenant.embedding = vec![1.0, 0.0, 0.0, 0.0];

        archive.insert_unique(close).await.unwrap();
        archive.insert_unique(far).await.unwrap();
        archive.insert_unique(other_tenant).await.unwrap();

        let results = archive
            .search(
                "t1",
                &[1.0, 0.0, 0.0, 0.0],
                10,
                0.5,
                &RecordFilter::default(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.content, "close");
    }
}
