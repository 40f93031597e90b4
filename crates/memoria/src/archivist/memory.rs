//! In-process short-term backend
//!
//! Substituted when the durable backend is unreachable; identical
//! contract, durability limited to the process lifetime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::Result;
use crate::memory::types::{ScratchEntry, scoped_key};

use super::ShortTermBackend;

/// Time-indexed in-process map keyed by `tenant_id:key`.
#[derive(Debug, Default)]
pub struct MemoryScratch {
    entries: DashMap<String, ScratchEntry>,
}

impl MemoryScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ShortTermBackend for MemoryScratch {
    async fn put(&self, entry: ScratchEntry) -> Result<()> {
        self.entries.insert(entry.storage_key(), entry);
        Ok(())
    }

    async fn get(&self, tenant_id: &str, key: &str) -> Result<Option<ScratchEntry>> {
        Ok(self
            .entries
            .get(&scoped_key(tenant_id, key))
            .map(|entry| entry.clone()))
    }

    async fn delete(&self, tenant_id: &str, key: &str) -> Result<bool> {
        Ok(self.entries.remove(&scoped_key(tenant_id, key)).is_some())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - self.entries.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
