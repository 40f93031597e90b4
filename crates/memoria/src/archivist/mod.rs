//! Short-term memory: keyed values with mandatory expiry
//!
//! The Archivist fronts one of two backends chosen once at construction:
//! a durable Lance-backed store, or an in-process map substituted when
//! the durable store is unreachable at startup. The choice is pinned for
//! the process lifetime so behavior never flaps mid-session.

pub mod lance;
pub mod memory;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::Result;
use crate::memory::types::ScratchEntry;

pub use lance::LanceScratch;
pub use memory::MemoryScratch;

/// Trait for short-term storage backends
#[async_trait]
pub trait ShortTermBackend: Send + Sync {
    /// Insert or replace an entry.
    async fn put(&self, entry: ScratchEntry) -> Result<()>;

    /// Fetch an entry without interpreting its expiry.
    async fn get(&self, tenant_id: &str, key: &str) -> Result<Option<ScratchEntry>>;

    /// Remove an entry. Returns true if one existed.
    async fn delete(&self, tenant_id: &str, key: &str) -> Result<bool>;

    /// Drop every entry expired at `now`, returning how many were removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Short-term store front. Expiry is interpreted here so both backends
/// share the exact same semantics: an expired entry is evicted on read
/// and reported as absent.
pub struct Archivist {
    backend: Arc<dyn ShortTermBackend>,
    degraded: bool,
}

impl Archivist {
    /// Connect to the durable backend, substituting the in-process
    /// fallback if it is unreachable. The probe happens exactly once.
    pub async fn connect(data_dir: &Path) -> Self {
        match LanceScratch::connect(data_dir).await {
            Ok(store) => Self {
                backend: Arc::new(store),
                degraded: false,
            },
            Err(e) => {
                warn!("Short-term backend unreachable, serving degraded from memory: {e}");
                Self {
                    backend: Arc::new(MemoryScratch::new()),
                    degraded: true,
                }
            }
        }
    }

    /// An Archivist over the in-process backend, chosen deliberately
    /// (not a degradation).
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryScratch::new()),
            degraded: false,
        }
    }

    /// Build over an explicit backend.
    pub fn with_backend(backend: Arc<dyn ShortTermBackend>, degraded: bool) -> Self {
        Self { backend, degraded }
    }

    /// True when the in-process fallback was substituted at startup.
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    /// Store `value` under `tenant_id:key`, expiring `ttl` from now.
    pub async fn store(
        &self,
        tenant_id: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<()> {
        let entry = ScratchEntry::new(tenant_id, key, value, ttl);
        debug!(
            backend = self.backend.name(),
            tenant_id, key, "Storing scratch entry"
        );
        self.backend.put(entry).await
    }

    /// Retrieve a live value. Expired entries are evicted and reported
    /// as absent.
    pub async fn retrieve(&self, tenant_id: &str, key: &str) -> Result<Option<serde_json::Value>> {
        match self.backend.get(tenant_id, key).await? {
            Some(entry) if entry.is_expired(Utc::now()) => {
                debug!(tenant_id, key, "Evicting expired scratch entry on read");
                self.backend.delete(tenant_id, key).await?;
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value)),
            None => Ok(None),
        }
    }

    /// Remove an entry regardless of expiry. Returns true if one existed.
    pub async fn delete(&self, tenant_id: &str, key: &str) -> Result<bool> {
        self.backend.delete(tenant_id, key).await
    }

    /// Bound growth by dropping everything already expired.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let removed = self.backend.sweep_expired(Utc::now()).await?;
        if removed > 0 {
            debug!(removed, "Swept expired scratch entries");
        }
        Ok(removed)
    }
}
