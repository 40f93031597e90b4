//! Per-tenant policy: quotas, TTL defaults, retention
//!
//! Policy persistence belongs to an external store; this module defines
//! the provider trait, an in-process implementation hosts and tests
//! inject, and the short-TTL read cache the coordinator consults on
//! every call.

pub mod sweep;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use serde::Deserialize;

use crate::error::{MemoriaError, Result};

pub use sweep::{RetentionSweep, SweepConfig, SweepReport};

/// Default short-term ttl applied when a policy does not set one
const DEFAULT_SHORT_TERM_TTL_SECS: u64 = 3600;

/// Per-tenant memory policy.
///
/// `max_memory_size` caps total long-term content bytes for the tenant;
/// zero means unlimited. `retention_days` of zero disables the retention
/// sweep for the tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryPolicy {
    pub tenant_id: String,
    /// Applied to short-term stores that carry no explicit ttl
    #[serde(default = "default_short_term_ttl_secs")]
    pub short_term_ttl_default_secs: u64,
    /// When false, long-term stores are rejected for this tenant
    #[serde(default = "default_long_term_enabled")]
    pub long_term_enabled: bool,
    /// Total long-term content bytes allowed; zero = unlimited
    #[serde(default)]
    pub max_memory_size: u64,
    /// Long-term records older than this are purged unless retained;
    /// zero = keep forever
    #[serde(default)]
    pub retention_days: u32,
    /// Opaque access rule strings, evaluated by the host's auth layer
    #[serde(default)]
    pub access_rules: Vec<String>,
}

fn default_short_term_ttl_secs() -> u64 {
    DEFAULT_SHORT_TERM_TTL_SECS
}

fn default_long_term_enabled() -> bool {
    true
}

impl MemoryPolicy {
    /// A policy with default settings for `tenant_id`.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            short_term_ttl_default_secs: default_short_term_ttl_secs(),
            long_term_enabled: default_long_term_enabled(),
            max_memory_size: 0,
            retention_days: 0,
            access_rules: Vec::new(),
        }
    }

    /// The default ttl as a `Duration`.
    pub fn short_term_ttl_default(&self) -> Duration {
        Duration::from_secs(self.short_term_ttl_default_secs)
    }

    /// Reject structurally invalid policies (empty tenant, blank rules).
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(MemoriaError::PolicyViolation(
                "policy has an empty tenant_id".to_string(),
            ));
        }
        if self.access_rules.iter().any(|r| r.trim().is_empty()) {
            return Err(MemoriaError::PolicyViolation(format!(
                "policy for tenant '{}' has a blank access rule",
                self.tenant_id
            )));
        }
        Ok(())
    }
}

/// Trait for policy persistence backends
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    /// The policy for a tenant, or `None` when the tenant is unknown.
    async fn policy_for(&self, tenant_id: &str) -> Result<Option<MemoryPolicy>>;

    /// All known tenant policies, for the retention sweep.
    async fn list(&self) -> Result<Vec<MemoryPolicy>>;
}

/// In-process policy store.
///
/// Hosts seed it from configuration and may upsert at runtime; it stands
/// in for whatever relational or document store owns policy rows in a
/// full deployment.
#[derive(Debug, Default)]
pub struct StaticPolicyStore {
    policies: DashMap<String, MemoryPolicy>,
}

impl StaticPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store seeded with the given policies.
    pub fn with_policies(policies: impl IntoIterator<Item = MemoryPolicy>) -> Result<Self> {
        let store = Self::new();
        for policy in policies {
            store.upsert(policy)?;
        }
        Ok(store)
    }

    /// Insert or replace a tenant's policy.
    pub fn upsert(&self, policy: MemoryPolicy) -> Result<()> {
        policy.validate()?;
        self.policies.insert(policy.tenant_id.clone(), policy);
        Ok(())
    }

    /// Remove a tenant's policy. Returns true if one existed.
    pub fn remove(&self, tenant_id: &str) -> bool {
        self.policies.remove(tenant_id).is_some()
    }
}

#[async_trait]
impl PolicyProvider for StaticPolicyStore {
    async fn policy_for(&self, tenant_id: &str) -> Result<Option<MemoryPolicy>> {
        Ok(self.policies.get(tenant_id).map(|entry| entry.clone()))
    }

    async fn list(&self) -> Result<Vec<MemoryPolicy>> {
        Ok(self.policies.iter().map(|entry| entry.clone()).collect())
    }
}

struct CachedPolicy {
    policy: Option<MemoryPolicy>,
    fetched_at: Instant,
}

/// Short-TTL read cache in front of a [`PolicyProvider`].
///
/// Absent tenants are cached too, so a storm of requests for an unknown
/// tenant does not hammer the provider.
pub struct PolicyCache {
    provider: Arc<dyn PolicyProvider>,
    cache: Mutex<LruCache<String, CachedPolicy>>,
    ttl: Duration,
}

impl PolicyCache {
    pub fn new(provider: Arc<dyn PolicyProvider>, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(1024).expect("nonzero literal"));
        Self {
            provider,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// The tenant's policy, served from cache within the TTL window.
    pub async fn get(&self, tenant_id: &str) -> Result<Option<MemoryPolicy>> {
        {
            let mut cache = self.cache.lock().expect("policy cache poisoned");
            if let Some(cached) = cache.get(tenant_id) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.policy.clone());
                }
            }
        }

        let policy = self.provider.policy_for(tenant_id).await?;

        let mut cache = self.cache.lock().expect("policy cache poisoned");
        cache.put(
            tenant_id.to_string(),
            CachedPolicy {
                policy: policy.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(policy)
    }

    /// Drop a tenant's cached entry so the next read hits the provider.
    pub fn invalidate(&self, tenant_id: &str) {
        let mut cache = self.cache.lock().expect("policy cache poisoned");
        cache.pop(tenant_id);
    }

    /// The underlying provider, shared with the retention sweep.
    pub fn provider(&self) -> Arc<dyn PolicyProvider> {
        Arc::clone(&self.provider)
    }
}
