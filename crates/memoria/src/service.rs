//! Subsystem assembly from configuration
//!
//! Wires the stores, policy cache, coordinator and ingestion pipeline
//! into one handle an embedding host can own. Backend probing (and the
//! fallback decision) happens here, once, at startup.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::archivist::Archivist;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::embedding::{EmbeddingProvider, RemoteEmbedder};
use crate::error::{MemoriaError, Result};
use crate::librarian::Librarian;
use crate::policy::{PolicyCache, RetentionSweep, StaticPolicyStore, SweepConfig};
use crate::scribe::Scribe;

/// A fully wired memory subsystem.
pub struct MemoryService {
    coordinator: Arc<Coordinator>,
    scribe: Arc<Scribe>,
    policies: Arc<StaticPolicyStore>,
    sweep_config: SweepConfig,
}

impl MemoryService {
    /// Assemble the subsystem from configuration, using the remote
    /// embedding provider.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = Arc::new(RemoteEmbedder::new(&config.embedding)?);
        Self::build(config, embedder).await
    }

    /// Assemble the subsystem with an explicit embedding provider.
    pub async fn build(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let data_dir = &config.storage.data_dir;
        std::fs::create_dir_all(data_dir).map_err(|e| {
            MemoriaError::Storage(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;

        info!("Initializing memory stores at: {}", data_dir.display());

        let archivist = Arc::new(Archivist::connect(data_dir).await);
        let librarian = Arc::new(
            Librarian::connect(
                data_dir,
                config.embedding.dimension,
                config.search.candidate_multiplier,
            )
            .await,
        );

        let policies = Arc::new(StaticPolicyStore::with_policies(
            config.policy.tenants.clone(),
        )?);
        let cache = PolicyCache::new(
            policies.clone(),
            config.policy.cache_capacity,
            std::time::Duration::from_secs(config.policy.cache_ttl_secs),
        );

        let coordinator = Arc::new(Coordinator::new(
            archivist,
            librarian,
            cache,
            config.search.clone(),
        ));
        let scribe = Arc::new(Scribe::new(coordinator.clone(), embedder));

        Ok(Self {
            coordinator,
            scribe,
            policies,
            sweep_config: SweepConfig {
                interval: std::time::Duration::from_secs(config.retention.sweep_interval_secs),
            },
        })
    }

    /// The request entry point.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// The ingestion pipeline.
    pub fn scribe(&self) -> &Arc<Scribe> {
        &self.scribe
    }

    /// The mutable policy store; upserts take effect within the cache TTL.
    pub fn policies(&self) -> &Arc<StaticPolicyStore> {
        &self.policies
    }

    /// Start the retention sweep. The caller owns the handle; aborting
    /// it stops the sweep.
    pub fn spawn_retention_sweep(&self) -> JoinHandle<()> {
        let sweep = RetentionSweep::new(
            Arc::clone(self.coordinator.librarian()),
            self.policies.clone(),
            self.sweep_config.clone(),
        );
        sweep.spawn()
    }
}
