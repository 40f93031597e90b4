//! Retention sweep for long-term records
//!
//! Runs on its own schedule, independent of request handling: for every
//! tenant whose policy sets `retention_days`, purges records older than
//! the window unless they are marked retained.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::Result;
use crate::librarian::Librarian;

use super::PolicyProvider;

/// Retention sweep scheduling
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweep passes
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
        }
    }
}

/// What a sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tenants whose policy enabled retention
    pub tenants_swept: usize,
    /// Records purged across those tenants
    pub records_purged: usize,
}

/// Periodic purge of out-of-retention long-term records.
pub struct RetentionSweep {
    librarian: Arc<Librarian>,
    policies: Arc<dyn PolicyProvider>,
    config: SweepConfig,
}

impl RetentionSweep {
    pub fn new(
        librarian: Arc<Librarian>,
        policies: Arc<dyn PolicyProvider>,
        config: SweepConfig,
    ) -> Self {
        Self {
            librarian,
            policies,
            config,
        }
    }

    /// One sweep pass over every tenant with retention enabled.
    pub async fn run_once(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for policy in self.policies.list().await? {
            if policy.retention_days == 0 {
                continue;
            }

            let cutoff = Utc::now() - chrono::Duration::days(i64::from(policy.retention_days));
            let purged = self
                .librarian
                .purge_older_than(&policy.tenant_id, cutoff)
                .await?;

            report.tenants_swept += 1;
            report.records_purged += purged;

            if purged > 0 {
                info!(
                    tenant_id = %policy.tenant_id,
                    purged,
                    retention_days = policy.retention_days,
                    "Retention sweep purged records"
                );
            }
        }

        Ok(report)
    }

    /// Run sweep passes forever on the configured interval. The caller
    /// owns the handle; aborting it stops the sweep.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh start
            // does not sweep before anything can age out.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match self.run_once().await {
                    Ok(report) if report.records_purged > 0 => {
                        info!(
                            tenants = report.tenants_swept,
                            purged = report.records_purged,
                            "Retention sweep pass complete"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Retention sweep pass failed: {e}"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::librarian::{LongTermBackend, MemoryArchive};
    use crate::memory::types::MemoryRecord;
    use crate::policy::{MemoryPolicy, StaticPolicyStore};
    use std::collections::HashMap;

    fn aged_record(tenant: &str, content: &str, age_days: i64, retained: bool) -> MemoryRecord {
        let mut record = MemoryRecord::new(tenant, content, content, vec![0.5; 4], HashMap::new());
        record.created_at = Utc::now() - chrono::Duration::days(age_days);
        record.retained = retained;
        record
    }

    async fn sweep_fixture(
        records: Vec<MemoryRecord>,
        policies: Vec<MemoryPolicy>,
    ) -> (Arc<Librarian>, RetentionSweep) {
        let archive = Arc::new(MemoryArchive::new());
        for record in records {
            archive.insert_unique(record).await.unwrap();
        }
        let librarian = Arc::new(Librarian::with_backend(archive, false, 4));

        let store = Arc::new(StaticPolicyStore::with_policies(policies).unwrap());
        let sweep = RetentionSweep::new(librarian.clone(), store, SweepConfig::default());
        (librarian, sweep)
    }

    #[tokio::test]
    async fn test_sweep_skips_tenants_without_retention() {
        let (librarian, sweep) = sweep_fixture(
            vec![aged_record("t1", "ancient", 400, false)],
            vec![MemoryPolicy::new("t1")],
        )
        .await;

        let report = sweep.run_once().await.unwrap();

        assert_eq!(report.tenants_swept, 0);
        assert_eq!(report.records_purged, 0);
        assert_eq!(librarian.usage("t1").await.unwrap().records, 1);
    }

    #[tokio::test]
    async fn test_sweep_purges_only_out_of_window_records() {
        let mut policy = MemoryPolicy::new("t1");
        policy.retention_days = 30;

        let (librarian, sweep) = sweep_fixture(
            vec![
                aged_record("t1", "stale", 40, false),
                aged_record("t1", "fresh", 1, false),
            ],
            vec![policy],
        )
        .await;

        let report = sweep.run_once().await.unwrap();

        assert_eq!(report.tenants_swept, 1);
        assert_eq!(report.records_purged, 1);
        assert_eq!(librarian.usage("t1").await.unwrap().records, 1);
    }

    #[tokio::test]
    async fn test_sweep_never_purges_retained_records() {
        let mut policy = MemoryPolicy::new("t1");
        policy.retention_days = 7;

        let (librarian, sweep) = sweep_fixture(
            vec![aged_record("t1", "kept", 100, true)],
            vec![policy],
        )
        .await;

        let report = sweep.run_once().await.unwrap();

        assert_eq!(report.records_purged, 0);
        assert_eq!(librarian.usage("t1").await.unwrap().records, 1);
    }

    #[tokio::test]
    async fn test_sweep_is_tenant_scoped() {
        let mut swept = MemoryPolicy::new("t1");
        swept.retention_days = 7;
        let unswept = MemoryPolicy::new("t2");

        let (librarian, sweep) = sweep_fixture(
            vec![
                aged_record("t1", "goes", 30, false),
                aged_record("t2", "stays", 30, false),
            ],
            vec![swept, unswept],
        )
        .await;

        let report = sweep.run_once().await.unwrap();

        assert_eq!(report.records_purged, 1);
        assert_eq!(librarian.usage("t1").await.unwrap().records, 0);
        assert_eq!(librarian.usage("t2").await.unwrap().records, 1);
    }
}
