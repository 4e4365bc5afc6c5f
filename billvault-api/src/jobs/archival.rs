//! Scheduled Archival
//!
//! Runs [`ArchivalMigrator::run`] every `interval`. A run that outlasts the
//! interval delays the next tick instead of queueing a burst of runs; runs
//! started elsewhere (the manual trigger, another replica) may overlap this
//! one, which the migrator tolerates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use billvault_storage::{ArchivalMigrator, MigrationSummary};
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::constants::DEFAULT_MIGRATION_INTERVAL_SECS;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ArchivalJobConfig {
    /// Time between run starts (default: 24 hours)
    pub interval: Duration,
}

impl Default for ArchivalJobConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_MIGRATION_INTERVAL_SECS),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters accumulated across scheduled runs.
#[derive(Debug, Default)]
pub struct ArchivalJobMetrics {
    pub runs: AtomicU64,
    pub cancelled_runs: AtomicU64,
    pub candidates: AtomicU64,
    pub archived: AtomicU64,
    pub already_archived: AtomicU64,
    pub reindexed: AtomicU64,
    pub failed: AtomicU64,
}

impl ArchivalJobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn absorb(&self, summary: &MigrationSummary) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if summary.cancelled {
            self.cancelled_runs.fetch_add(1, Ordering::Relaxed);
        }
        self.candidates.fetch_add(summary.candidates, Ordering::Relaxed);
        self.archived.fetch_add(summary.archived, Ordering::Relaxed);
        self.already_archived
            .fetch_add(summary.already_archived, Ordering::Relaxed);
        self.reindexed.fetch_add(summary.reindexed, Ordering::Relaxed);
        self.failed.fetch_add(summary.failed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ArchivalJobSnapshot {
        ArchivalJobSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            cancelled_runs: self.cancelled_runs.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            archived: self.archived.load(Ordering::Relaxed),
            already_archived: self.already_archived.load(Ordering::Relaxed),
            reindexed: self.reindexed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivalJobSnapshot {
    pub runs: u64,
    pub cancelled_runs: u64,
    pub candidates: u64,
    pub archived: u64,
    pub already_archived: u64,
    pub reindexed: u64,
    pub failed: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run the migrator on a schedule until shutdown.
///
/// The first run starts immediately. Shutdown is also passed into each run,
/// so a run in progress stops taking new candidates as soon as it flips.
pub async fn archival_task(
    migrator: ArchivalMigrator,
    config: ArchivalJobConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ArchivalJobMetrics> {
    let metrics = Arc::new(ArchivalJobMetrics::new());
    let run_shutdown = shutdown_rx.clone();

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        threshold_days = migrator.config().archive_threshold_days,
        "Archival task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Archival task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let summary = migrator.run(Utc::now(), &run_shutdown).await;
                metrics.absorb(&summary);
                if summary.failed > 0 {
                    tracing::warn!(
                        run_id = %summary.run_id,
                        failed = summary.failed,
                        "Scheduled archival run left records in the hot tier"
                    );
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        runs = snapshot.runs,
        archived = snapshot.archived,
        failed = snapshot.failed,
        "Archival task completed"
    );

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use billvault_core::{ArchivalConfig, Payload, Record, RecordId};
    use billvault_storage::{
        HotStore, InMemoryColdStore, InMemoryHotStore, InMemoryLocationIndex, LocationIndex,
    };

    fn stale(id: &str) -> Record {
        Record::new(
            RecordId::parse(id).unwrap(),
            "2020-01-01T00:00:00Z".parse().unwrap(),
            Payload::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_until_shutdown() {
        let hot = Arc::new(InMemoryHotStore::new());
        let index = Arc::new(InMemoryLocationIndex::new());
        hot.put(&stale("a")).await.unwrap();
        hot.put(&stale("b")).await.unwrap();

        let migrator = ArchivalMigrator::new(
            hot.clone(),
            Arc::new(InMemoryColdStore::new()),
            index.clone(),
            ArchivalConfig {
                retire_ttl: Duration::from_secs(3600),
                ..Default::default()
            },
        )
        .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = ArchivalJobConfig {
            interval: Duration::from_secs(60),
        };
        let handle = tokio::spawn(archival_task(migrator, config, shutdown_rx));

        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap().snapshot();

        assert_eq!(metrics.runs, 3);
        assert_eq!(metrics.archived, 2);
        assert_eq!(metrics.already_archived, 4);
        assert_eq!(metrics.failed, 0);
        assert!(index.get(&RecordId::parse("a").unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_task_exits_on_shutdown_before_first_tick_completes() {
        let migrator = ArchivalMigrator::new(
            Arc::new(InMemoryHotStore::new()),
            Arc::new(InMemoryColdStore::new()),
            Arc::new(InMemoryLocationIndex::new()),
            ArchivalConfig::default(),
        )
        .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(archival_task(
            migrator,
            ArchivalJobConfig::default(),
            shutdown_rx,
        ));
        shutdown_tx.send(true).unwrap();

        let metrics = handle.await.unwrap().snapshot();
        assert!(metrics.runs <= 1);
    }
}
