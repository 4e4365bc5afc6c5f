//! Archival migrator.
//!
//! Moves hot records older than the archive threshold into the cold tier.
//! Per record:
//!
//! 1. derive the cold key from `(id, created_at)`;
//! 2. if the location index already has the id, nothing is written;
//! 3. otherwise write the canonical body with `put_if_absent` (skipped when
//!    the object already exists) and insert the location entry;
//! 4. only then set the hot copy's expiry.
//!
//! Records are independent. A failure is logged with the record id, counted,
//! and the run moves on; the record stays a candidate for the next run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use billvault_core::{
    ArchivalConfig, ConfigError, LocationEntry, Record, RecordId, TierError, TierResult, Timestamp,
};
use futures_util::{future, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::tier::{encode_record, ColdStore, HotStore, LocationIndex};

/// How a single record left the hot tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// This run wrote the cold object and the index entry.
    Archived,
    /// The index entry already existed; only the hot copy was retired.
    AlreadyArchived,
    /// The cold object existed without an index entry; the entry was added.
    Reindexed,
}

/// Totals for one migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub run_id: Uuid,
    pub started_at: Timestamp,
    pub cutoff: Timestamp,
    pub candidates: u64,
    pub archived: u64,
    pub already_archived: u64,
    pub reindexed: u64,
    pub failed: u64,
    /// Shutdown was observed before the candidate stream was exhausted.
    pub cancelled: bool,
}

impl MigrationSummary {
    fn new(started_at: Timestamp, cutoff: Timestamp) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at,
            cutoff,
            candidates: 0,
            archived: 0,
            already_archived: 0,
            reindexed: 0,
            failed: 0,
            cancelled: false,
        }
    }

    fn record(&mut self, outcome: &TierResult<RecordOutcome>) {
        self.candidates += 1;
        match outcome {
            Ok(RecordOutcome::Archived) => self.archived += 1,
            Ok(RecordOutcome::AlreadyArchived) => self.already_archived += 1,
            Ok(RecordOutcome::Reindexed) => self.reindexed += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// Records that are durably in the cold tier after this run.
    pub fn settled(&self) -> u64 {
        self.archived + self.already_archived + self.reindexed
    }
}

/// Batch job moving aged records from the hot to the cold tier.
#[derive(Clone)]
pub struct ArchivalMigrator {
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
    index: Arc<dyn LocationIndex>,
    config: ArchivalConfig,
}

impl ArchivalMigrator {
    pub fn new(
        hot: Arc<dyn HotStore>,
        cold: Arc<dyn ColdStore>,
        index: Arc<dyn LocationIndex>,
        config: ArchivalConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            hot,
            cold,
            index,
            config,
        })
    }

    pub fn config(&self) -> &ArchivalConfig {
        &self.config
    }

    /// Run one migration pass as of `now`.
    ///
    /// Stops pulling new candidates once `shutdown` reads `true`. Records
    /// already in flight finish all their steps first.
    pub async fn run(&self, now: Timestamp, shutdown: &watch::Receiver<bool>) -> MigrationSummary {
        let cutoff = self.config.cutoff(now);
        let mut summary = MigrationSummary::new(now, cutoff);
        let stopped = AtomicBool::new(false);

        tracing::info!(
            run_id = %summary.run_id,
            cutoff = %cutoff,
            concurrency = self.config.concurrency,
            "Archival run started"
        );

        let mut outcomes = self
            .hot
            .stale_records(cutoff)
            .take_while(|_| {
                let proceed = !*shutdown.borrow();
                if !proceed {
                    stopped.store(true, Ordering::Relaxed);
                }
                future::ready(proceed)
            })
            .map(|candidate| self.process(candidate, now))
            .buffer_unordered(self.config.concurrency);

        while let Some(outcome) = outcomes.next().await {
            summary.record(&outcome);
        }
        drop(outcomes);

        summary.cancelled = stopped.load(Ordering::Relaxed);
        tracing::info!(
            run_id = %summary.run_id,
            candidates = summary.candidates,
            archived = summary.archived,
            already_archived = summary.already_archived,
            reindexed = summary.reindexed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Archival run finished"
        );
        summary
    }

    async fn process(&self, candidate: TierResult<Record>, now: Timestamp) -> TierResult<RecordOutcome> {
        let record = match candidate {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, "Skipping unreadable migration candidate");
                return Err(e);
            }
        };

        let outcome = self.migrate(&record, now).await;
        match &outcome {
            Ok(result) => tracing::debug!(
                record_id = %record.id,
                outcome = ?result,
                "Record migrated"
            ),
            Err(e) => tracing::error!(
                record_id = %record.id,
                error = %e,
                "Record migration failed"
            ),
        }
        outcome
    }

    async fn migrate(&self, record: &Record, now: Timestamp) -> TierResult<RecordOutcome> {
        let outcome = if self.index.get(&record.id).await?.is_some() {
            RecordOutcome::AlreadyArchived
        } else {
            let cold_key = record.cold_key();
            let written = if self.cold.exists(&cold_key).await? {
                false
            } else {
                let body = encode_record(record)?;
                self.cold.put_if_absent(&cold_key, &body).await?
            };

            let entry = LocationEntry::new(record.id.clone(), cold_key, now);
            self.index.put(&entry).await?;

            if written {
                RecordOutcome::Archived
            } else {
                RecordOutcome::Reindexed
            }
        };

        self.retire(&record.id).await?;
        Ok(outcome)
    }

    async fn retire(&self, id: &RecordId) -> Result<(), TierError> {
        self.hot.retire(id, self.config.retire_ttl).await
    }
}
