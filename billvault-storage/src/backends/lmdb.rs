//! LMDB-backed hot store and location index.
//!
//! Uses the heed crate (Rust bindings for LMDB). Values are JSON so the
//! record payload keeps its field order across a round trip.
//!
//! # Transactions
//!
//! - Point reads use a read transaction.
//! - Insert-if-absent, retire and reap run the check and the write inside one
//!   write transaction. LMDB serialises writers, so the check cannot race.
//! - The stale-record cursor opens a fresh read transaction per page; no
//!   transaction is held across an await point.
//! - Reaping walks the table in bounded batches, one write transaction each.

use std::ops::Bound;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use billvault_core::{LocationEntry, Record, RecordId, Tier, TierError, TierResult, Timestamp};
use chrono::Utc;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use serde::{Deserialize, Serialize};

use crate::cursor::PAGE_SIZE;
use crate::tier::{HotStore, LocationIndex, StalePage};

/// Error type for opening an LMDB environment.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn open_env(
    path: &Path,
    max_size_mb: usize,
    name: &str,
) -> Result<(Env, Database<Str, Bytes>), LmdbStoreError> {
    std::fs::create_dir_all(path)?;

    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(max_size_mb * 1024 * 1024)
            .max_dbs(1)
            .open(path)
    }
    .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

    let mut wtxn = env
        .write_txn()
        .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
    let db: Database<Str, Bytes> = env
        .create_database(&mut wtxn, Some(name))
        .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
    wtxn.commit()
        .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

    Ok((env, db))
}

/// Stored keys are written from a `RecordId`, so a key that no longer parses
/// means the table itself is damaged.
fn resume_key(key: String) -> TierResult<RecordId> {
    RecordId::parse(key.clone()).map_err(|e| TierError::corrupt(Tier::Hot, key, e))
}

fn txn_err(tier: Tier, operation: &'static str) -> impl Fn(heed::Error) -> TierError {
    move |e| TierError::transient(tier, operation, e)
}

// ============================================================================
// HOT STORE
// ============================================================================

/// Stored shape of a hot item: the record plus its expiry attribute.
#[derive(Debug, Serialize, Deserialize)]
struct StoredItem {
    record: Record,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<Timestamp>,
}

impl StoredItem {
    fn decode(key: &str, bytes: &[u8]) -> TierResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| TierError::corrupt(Tier::Hot, key, e))
    }

    fn encode(&self) -> TierResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| TierError::corrupt(Tier::Hot, self.record.id.as_str(), e))
    }

    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Durable hot tier on LMDB.
///
/// LMDB has no native TTL, so expiry is an attribute checked on read and
/// enforced by [`HotStore::reap_expired`].
pub struct LmdbHotStore {
    env: Env,
    db: Database<Str, Bytes>,
}

impl LmdbHotStore {
    /// Open or create the hot store at `path`.
    pub fn open(path: impl AsRef<Path>, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let (env, db) = open_env(path.as_ref(), max_size_mb, "hot")?;
        Ok(Self { env, db })
    }

    fn read_item(&self, id: &RecordId, operation: &'static str) -> TierResult<Option<StoredItem>> {
        let rtxn = self.env.read_txn().map_err(txn_err(Tier::Hot, operation))?;
        match self
            .db
            .get(&rtxn, id.as_str())
            .map_err(txn_err(Tier::Hot, operation))?
        {
            Some(bytes) => StoredItem::decode(id.as_str(), bytes).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl HotStore for LmdbHotStore {
    async fn get(&self, id: &RecordId) -> TierResult<Option<Record>> {
        let now = Utc::now();
        Ok(self
            .read_item(id, "get")?
            .filter(|item| !item.is_expired(now))
            .map(|item| item.record))
    }

    async fn put(&self, record: &Record) -> TierResult<()> {
        let bytes = StoredItem {
            record: record.clone(),
            expires_at: None,
        }
        .encode()?;

        let mut wtxn = self.env.write_txn().map_err(txn_err(Tier::Hot, "put"))?;
        self.db
            .put(&mut wtxn, record.id.as_str(), &bytes)
            .map_err(txn_err(Tier::Hot, "put"))?;
        wtxn.commit().map_err(txn_err(Tier::Hot, "put"))
    }

    async fn stale_page(
        &self,
        cutoff: Timestamp,
        after: Option<RecordId>,
    ) -> TierResult<StalePage> {
        let op = "stale_page";
        let rtxn = self.env.read_txn().map_err(txn_err(Tier::Hot, op))?;
        let lower = match &after {
            Some(id) => Bound::Excluded(id.as_str()),
            None => Bound::Unbounded,
        };
        let range = (lower, Bound::<&str>::Unbounded);
        let iter = self
            .db
            .range(&rtxn, &range)
            .map_err(txn_err(Tier::Hot, op))?;

        let now = Utc::now();
        let mut items = Vec::new();
        let mut scanned = 0;
        let mut last = None;
        for entry in iter.take(PAGE_SIZE) {
            let (key, bytes) = entry.map_err(txn_err(Tier::Hot, op))?;
            scanned += 1;
            last = Some(key.to_string());
            match StoredItem::decode(key, bytes) {
                Ok(item) if item.record.is_older_than(cutoff) && !item.is_expired(now) => {
                    items.push(Ok(item.record))
                }
                Ok(_) => {}
                Err(e) => items.push(Err(e)),
            }
        }

        let resume_after = match last {
            Some(key) if scanned == PAGE_SIZE => Some(resume_key(key)?),
            _ => None,
        };
        Ok(StalePage {
            items,
            resume_after,
        })
    }

    async fn retire(&self, id: &RecordId, ttl: Duration) -> TierResult<()> {
        let expires_at = chrono::Duration::from_std(ttl)
            .map(|ttl| Utc::now() + ttl)
            .map_err(|e| TierError::transient(Tier::Hot, "retire", e))?;

        let mut wtxn = self.env.write_txn().map_err(txn_err(Tier::Hot, "retire"))?;
        let existing = self
            .db
            .get(&wtxn, id.as_str())
            .map_err(txn_err(Tier::Hot, "retire"))?
            .map(|bytes| StoredItem::decode(id.as_str(), bytes))
            .transpose()?;

        let Some(mut item) = existing else {
            return Ok(());
        };
        if item.expires_at.is_some_and(|at| at <= expires_at) {
            return Ok(());
        }
        item.expires_at = Some(expires_at);
        let bytes = item.encode()?;
        self.db
            .put(&mut wtxn, id.as_str(), &bytes)
            .map_err(txn_err(Tier::Hot, "retire"))?;
        wtxn.commit().map_err(txn_err(Tier::Hot, "retire"))
    }

    async fn expiry(&self, id: &RecordId) -> TierResult<Option<Timestamp>> {
        Ok(self
            .read_item(id, "expiry")?
            .and_then(|item| item.expires_at))
    }

    /// Reaps in batches of at most [`PAGE_SIZE`] keys, one write transaction
    /// per batch, so writers are never blocked for a whole-table scan.
    /// Undecodable items are left in place for the stale-record scan to report.
    async fn reap_expired(&self, now: Timestamp) -> TierResult<u64> {
        let op = "reap_expired";
        let mut deleted = 0u64;
        let mut after: Option<String> = None;

        loop {
            let mut wtxn = self.env.write_txn().map_err(txn_err(Tier::Hot, op))?;

            let mut expired = Vec::new();
            let mut scanned = 0;
            let mut last = None;
            {
                let lower = match &after {
                    Some(key) => Bound::Excluded(key.as_str()),
                    None => Bound::Unbounded,
                };
                let range = (lower, Bound::<&str>::Unbounded);
                let iter = self
                    .db
                    .range(&wtxn, &range)
                    .map_err(txn_err(Tier::Hot, op))?;
                for entry in iter.take(PAGE_SIZE) {
                    let (key, bytes) = entry.map_err(txn_err(Tier::Hot, op))?;
                    scanned += 1;
                    last = Some(key.to_string());
                    if StoredItem::decode(key, bytes).is_ok_and(|item| item.is_expired(now)) {
                        expired.push(key.to_string());
                    }
                }
            }

            for key in &expired {
                if self
                    .db
                    .delete(&mut wtxn, key)
                    .map_err(txn_err(Tier::Hot, op))?
                {
                    deleted += 1;
                }
            }
            wtxn.commit().map_err(txn_err(Tier::Hot, op))?;

            if scanned < PAGE_SIZE {
                return Ok(deleted);
            }
            after = last;
        }
    }
}

// ============================================================================
// LOCATION INDEX
// ============================================================================

/// Durable location index on LMDB.
pub struct LmdbLocationIndex {
    env: Env,
    db: Database<Str, Bytes>,
}

impl LmdbLocationIndex {
    /// Open or create the index at `path`.
    pub fn open(path: impl AsRef<Path>, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let (env, db) = open_env(path.as_ref(), max_size_mb, "locations")?;
        Ok(Self { env, db })
    }
}

#[async_trait]
impl LocationIndex for LmdbLocationIndex {
    async fn put(&self, entry: &LocationEntry) -> TierResult<bool> {
        let bytes = serde_json::to_vec(entry)
            .map_err(|e| TierError::corrupt(Tier::Index, entry.id.as_str(), e))?;

        let mut wtxn = self.env.write_txn().map_err(txn_err(Tier::Index, "put"))?;
        let present = self
            .db
            .get(&wtxn, entry.id.as_str())
            .map_err(txn_err(Tier::Index, "put"))?
            .is_some();
        if present {
            return Ok(false);
        }

        self.db
            .put(&mut wtxn, entry.id.as_str(), &bytes)
            .map_err(txn_err(Tier::Index, "put"))?;
        wtxn.commit().map_err(txn_err(Tier::Index, "put"))?;
        Ok(true)
    }

    async fn get(&self, id: &RecordId) -> TierResult<Option<LocationEntry>> {
        let rtxn = self.env.read_txn().map_err(txn_err(Tier::Index, "get"))?;
        match self
            .db
            .get(&rtxn, id.as_str())
            .map_err(txn_err(Tier::Index, "get"))?
        {
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| TierError::corrupt(Tier::Index, id.as_str(), e)),
            None => Ok(None),
        }
    }
}
