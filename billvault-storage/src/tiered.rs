//! Tiered read path.
//!
//! ```text
//! HOT_LOOKUP ─ hit ─────────────────────────────► FOUND(hot)
//!     └ miss ► ARCHIVE ─ no entry ──────────────► NOT_FOUND
//!                 ├ entry, object ──────────────► FOUND(cold)
//!                 └ entry, no object ───────────► NOT_FOUND (inconsistency)
//! ```
//!
//! Any tier error short-circuits to `Err`, which callers never treat as a
//! miss.

use std::sync::Arc;

use billvault_core::{ColdKey, RecordId, Tier, TierResult};

use crate::tier::{encode_record, ArchiveLookup, ArchiveSource, HotStore};

/// Why a read came back empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Miss {
    /// Neither tier nor the index knows the id.
    Unknown,
    /// The index points at a cold object that is gone.
    IndexInconsistency { cold_key: ColdKey },
}

/// Terminal state of a single read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Canonical JSON body and the tier that served it.
    Found { tier: Tier, body: Vec<u8> },
    NotFound(Miss),
}

impl ReadOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

/// Reads a record from whichever tier holds it.
///
/// Holds only shared, read-only handles; safe to call from many requests at
/// once.
#[derive(Clone)]
pub struct TieredReader {
    hot: Arc<dyn HotStore>,
    archive: Arc<dyn ArchiveSource>,
}

impl TieredReader {
    pub fn new(hot: Arc<dyn HotStore>, archive: Arc<dyn ArchiveSource>) -> Self {
        Self { hot, archive }
    }

    pub async fn read(&self, id: &RecordId) -> TierResult<ReadOutcome> {
        if let Some(record) = self.hot.get(id).await? {
            tracing::debug!(record_id = %id, "Served from hot tier");
            return Ok(ReadOutcome::Found {
                tier: Tier::Hot,
                body: encode_record(&record)?,
            });
        }

        match self.archive.fetch(id).await? {
            ArchiveLookup::Found(body) => {
                tracing::debug!(record_id = %id, "Served from cold tier");
                Ok(ReadOutcome::Found {
                    tier: Tier::Cold,
                    body,
                })
            }
            ArchiveLookup::NoEntry => {
                tracing::debug!(record_id = %id, "Record not found in any tier");
                Ok(ReadOutcome::NotFound(Miss::Unknown))
            }
            ArchiveLookup::MissingObject { cold_key } => {
                tracing::warn!(
                    record_id = %id,
                    cold_key = %cold_key,
                    "location index points at a missing cold object"
                );
                Ok(ReadOutcome::NotFound(Miss::IndexInconsistency { cold_key }))
            }
        }
    }
}
