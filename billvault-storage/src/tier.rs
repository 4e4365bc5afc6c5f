//! Adapter contracts for the hot tier, the cold tier and the location index.
//!
//! Lookups answer `Ok(None)` for "not found", which is an expected outcome
//! and never an error. Every `Err` is a [`TierError`] the caller can inspect
//! for retryability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use billvault_core::{
    ColdKey, LocationEntry, Record, RecordId, Tier, TierError, TierResult, Timestamp,
};
use futures_util::stream::BoxStream;

use crate::cursor::paged;

// ============================================================================
// HOT TIER
// ============================================================================

/// One page of a stale-record scan.
#[derive(Debug)]
pub struct StalePage {
    /// Matching records on this page, with undecodable items as errors.
    pub items: Vec<TierResult<Record>>,
    /// Last key scanned when the page was full, `None` once the scan is done.
    pub resume_after: Option<RecordId>,
}

/// Low-latency store holding live records, with a per-item expiry attribute.
#[async_trait]
pub trait HotStore: Send + Sync {
    /// Point read. Items past their expiry are invisible even before they are
    /// physically reaped.
    async fn get(&self, id: &RecordId) -> TierResult<Option<Record>>;

    /// Insert or replace a live record. Clears any expiry.
    async fn put(&self, record: &Record) -> TierResult<()>;

    /// One page of unexpired records with `created_at < cutoff`, scanning
    /// keys strictly after `after` in key order.
    ///
    /// An item that cannot be decoded is reported in place as
    /// [`TierError::Corrupt`] and the scan moves past it.
    async fn stale_page(&self, cutoff: Timestamp, after: Option<RecordId>)
        -> TierResult<StalePage>;

    /// Lazy cursor over [`HotStore::stale_page`]. The full candidate set is
    /// never held in memory at once. A failed page ends the stream with that
    /// error.
    fn stale_records(&self, cutoff: Timestamp) -> BoxStream<'_, TierResult<Record>> {
        let store = self;
        paged(move |after| store.stale_page(cutoff, after))
    }

    /// Mark the record for removal `ttl` from now. Never deletes directly.
    async fn retire(&self, id: &RecordId, ttl: Duration) -> TierResult<()>;

    /// Current expiry attribute, `None` while the record is live or absent.
    async fn expiry(&self, id: &RecordId) -> TierResult<Option<Timestamp>>;

    /// Physically remove items whose expiry is at or before `now`.
    async fn reap_expired(&self, now: Timestamp) -> TierResult<u64>;
}

// ============================================================================
// COLD TIER
// ============================================================================

/// Durable object store addressed by [`ColdKey`].
#[async_trait]
pub trait ColdStore: Send + Sync {
    async fn exists(&self, key: &ColdKey) -> TierResult<bool>;

    /// Write `body` at `key` unless an object is already there.
    ///
    /// Returns `true` when this call created the object. An existing object is
    /// never overwritten and a partially written one is never visible.
    async fn put_if_absent(&self, key: &ColdKey, body: &[u8]) -> TierResult<bool>;

    async fn get(&self, key: &ColdKey) -> TierResult<Option<Vec<u8>>>;
}

// ============================================================================
// LOCATION INDEX
// ============================================================================

/// Durable `id -> cold key` mapping written by the migrator.
#[async_trait]
pub trait LocationIndex: Send + Sync {
    /// Insert-if-absent. Returns `true` when the entry was created; an
    /// existing entry for the same id is left untouched.
    async fn put(&self, entry: &LocationEntry) -> TierResult<bool>;

    async fn get(&self, id: &RecordId) -> TierResult<Option<LocationEntry>>;
}

// ============================================================================
// ARCHIVE LOOKUP
// ============================================================================

/// Result of resolving a record through the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveLookup {
    /// Raw object body as stored in the cold tier.
    Found(Vec<u8>),
    /// No location entry for this id.
    NoEntry,
    /// The index points at a cold object that does not exist.
    MissingObject { cold_key: ColdKey },
}

/// Cold fallback used by the tiered reader.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    async fn fetch(&self, id: &RecordId) -> TierResult<ArchiveLookup>;
}

/// Archive resolution through a local [`LocationIndex`] and [`ColdStore`].
pub struct IndexedArchive<I: ?Sized, C: ?Sized> {
    index: Arc<I>,
    cold: Arc<C>,
}

impl<I: ?Sized, C: ?Sized> IndexedArchive<I, C> {
    pub fn new(index: Arc<I>, cold: Arc<C>) -> Self {
        Self { index, cold }
    }
}

#[async_trait]
impl<I, C> ArchiveSource for IndexedArchive<I, C>
where
    I: LocationIndex + ?Sized,
    C: ColdStore + ?Sized,
{
    async fn fetch(&self, id: &RecordId) -> TierResult<ArchiveLookup> {
        let Some(entry) = self.index.get(id).await? else {
            return Ok(ArchiveLookup::NoEntry);
        };

        match self.cold.get(&entry.cold_key).await? {
            Some(body) => Ok(ArchiveLookup::Found(body)),
            None => Ok(ArchiveLookup::MissingObject {
                cold_key: entry.cold_key,
            }),
        }
    }
}

/// Encode a record for storage, reporting failures against the hot tier.
pub(crate) fn encode_record(record: &Record) -> TierResult<Vec<u8>> {
    record
        .to_json_bytes()
        .map_err(|e| TierError::corrupt(Tier::Hot, record.id.as_str(), e))
}
