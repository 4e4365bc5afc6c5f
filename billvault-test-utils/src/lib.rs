//! billvault Test Utilities
//!
//! Shared test infrastructure for the billvault workspace:
//! - Fixtures for billing records and in-memory tier sets
//! - Proptest generators for ids, payloads and hot-tier populations
//! - Fault-injecting tier wrappers

// Re-export core types for convenience
pub use billvault_core::{
    ArchivalConfig, ColdKey, LocationEntry, Payload, Record, RecordId, RetryConfig, Tier,
    TierError, TierResult, Timestamp,
};
pub use billvault_storage::{
    ArchivalMigrator, ColdStore, HotStore, InMemoryColdStore, InMemoryHotStore,
    InMemoryLocationIndex, IndexedArchive, LocationIndex, StalePage, TieredReader,
};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

// ============================================================================
// FIXTURES
// ============================================================================

/// Parse an RFC 3339 timestamp, panicking on bad input.
pub fn ts(value: &str) -> Timestamp {
    value
        .parse()
        .unwrap_or_else(|e| panic!("invalid timestamp {value:?}: {e}"))
}

/// Parse a record id, panicking on bad input.
pub fn record_id(value: &str) -> RecordId {
    RecordId::parse(value).unwrap_or_else(|e| panic!("invalid record id {value:?}: {e}"))
}

/// A billing record with a single `amount` field.
pub fn billing_record(id: &str, created_at: &str, amount: i64) -> Record {
    let mut payload = Payload::new();
    payload.insert("amount".to_string(), json!(amount));
    Record::new(record_id(id), ts(created_at), payload)
}

/// The reference record: `abc123`, created 2024-01-01, amount 42.
pub fn abc123() -> Record {
    billing_record("abc123", "2024-01-01T00:00:00Z", 42)
}

/// "Now" for the reference migration run.
pub fn reference_now() -> Timestamp {
    ts("2024-05-01T00:00:00Z")
}

/// In-memory hot tier, cold tier and index wired together.
pub struct TierSet {
    pub hot: Arc<InMemoryHotStore>,
    pub cold: Arc<InMemoryColdStore>,
    pub index: Arc<InMemoryLocationIndex>,
}

impl TierSet {
    pub fn in_memory() -> Self {
        Self {
            hot: Arc::new(InMemoryHotStore::new()),
            cold: Arc::new(InMemoryColdStore::new()),
            index: Arc::new(InMemoryLocationIndex::new()),
        }
    }

    pub fn migrator(&self, config: ArchivalConfig) -> ArchivalMigrator {
        self.migrator_with_cold(self.cold.clone(), config)
    }

    /// Migrator writing through a different cold store handle, e.g. a
    /// [`FaultyColdStore`] wrapping `self.cold`.
    pub fn migrator_with_cold(
        &self,
        cold: Arc<dyn ColdStore>,
        config: ArchivalConfig,
    ) -> ArchivalMigrator {
        ArchivalMigrator::new(self.hot.clone(), cold, self.index.clone(), config)
            .unwrap_or_else(|e| panic!("invalid archival config: {e}"))
    }

    pub fn reader(&self) -> TieredReader {
        let archive = IndexedArchive::new(self.index.clone(), self.cold.clone());
        TieredReader::new(self.hot.clone(), Arc::new(archive))
    }

    /// Seed the hot tier.
    pub async fn seed(&self, records: &[Record]) {
        for record in records {
            self.hot
                .put(record)
                .await
                .unwrap_or_else(|e| panic!("seeding hot tier failed: {e}"));
        }
    }

    /// Reap everything whose expiry has passed by `ttl` from now.
    pub async fn reap_after(&self, ttl: Duration) -> u64 {
        let later = chrono::Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|e| panic!("bad ttl: {e}"))
            + chrono::Duration::seconds(1);
        self.hot
            .reap_expired(later)
            .await
            .unwrap_or_else(|e| panic!("reap failed: {e}"))
    }
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// Cold store wrapper that counts writes and fails them for chosen ids.
pub struct FaultyColdStore {
    inner: Arc<dyn ColdStore>,
    failing: RwLock<HashSet<String>>,
    writes: AtomicU64,
}

impl FaultyColdStore {
    pub fn new(inner: Arc<dyn ColdStore>) -> Self {
        Self {
            inner,
            failing: RwLock::new(HashSet::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Make every write for `id` fail with a transient error.
    pub fn fail_writes_for(&self, id: &RecordId) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(format!("/{}.json", id));
        }
    }

    /// Writes that reached the inner store.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn should_fail(&self, key: &ColdKey) -> bool {
        self.failing
            .read()
            .map(|failing| failing.iter().any(|suffix| key.as_str().ends_with(suffix)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ColdStore for FaultyColdStore {
    async fn exists(&self, key: &ColdKey) -> TierResult<bool> {
        self.inner.exists(key).await
    }

    async fn put_if_absent(&self, key: &ColdKey, body: &[u8]) -> TierResult<bool> {
        if self.should_fail(key) {
            return Err(TierError::transient(
                Tier::Cold,
                "put_if_absent",
                "injected failure",
            ));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_if_absent(key, body).await
    }

    async fn get(&self, key: &ColdKey) -> TierResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }
}

/// Hot store wrapper that fails candidate pages and garbles chosen items.
pub struct FlakyHotStore {
    inner: Arc<dyn HotStore>,
    page_failures: AtomicU32,
    page_calls: AtomicU32,
    corrupt: RwLock<HashSet<RecordId>>,
}

impl FlakyHotStore {
    pub fn new(inner: Arc<dyn HotStore>) -> Self {
        Self {
            inner,
            page_failures: AtomicU32::new(0),
            page_calls: AtomicU32::new(0),
            corrupt: RwLock::new(HashSet::new()),
        }
    }

    /// Fail the next `count` page fetches with a transient error.
    pub fn fail_next_pages(&self, count: u32) {
        self.page_failures.store(count, Ordering::SeqCst);
    }

    /// Report `id` as undecodable whenever a page would yield it.
    pub fn corrupt(&self, id: &RecordId) {
        if let Ok(mut corrupt) = self.corrupt.write() {
            corrupt.insert(id.clone());
        }
    }

    /// Page fetches attempted, failed ones included.
    pub fn page_calls(&self) -> u32 {
        self.page_calls.load(Ordering::SeqCst)
    }

    fn is_corrupt(&self, id: &RecordId) -> bool {
        self.corrupt
            .read()
            .map(|corrupt| corrupt.contains(id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl HotStore for FlakyHotStore {
    async fn get(&self, id: &RecordId) -> TierResult<Option<Record>> {
        self.inner.get(id).await
    }

    async fn put(&self, record: &Record) -> TierResult<()> {
        self.inner.put(record).await
    }

    async fn stale_page(
        &self,
        cutoff: Timestamp,
        after: Option<RecordId>,
    ) -> TierResult<StalePage> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .page_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TierError::transient(
                Tier::Hot,
                "stale_page",
                "injected failure",
            ));
        }

        let mut page = self.inner.stale_page(cutoff, after).await?;
        for item in &mut page.items {
            let garbled = match item {
                Ok(record) if self.is_corrupt(&record.id) => Some(record.id.to_string()),
                _ => None,
            };
            if let Some(key) = garbled {
                *item = Err(TierError::corrupt(Tier::Hot, key, "injected garbage"));
            }
        }
        Ok(page)
    }

    async fn retire(&self, id: &RecordId, ttl: Duration) -> TierResult<()> {
        self.inner.retire(id, ttl).await
    }

    async fn expiry(&self, id: &RecordId) -> TierResult<Option<Timestamp>> {
        self.inner.expiry(id).await
    }

    async fn reap_expired(&self, now: Timestamp) -> TierResult<u64> {
        self.inner.reap_expired(now).await
    }
}

/// Hot store whose every call fails with a transient error.
pub struct UnavailableHotStore;

impl UnavailableHotStore {
    fn down<T>(operation: &'static str) -> TierResult<T> {
        Err(TierError::transient(Tier::Hot, operation, "connection refused"))
    }
}

#[async_trait]
impl HotStore for UnavailableHotStore {
    async fn get(&self, _id: &RecordId) -> TierResult<Option<Record>> {
        Self::down("get")
    }

    async fn put(&self, _record: &Record) -> TierResult<()> {
        Self::down("put")
    }

    async fn stale_page(
        &self,
        _cutoff: Timestamp,
        _after: Option<RecordId>,
    ) -> TierResult<StalePage> {
        Self::down("stale_page")
    }

    async fn retire(&self, _id: &RecordId, _ttl: Duration) -> TierResult<()> {
        Self::down("retire")
    }

    async fn expiry(&self, _id: &RecordId) -> TierResult<Option<Timestamp>> {
        Self::down("expiry")
    }

    async fn reap_expired(&self, _now: Timestamp) -> TierResult<u64> {
        Self::down("reap_expired")
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for billvault types.

    use super::*;
    use proptest::collection::{btree_map, vec};
    use proptest::prelude::*;

    /// Valid record ids: URL-safe, never `.`/`..`.
    pub fn arb_record_id() -> impl Strategy<Value = RecordId> {
        "[A-Za-z0-9_-][A-Za-z0-9._-]{0,23}".prop_map(|s| record_id(&s))
    }

    /// Creation timestamps between 2020 and 2026, whole seconds.
    pub fn arb_created_at() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800i64..1_767_225_600i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0)
                .unwrap_or_else(|| panic!("timestamp out of range: {secs}"))
        })
    }

    /// Flat JSON payloads; keys never collide with `id` or `createdAt`.
    pub fn arb_payload() -> impl Strategy<Value = Payload> {
        let value = prop_oneof![
            any::<i64>().prop_map(|n| json!(n)),
            "[ -~]{0,16}".prop_map(|s| json!(s)),
            any::<bool>().prop_map(|b| json!(b)),
            Just(serde_json::Value::Null),
        ];
        let key = "[a-z][a-z_]{0,11}".prop_filter("reserved field", |k| k != "id");
        btree_map(key, value, 0..5)
            .prop_map(|fields| fields.into_iter().collect::<Payload>())
    }

    pub fn arb_record() -> impl Strategy<Value = Record> {
        (arb_record_id(), arb_created_at(), arb_payload())
            .prop_map(|(id, created_at, payload)| Record::new(id, created_at, payload))
    }

    /// Hot-tier population with unique ids.
    pub fn arb_population(max: usize) -> impl Strategy<Value = Vec<Record>> {
        vec(arb_record(), 0..max).prop_map(|records| {
            let mut seen = HashSet::new();
            records
                .into_iter()
                .filter(|r| seen.insert(r.id.clone()))
                .collect()
        })
    }
}
