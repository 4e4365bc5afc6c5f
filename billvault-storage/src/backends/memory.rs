//! In-memory tier implementations.
//!
//! Thread-safe fakes with the same semantics as the durable backends, used by
//! tests and by local development.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use billvault_core::{
    ColdKey, LocationEntry, Record, RecordId, Tier, TierError, TierResult, Timestamp,
};
use chrono::Utc;

use crate::cursor::PAGE_SIZE;
use crate::tier::{ColdStore, HotStore, LocationIndex, StalePage};

fn poisoned(tier: Tier, operation: &'static str) -> TierError {
    TierError::transient(tier, operation, "lock poisoned")
}

fn expiry_after(ttl: Duration) -> TierResult<Timestamp> {
    chrono::Duration::from_std(ttl)
        .map(|ttl| Utc::now() + ttl)
        .map_err(|e| TierError::transient(Tier::Hot, "retire", e))
}

// ============================================================================
// HOT STORE
// ============================================================================

#[derive(Debug, Clone)]
struct HotItem {
    record: Record,
    expires_at: Option<Timestamp>,
}

impl HotItem {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory hot tier. Expired items stay in the map until reaped.
#[derive(Debug, Default)]
pub struct InMemoryHotStore {
    items: Arc<RwLock<BTreeMap<RecordId, HotItem>>>,
}

impl InMemoryHotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items physically present, expired or not.
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HotStore for InMemoryHotStore {
    async fn get(&self, id: &RecordId) -> TierResult<Option<Record>> {
        let items = self.items.read().map_err(|_| poisoned(Tier::Hot, "get"))?;
        let now = Utc::now();
        Ok(items
            .get(id)
            .filter(|item| !item.is_expired(now))
            .map(|item| item.record.clone()))
    }

    async fn put(&self, record: &Record) -> TierResult<()> {
        let mut items = self.items.write().map_err(|_| poisoned(Tier::Hot, "put"))?;
        items.insert(
            record.id.clone(),
            HotItem {
                record: record.clone(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn stale_page(
        &self,
        cutoff: Timestamp,
        after: Option<RecordId>,
    ) -> TierResult<StalePage> {
        let items = self
            .items
            .read()
            .map_err(|_| poisoned(Tier::Hot, "stale_page"))?;
        let lower = match &after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };

        let now = Utc::now();
        let mut stale = Vec::new();
        let mut scanned = 0;
        let mut last = None;
        for (id, item) in items.range((lower, Bound::Unbounded)).take(PAGE_SIZE) {
            scanned += 1;
            last = Some(id.clone());
            if item.record.is_older_than(cutoff) && !item.is_expired(now) {
                stale.push(Ok(item.record.clone()));
            }
        }

        Ok(StalePage {
            items: stale,
            resume_after: if scanned == PAGE_SIZE { last } else { None },
        })
    }

    async fn retire(&self, id: &RecordId, ttl: Duration) -> TierResult<()> {
        let expires_at = expiry_after(ttl)?;
        let mut items = self
            .items
            .write()
            .map_err(|_| poisoned(Tier::Hot, "retire"))?;
        if let Some(item) = items.get_mut(id) {
            // Never push an earlier expiry further out.
            if item.expires_at.map_or(true, |at| expires_at < at) {
                item.expires_at = Some(expires_at);
            }
        }
        Ok(())
    }

    async fn expiry(&self, id: &RecordId) -> TierResult<Option<Timestamp>> {
        let items = self
            .items
            .read()
            .map_err(|_| poisoned(Tier::Hot, "expiry"))?;
        Ok(items.get(id).and_then(|item| item.expires_at))
    }

    async fn reap_expired(&self, now: Timestamp) -> TierResult<u64> {
        let mut items = self
            .items
            .write()
            .map_err(|_| poisoned(Tier::Hot, "reap_expired"))?;
        let before = items.len();
        items.retain(|_, item| !item.is_expired(now));
        Ok((before - items.len()) as u64)
    }
}

// ============================================================================
// COLD STORE
// ============================================================================

/// In-memory cold tier keyed by [`ColdKey`].
#[derive(Debug, Default)]
pub struct InMemoryColdStore {
    objects: RwLock<HashMap<ColdKey, Vec<u8>>>,
}

impl InMemoryColdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop an object out from under the index, as an external deletion would.
    pub fn remove(&self, key: &ColdKey) -> bool {
        self.objects
            .write()
            .map(|mut objects| objects.remove(key).is_some())
            .unwrap_or(false)
    }

    /// All objects, sorted by key.
    pub fn snapshot(&self) -> Vec<(ColdKey, Vec<u8>)> {
        let mut objects: Vec<_> = self
            .objects
            .read()
            .map(|objects| objects.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        objects.sort_by(|a, b| a.0.cmp(&b.0));
        objects
    }
}

#[async_trait]
impl ColdStore for InMemoryColdStore {
    async fn exists(&self, key: &ColdKey) -> TierResult<bool> {
        let objects = self
            .objects
            .read()
            .map_err(|_| poisoned(Tier::Cold, "exists"))?;
        Ok(objects.contains_key(key))
    }

    async fn put_if_absent(&self, key: &ColdKey, body: &[u8]) -> TierResult<bool> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| poisoned(Tier::Cold, "put_if_absent"))?;
        if objects.contains_key(key) {
            return Ok(false);
        }
        objects.insert(key.clone(), body.to_vec());
        Ok(true)
    }

    async fn get(&self, key: &ColdKey) -> TierResult<Option<Vec<u8>>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| poisoned(Tier::Cold, "get"))?;
        Ok(objects.get(key).cloned())
    }
}

// ============================================================================
// LOCATION INDEX
// ============================================================================

/// In-memory location index.
#[derive(Debug, Default)]
pub struct InMemoryLocationIndex {
    entries: RwLock<HashMap<RecordId, LocationEntry>>,
}

impl InMemoryLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, sorted by id.
    pub fn snapshot(&self) -> Vec<LocationEntry> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }
}

#[async_trait]
impl LocationIndex for InMemoryLocationIndex {
    async fn put(&self, entry: &LocationEntry) -> TierResult<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| poisoned(Tier::Index, "put"))?;
        if entries.contains_key(&entry.id) {
            return Ok(false);
        }
        entries.insert(entry.id.clone(), entry.clone());
        Ok(true)
    }

    async fn get(&self, id: &RecordId) -> TierResult<Option<LocationEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| poisoned(Tier::Index, "get"))?;
        Ok(entries.get(id).cloned())
    }
}
