//! Retry decorator for tier adapters.
//!
//! Wraps any tier adapter or [`ArchiveSource`] and retries retryable
//! [`TierError`]s with exponential backoff. Each attempt runs under
//! `attempt_timeout`; an attempt that overruns it counts as
//! [`TierError::Timeout`] and is retried like any transient failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use billvault_core::{
    ColdKey, LocationEntry, Record, RecordId, RetryConfig, Tier, TierError, TierResult, Timestamp,
};

use crate::tier::{ArchiveLookup, ArchiveSource, ColdStore, HotStore, LocationIndex, StalePage};

/// Retrying wrapper around a tier adapter.
pub struct Retrying<S: ?Sized> {
    inner: Arc<S>,
    config: RetryConfig,
}

impl<S: ?Sized> Retrying<S> {
    pub fn new(inner: Arc<S>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    tier: Tier,
    operation: &'static str,
    mut call: F,
) -> TierResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TierResult<T>>,
{
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(config.attempt_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(TierError::Timeout {
                tier,
                operation,
                after: config.attempt_timeout,
            }),
        };

        match result {
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                let delay = config.backoff_for(attempt);
                tracing::warn!(
                    tier = %tier,
                    operation = operation,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Tier call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        tier = %tier,
                        operation = operation,
                        attempts = attempt,
                        error = %e,
                        "Tier call failed, retries exhausted"
                    );
                }
                return Err(e);
            }
            Ok(value) => return Ok(value),
        }
    }
}

#[async_trait]
impl<S: HotStore + ?Sized> HotStore for Retrying<S> {
    async fn get(&self, id: &RecordId) -> TierResult<Option<Record>> {
        with_retry(&self.config, Tier::Hot, "get", || self.inner.get(id)).await
    }

    async fn put(&self, record: &Record) -> TierResult<()> {
        with_retry(&self.config, Tier::Hot, "put", || self.inner.put(record)).await
    }

    /// Each page is retried on its own; the default `stale_records` cursor
    /// pages through this method, so a transient blip costs one page refetch.
    async fn stale_page(
        &self,
        cutoff: Timestamp,
        after: Option<RecordId>,
    ) -> TierResult<StalePage> {
        with_retry(&self.config, Tier::Hot, "stale_page", || {
            self.inner.stale_page(cutoff, after.clone())
        })
        .await
    }

    async fn retire(&self, id: &RecordId, ttl: Duration) -> TierResult<()> {
        with_retry(&self.config, Tier::Hot, "retire", || {
            self.inner.retire(id, ttl)
        })
        .await
    }

    async fn expiry(&self, id: &RecordId) -> TierResult<Option<Timestamp>> {
        with_retry(&self.config, Tier::Hot, "expiry", || self.inner.expiry(id)).await
    }

    async fn reap_expired(&self, now: Timestamp) -> TierResult<u64> {
        with_retry(&self.config, Tier::Hot, "reap_expired", || {
            self.inner.reap_expired(now)
        })
        .await
    }
}

#[async_trait]
impl<S: ColdStore + ?Sized> ColdStore for Retrying<S> {
    async fn exists(&self, key: &ColdKey) -> TierResult<bool> {
        with_retry(&self.config, Tier::Cold, "exists", || self.inner.exists(key)).await
    }

    /// A retry after a timed-out attempt that did land reports `false`; the
    /// object is intact either way.
    async fn put_if_absent(&self, key: &ColdKey, body: &[u8]) -> TierResult<bool> {
        with_retry(&self.config, Tier::Cold, "put_if_absent", || {
            self.inner.put_if_absent(key, body)
        })
        .await
    }

    async fn get(&self, key: &ColdKey) -> TierResult<Option<Vec<u8>>> {
        with_retry(&self.config, Tier::Cold, "get", || self.inner.get(key)).await
    }
}

#[async_trait]
impl<S: LocationIndex + ?Sized> LocationIndex for Retrying<S> {
    async fn put(&self, entry: &LocationEntry) -> TierResult<bool> {
        with_retry(&self.config, Tier::Index, "put", || self.inner.put(entry)).await
    }

    async fn get(&self, id: &RecordId) -> TierResult<Option<LocationEntry>> {
        with_retry(&self.config, Tier::Index, "get", || self.inner.get(id)).await
    }
}

#[async_trait]
impl<S: ArchiveSource + ?Sized> ArchiveSource for Retrying<S> {
    async fn fetch(&self, id: &RecordId) -> TierResult<ArchiveLookup> {
        with_retry(&self.config, Tier::Cold, "fetch", || self.inner.fetch(id)).await
    }
}
