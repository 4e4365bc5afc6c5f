//! Hot-Tier Expiry Reaper
//!
//! Retired hot copies carry an expiry but stay physically present until
//! something deletes them. This task plays the part of the hot tier's native
//! TTL deletion for backends that have none.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use billvault_storage::HotStore;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Default)]
pub struct HotExpiryMetrics {
    pub cycles: AtomicU64,
    pub reaped: AtomicU64,
    pub errors: AtomicU64,
}

impl HotExpiryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HotExpirySnapshot {
        HotExpirySnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            reaped: self.reaped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotExpirySnapshot {
    pub cycles: u64,
    pub reaped: u64,
    pub errors: u64,
}

/// Reap expired hot items every `period` until shutdown.
pub async fn hot_expiry_task(
    hot: Arc<dyn HotStore>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<HotExpiryMetrics> {
    let metrics = Arc::new(HotExpiryMetrics::new());

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(period_secs = period.as_secs(), "Hot expiry task started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Hot expiry task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                metrics.cycles.fetch_add(1, Ordering::Relaxed);
                match hot.reap_expired(Utc::now()).await {
                    Ok(0) => tracing::trace!("No expired hot items"),
                    Ok(count) => {
                        metrics.reaped.fetch_add(count, Ordering::Relaxed);
                        tracing::debug!(reaped = count, "Reaped expired hot items");
                    }
                    Err(e) => {
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(error = %e, "Failed to reap expired hot items");
                    }
                }
            }
        }
    }

    metrics
}
