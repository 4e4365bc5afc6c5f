//! Property-Based Tests for Archival Migration
//!
//! - Idempotent migration: a second run over an unchanged hot tier writes
//!   nothing and leaves the cold tier and index unchanged.
//! - Archival correctness: every stale record has a cold object holding its
//!   canonical body and a location entry.
//! - Read-after-migration consistency: reads before and after migration (and
//!   after the hot copy is reaped) return identical bytes.
//! - Fallback correctness: hot-only, cold-only and unknown ids.
//! - No premature retirement: a failed cold write leaves the hot copy live.

use std::sync::Arc;

use billvault_storage::{ColdStore, HotStore, LocationIndex, Miss, ReadOutcome};
use billvault_test_utils::generators::{arb_population, arb_record_id};
use billvault_test_utils::{
    abc123, billing_record, record_id, reference_now, ArchivalConfig, FaultyColdStore, Tier,
    TierSet,
};
use proptest::prelude::*;
use tokio::sync::watch;

fn idle() -> watch::Receiver<bool> {
    watch::channel(false).1
}

fn config() -> ArchivalConfig {
    ArchivalConfig {
        concurrency: 4,
        ..Default::default()
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// REFERENCE SCENARIO
// ============================================================================

#[tokio::test]
async fn test_reference_record_round_trip() {
    let tiers = TierSet::in_memory();
    let record = abc123();
    tiers.seed(&[record.clone()]).await;
    let reader = tiers.reader();

    let before = reader.read(&record.id).await.unwrap();

    let summary = tiers.migrator(config()).run(reference_now(), &idle()).await;
    assert_eq!(summary.archived, 1);
    assert_eq!(summary.failed, 0);

    let objects = tiers.cold.snapshot();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].0.as_str(), "2024/01/01/abc123.json");
    assert_eq!(
        String::from_utf8(objects[0].1.clone()).unwrap(),
        r#"{"id":"abc123","createdAt":"2024-01-01T00:00:00Z","amount":42}"#
    );

    let entry = tiers.index.get(&record.id).await.unwrap().unwrap();
    assert_eq!(entry.cold_key.as_str(), "2024/01/01/abc123.json");

    let expiry = tiers.hot.expiry(&record.id).await.unwrap().unwrap();
    assert!(expiry <= chrono::Utc::now() + chrono::Duration::seconds(2));

    assert_eq!(tiers.reap_after(config().retire_ttl).await, 1);
    assert!(tiers.hot.is_empty());

    let after = reader.read(&record.id).await.unwrap();
    match (before, after) {
        (
            ReadOutcome::Found {
                tier: Tier::Hot,
                body: hot,
            },
            ReadOutcome::Found {
                tier: Tier::Cold,
                body: cold,
            },
        ) => assert_eq!(hot, cold),
        other => panic!("unexpected outcomes: {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let tiers = TierSet::in_memory();
    tiers.seed(&[abc123()]).await;
    let outcome = tiers
        .reader()
        .read(&record_id("unknown-id"))
        .await
        .unwrap();
    assert_eq!(outcome, ReadOutcome::NotFound(Miss::Unknown));
}

#[tokio::test]
async fn test_overlapping_runs_archive_once() {
    let tiers = TierSet::in_memory();
    let records: Vec<_> = (0..50)
        .map(|i| billing_record(&format!("inv-{i}"), "2023-06-01T00:00:00Z", i))
        .collect();
    tiers.seed(&records).await;

    let faulty = Arc::new(FaultyColdStore::new(tiers.cold.clone()));
    let first = tiers.migrator_with_cold(faulty.clone(), config());
    let second = tiers.migrator_with_cold(faulty.clone(), config());
    let (shutdown_a, shutdown_b) = (idle(), idle());

    let (a, b) = tokio::join!(
        first.run(reference_now(), &shutdown_a),
        second.run(reference_now(), &shutdown_b)
    );

    assert_eq!(a.failed + b.failed, 0);
    assert_eq!(tiers.cold.len(), records.len());
    assert_eq!(tiers.index.len(), records.len());
    assert!(faulty.writes() <= 2 * records.len() as u64);
    assert_eq!(a.settled() + b.settled(), 2 * records.len() as u64);
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Running twice produces the same cold tier and index as running once,
    /// and the second run performs no cold writes.
    #[test]
    fn prop_migration_is_idempotent(records in arb_population(24)) {
        runtime().block_on(async {
            let tiers = TierSet::in_memory();
            tiers.seed(&records).await;
            let faulty = Arc::new(FaultyColdStore::new(tiers.cold.clone()));
            let migrator = tiers.migrator_with_cold(faulty.clone(), config());

            migrator.run(reference_now(), &idle()).await;
            let cold_once = tiers.cold.snapshot();
            let index_once = tiers.index.snapshot();
            let writes_once = faulty.writes();

            let second = migrator.run(reference_now(), &idle()).await;
            prop_assert_eq!(second.archived, 0);
            prop_assert_eq!(faulty.writes(), writes_once);
            prop_assert_eq!(tiers.cold.snapshot(), cold_once);
            prop_assert_eq!(tiers.index.snapshot(), index_once);
            Ok(())
        })?;
    }

    /// Every stale record is archived with its canonical body; fresh records
    /// are left alone.
    #[test]
    fn prop_stale_records_are_archived(records in arb_population(24)) {
        runtime().block_on(async {
            let tiers = TierSet::in_memory();
            tiers.seed(&records).await;
            let cutoff = config().cutoff(reference_now());

            let summary = tiers.migrator(config()).run(reference_now(), &idle()).await;
            prop_assert_eq!(summary.failed, 0);

            for record in &records {
                let key = record.cold_key();
                let entry = tiers.index.get(&record.id).await.unwrap();
                let expiry = tiers.hot.expiry(&record.id).await.unwrap();
                if record.created_at < cutoff {
                    let body = tiers.cold.get(&key).await.unwrap();
                    prop_assert_eq!(body, Some(record.to_json_bytes().unwrap()));
                    prop_assert_eq!(entry.map(|e| e.cold_key), Some(key));
                    prop_assert!(expiry.is_some());
                } else {
                    prop_assert!(!tiers.cold.exists(&key).await.unwrap());
                    prop_assert!(entry.is_none());
                    prop_assert!(expiry.is_none());
                }
            }
            Ok(())
        })?;
    }

    /// Reads return identical bytes before migration, after migration and
    /// after the hot copy is reaped.
    #[test]
    fn prop_read_after_migration_is_consistent(records in arb_population(16)) {
        runtime().block_on(async {
            let tiers = TierSet::in_memory();
            tiers.seed(&records).await;
            let reader = tiers.reader();

            let mut before = Vec::new();
            for record in &records {
                before.push(reader.read(&record.id).await.unwrap());
            }

            tiers.migrator(config()).run(reference_now(), &idle()).await;
            tiers.reap_after(config().retire_ttl).await;

            for (record, earlier) in records.iter().zip(before) {
                let later = reader.read(&record.id).await.unwrap();
                match (earlier, later) {
                    (ReadOutcome::Found { body: a, .. }, ReadOutcome::Found { body: b, .. }) => {
                        prop_assert_eq!(a, b);
                    }
                    other => prop_assert!(false, "record {} unreadable: {:?}", record.id, other),
                }
            }
            Ok(())
        })?;
    }

    /// Hot-only ids come from hot, cold-only ids come from cold, unknown ids
    /// are a plain miss.
    #[test]
    fn prop_fallback_picks_the_right_tier(
        records in arb_population(16),
        unknown in arb_record_id(),
    ) {
        prop_assume!(records.iter().all(|r| r.id != unknown));
        runtime().block_on(async {
            let tiers = TierSet::in_memory();
            tiers.seed(&records).await;
            let cutoff = config().cutoff(reference_now());
            tiers.migrator(config()).run(reference_now(), &idle()).await;
            tiers.reap_after(config().retire_ttl).await;
            let reader = tiers.reader();

            for record in &records {
                let expected = if record.created_at < cutoff { Tier::Cold } else { Tier::Hot };
                match reader.read(&record.id).await.unwrap() {
                    ReadOutcome::Found { tier, .. } => prop_assert_eq!(tier, expected),
                    other => prop_assert!(false, "unexpected {:?}", other),
                }
            }

            prop_assert_eq!(
                reader.read(&unknown).await.unwrap(),
                ReadOutcome::NotFound(Miss::Unknown)
            );
            Ok(())
        })?;
    }

    /// A record whose cold write fails keeps a live hot copy and gets no
    /// location entry; the rest of the batch still archives.
    #[test]
    fn prop_failed_write_never_retires(
        records in arb_population(16),
        pick in any::<prop::sample::Index>(),
    ) {
        let cutoff = config().cutoff(reference_now());
        let stale: Vec<_> = records.iter().filter(|r| r.created_at < cutoff).collect();
        prop_assume!(!stale.is_empty());
        let victim = stale[pick.index(stale.len())].clone();

        runtime().block_on(async {
            let tiers = TierSet::in_memory();
            tiers.seed(&records).await;
            let faulty = Arc::new(FaultyColdStore::new(tiers.cold.clone()));
            faulty.fail_writes_for(&victim.id);

            let summary = tiers
                .migrator_with_cold(faulty.clone(), config())
                .run(reference_now(), &idle())
                .await;

            prop_assert_eq!(summary.failed, 1);
            prop_assert_eq!(summary.archived, stale.len() as u64 - 1);
            prop_assert!(tiers.hot.expiry(&victim.id).await.unwrap().is_none());
            prop_assert!(tiers.index.get(&victim.id).await.unwrap().is_none());
            prop_assert!(tiers.hot.get(&victim.id).await.unwrap().is_some());
            Ok(())
        })?;
    }
}
