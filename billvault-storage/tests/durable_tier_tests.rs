//! End-to-end tests over the durable backends: LMDB hot store, LMDB location
//! index and filesystem cold store, each behind the retry decorator.

use std::sync::Arc;
use std::time::Duration;

use billvault_storage::{
    ArchivalMigrator, ColdStore, FsColdStore, HotStore, IndexedArchive, LmdbHotStore,
    LmdbLocationIndex, LocationIndex, Miss, ReadOutcome, Retrying, TieredReader,
};
use billvault_test_utils::{
    abc123, billing_record, record_id, reference_now, ArchivalConfig, RetryConfig, Tier,
};
use tempfile::TempDir;
use tokio::sync::watch;

struct Durable {
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
    index: Arc<dyn LocationIndex>,
}

fn open(dir: &TempDir) -> Durable {
    let retry = RetryConfig::default();
    let hot = LmdbHotStore::open(dir.path().join("hot"), 16).unwrap();
    let index = LmdbLocationIndex::open(dir.path().join("index"), 16).unwrap();
    let cold = FsColdStore::open(dir.path().join("cold")).unwrap();
    Durable {
        hot: Arc::new(Retrying::new(Arc::new(hot), retry.clone())),
        cold: Arc::new(Retrying::new(Arc::new(cold), retry.clone())),
        index: Arc::new(Retrying::new(Arc::new(index), retry)),
    }
}

impl Durable {
    fn migrator(&self) -> ArchivalMigrator {
        ArchivalMigrator::new(
            self.hot.clone(),
            self.cold.clone(),
            self.index.clone(),
            ArchivalConfig::default(),
        )
        .unwrap()
    }

    fn reader(&self) -> TieredReader {
        TieredReader::new(
            self.hot.clone(),
            Arc::new(IndexedArchive::new(self.index.clone(), self.cold.clone())),
        )
    }
}

#[tokio::test]
async fn test_reference_scenario_on_durable_tiers() {
    let dir = TempDir::new().unwrap();
    let tiers = open(&dir);
    let record = abc123();
    tiers.hot.put(&record).await.unwrap();
    let (_tx, rx) = watch::channel(false);

    let summary = tiers.migrator().run(reference_now(), &rx).await;
    assert_eq!(summary.archived, 1);

    let on_disk = std::fs::read(dir.path().join("cold/2024/01/01/abc123.json")).unwrap();
    assert_eq!(
        on_disk,
        br#"{"id":"abc123","createdAt":"2024-01-01T00:00:00Z","amount":42}"#
    );

    let later = chrono::Utc::now() + chrono::Duration::seconds(5);
    assert_eq!(tiers.hot.reap_expired(later).await.unwrap(), 1);

    match tiers.reader().read(&record.id).await.unwrap() {
        ReadOutcome::Found { tier, body } => {
            assert_eq!(tier, Tier::Cold);
            assert_eq!(body, on_disk);
        }
        other => panic!("expected cold hit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_index_survives_restart() {
    let dir = TempDir::new().unwrap();
    let record = billing_record("inv-7", "2023-03-04T05:06:07Z", 7);
    {
        let tiers = open(&dir);
        tiers.hot.put(&record).await.unwrap();
        let (_tx, rx) = watch::channel(false);
        tiers.migrator().run(reference_now(), &rx).await;
        tiers
            .hot
            .reap_expired(chrono::Utc::now() + chrono::Duration::seconds(5))
            .await
            .unwrap();
    }

    let tiers = open(&dir);
    let outcome = tiers.reader().read(&record.id).await.unwrap();
    assert!(matches!(outcome, ReadOutcome::Found { tier: Tier::Cold, .. }));

    let entry = tiers.index.get(&record.id).await.unwrap().unwrap();
    assert_eq!(entry.cold_key.as_str(), "2023/03/04/inv-7.json");
}

#[tokio::test]
async fn test_deleted_cold_object_is_reported_as_inconsistency() {
    let dir = TempDir::new().unwrap();
    let tiers = open(&dir);
    let record = abc123();
    tiers.hot.put(&record).await.unwrap();
    let (_tx, rx) = watch::channel(false);
    tiers.migrator().run(reference_now(), &rx).await;
    tiers
        .hot
        .reap_expired(chrono::Utc::now() + chrono::Duration::seconds(5))
        .await
        .unwrap();

    std::fs::remove_file(dir.path().join("cold/2024/01/01/abc123.json")).unwrap();

    let outcome = tiers.reader().read(&record.id).await.unwrap();
    assert!(matches!(
        outcome,
        ReadOutcome::NotFound(Miss::IndexInconsistency { .. })
    ));
    assert_eq!(
        tiers.reader().read(&record_id("never-seen")).await.unwrap(),
        ReadOutcome::NotFound(Miss::Unknown)
    );
}

#[tokio::test]
async fn test_retired_copy_is_invisible_once_expired() {
    let dir = TempDir::new().unwrap();
    let tiers = open(&dir);
    let record = abc123();
    tiers.hot.put(&record).await.unwrap();
    tiers
        .hot
        .retire(&record.id, Duration::from_millis(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(tiers.hot.get(&record.id).await.unwrap(), None);
}
