//! Sale backfill over a real on-disk product store

use booth_price_tracker::application::SaleBackfill;
use booth_price_tracker::domain::{DailyObservation, PersistedProduct, ProductHistoryRepository};
use booth_price_tracker::infrastructure::{CorruptRecordPolicy, JsonProductStore};
use chrono::NaiveDate;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn obs(day: u32, price: u64, is_sale: bool) -> DailyObservation {
    DailyObservation {
        date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
        price,
        is_sale,
    }
}

fn product(id: &str, series: Vec<DailyObservation>) -> PersistedProduct {
    let mut product = PersistedProduct::new(id, format!("Product {id}"));
    product.variations.insert("basic".into(), series);
    product
}

fn store(dir: &Path) -> JsonProductStore {
    JsonProductStore::new(dir, CorruptRecordPolicy::Skip)
}

async fn seed(dir: &Path) {
    let store = store(dir);
    // 1001: two unflagged drops; 1002: nothing to do
    store
        .save(&product("1001", vec![obs(1, 2000, false), obs(2, 1500, false), obs(3, 1500, false), obs(4, 1000, false)]))
        .await
        .unwrap();
    store
        .save(&product("1002", vec![obs(1, 1000, false), obs(2, 1200, false)]))
        .await
        .unwrap();
}

#[tokio::test]
async fn flags_unmarked_price_drops() {
    let dir = TempDir::new().unwrap();
    seed(dir.path()).await;
    let store = Arc::new(store(dir.path()));

    let report = SaleBackfill::new(store.clone()).run().await.unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.flipped_observations, 2);

    let updated = store.load("1001").await.unwrap().unwrap();
    let flags: Vec<bool> = updated.history("basic").unwrap().iter().map(|o| o.is_sale).collect();
    assert_eq!(flags, vec![false, true, false, true]);
}

#[tokio::test]
async fn never_clears_existing_sale_flags() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store(dir.path()));
    // Price went up on a flagged day
    store
        .save(&product("1003", vec![obs(1, 1000, true), obs(2, 1200, true)]))
        .await
        .unwrap();

    let report = SaleBackfill::new(store.clone()).run().await.unwrap();

    assert_eq!(report.updated, 0);
    let kept = store.load("1003").await.unwrap().unwrap();
    assert!(kept.history("basic").unwrap().iter().all(|o| o.is_sale));
}

#[tokio::test]
async fn leaves_unchanged_files_alone() {
    let dir = TempDir::new().unwrap();
    let shard = dir.path().join("100");
    fs::create_dir_all(&shard).unwrap();
    // Compact legacy layout; rewriting it would change the bytes
    let legacy = r#"[{"date":"2026-03-01","price":900,"is_sale":false}]"#;
    fs::write(shard.join("1004.json"), legacy).unwrap();

    let report = SaleBackfill::new(Arc::new(store(dir.path()))).run().await.unwrap();

    assert_eq!(report.scanned, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(fs::read_to_string(shard.join("1004.json")).unwrap(), legacy);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    seed(dir.path()).await;
    let path = dir.path().join("100").join("1001.json");
    let before = fs::read_to_string(&path).unwrap();

    let report = SaleBackfill::new(Arc::new(store(dir.path())))
        .dry_run(true)
        .run()
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.flipped_observations, 2);
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[tokio::test]
async fn unreadable_files_are_counted_and_kept() {
    let dir = TempDir::new().unwrap();
    seed(dir.path()).await;
    let broken = dir.path().join("999").join("9990.json");
    fs::create_dir_all(broken.parent().unwrap()).unwrap();
    fs::write(&broken, "{ not json").unwrap();

    let report = SaleBackfill::new(Arc::new(store(dir.path()))).run().await.unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.unreadable, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(fs::read_to_string(&broken).unwrap(), "{ not json");
    assert!(!dir.path().join("999").join("9990.json.corrupted").exists());
}

#[tokio::test]
async fn empty_data_dir_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let report = SaleBackfill::new(Arc::new(store(&dir.path().join("missing"))))
        .run()
        .await
        .unwrap();
    assert_eq!(report.scanned, 0);
}
