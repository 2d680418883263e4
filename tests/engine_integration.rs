//! End-to-end properties of the pairing engine against a real history file.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use greenhouse_growth::engine::{GrowthEngine, Outcome};
use greenhouse_growth::error::IngestError;
use greenhouse_growth::history::HistoryStore;
use greenhouse_growth::models::ImageAnalysis;
use greenhouse_growth::traits::HistoryMirror;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};

fn analysis(file_key: &str, area: u64) -> ImageAnalysis {
    ImageAnalysis {
        file_key: file_key.to_string(),
        capture_time: None,
        area_pixels: area,
        disease_class: "Tomato___healthy".to_string(),
        plant: None,
    }
}

fn setup() -> (TempDir, GrowthEngine) {
    let tmp = TempDir::new().unwrap();
    let engine = GrowthEngine::new(
        HistoryStore::new(tmp.path().join("data").join("plant_data.json")),
        "Cucumber",
    );
    (tmp, engine)
}

fn paired_block(outcome: Outcome) -> greenhouse_growth::models::Block {
    match outcome {
        Outcome::Paired { block, .. } => block,
        other => panic!("expected paired, got {:?}", other),
    }
}

// ─── Idempotency ────────────────────────────────────────────────────

#[tokio::test]
async fn test_resubmitting_a_pair_is_a_noop() {
    let (_tmp, engine) = setup();

    engine.submit(analysis("7_1_a.jpg", 40)).await.unwrap();
    engine.submit(analysis("7_2_b.jpg", 60)).await.unwrap();

    let again_first = engine.submit(analysis("7_1_a.jpg", 40)).await.unwrap();
    let again_second = engine.submit(analysis("7_2_b.jpg", 60)).await.unwrap();
    assert_eq!(again_first.label(), "duplicate");
    assert_eq!(again_second.label(), "duplicate");

    let blocks = engine.store().load_plant("Cucumber").await.unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(engine.pending_groups("Cucumber").await, 0);
}

#[tokio::test]
async fn test_restart_rebuilds_dedup_from_history() {
    let (tmp, engine) = setup();
    engine.submit(analysis("7_1_a.jpg", 40)).await.unwrap();
    engine.submit(analysis("7_2_b.jpg", 60)).await.unwrap();
    drop(engine);

    // A fresh engine over the same file knows nothing in memory.
    let restarted = GrowthEngine::new(
        HistoryStore::new(tmp.path().join("data").join("plant_data.json")),
        "Cucumber",
    );
    assert_eq!(restarted.processed_count().await, 0);

    let outcome = restarted.submit(analysis("7_2_b.jpg", 60)).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Duplicate {
            identifier: "7_2_b.jpg@NA".to_string()
        }
    );
    assert_eq!(restarted.processed_count().await, 1);
    assert_eq!(restarted.pending_groups("Cucumber").await, 0);
}

#[tokio::test]
async fn test_same_file_new_capture_time_is_new() {
    let (_tmp, engine) = setup();
    let mut first = analysis("7_1_a.jpg", 40);
    first.capture_time = Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());
    engine.submit(first.clone()).await.unwrap();

    first.capture_time = Some(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap());
    let outcome = engine.submit(first).await.unwrap();
    assert_eq!(outcome.label(), "pending");
}

// ─── Pairing ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_before_first_still_orders_block() {
    let (_tmp, engine) = setup();

    assert_eq!(
        engine.submit(analysis("4_2_right.jpg", 60)).await.unwrap().label(),
        "pending"
    );
    let block = paired_block(engine.submit(analysis("4_1_left.jpg", 40)).await.unwrap());

    assert_eq!(block.images[0].file_key, "4_1_left.jpg");
    assert_eq!(block.images[1].file_key, "4_2_right.jpg");
    assert_eq!(block.disease_class, "Tomato___healthy");
}

#[tokio::test]
async fn test_new_first_evicts_orphan_first() {
    let (_tmp, engine) = setup();

    engine.submit(analysis("7_1_a.jpg", 40)).await.unwrap();
    let outcome = engine.submit(analysis("9_1_a.jpg", 45)).await.unwrap();
    assert_eq!(outcome.evicted(), ["7".to_string()]);

    // The evicted half stays accounted; its partner now waits alone.
    let late = engine.submit(analysis("7_2_b.jpg", 60)).await.unwrap();
    assert_eq!(late.label(), "pending");
    assert!(engine
        .store()
        .load_plant("Cucumber")
        .await
        .unwrap()
        .is_empty());

    let resent = engine.submit(analysis("7_1_a.jpg", 40)).await.unwrap();
    assert_eq!(resent.label(), "duplicate");
}

#[tokio::test]
async fn test_second_does_not_evict() {
    let (_tmp, engine) = setup();

    engine.submit(analysis("7_1_a.jpg", 40)).await.unwrap();
    let outcome = engine.submit(analysis("9_2_b.jpg", 60)).await.unwrap();
    assert!(outcome.evicted().is_empty());
    assert_eq!(engine.pending_groups("Cucumber").await, 2);

    let block = paired_block(engine.submit(analysis("7_2_b.jpg", 60)).await.unwrap());
    assert_eq!(block.global_area_pixels, 100);
}

// ─── Growth ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_growth_against_previous_block() {
    let (_tmp, engine) = setup();

    let first = paired_block({
        engine.submit(analysis("1_1_a.jpg", 40)).await.unwrap();
        engine.submit(analysis("1_2_b.jpg", 60)).await.unwrap()
    });
    assert_eq!(first.global_area_pixels, 100);
    assert_eq!(first.global_growth, 0);
    assert_eq!(first.global_growth_percent, 0.0);

    let second = paired_block({
        engine.submit(analysis("2_1_a.jpg", 75)).await.unwrap();
        engine.submit(analysis("2_2_b.jpg", 75)).await.unwrap()
    });
    assert_eq!(second.global_area_pixels, 150);
    assert_eq!(second.global_growth, 50);
    assert_eq!(second.global_growth_percent, 50.0);

    // Per-angle growth: 40 -> 75 and 60 -> 75.
    assert_eq!(second.images[0].growth, 35);
    assert_eq!(second.images[0].growth_percent, 87.5);
    assert_eq!(second.images[1].growth, 15);
    assert_eq!(second.images[1].growth_percent, 25.0);

    let blocks = engine.store().load_plant("Cucumber").await.unwrap();
    assert_eq!(blocks, vec![first, second]);
}

#[tokio::test]
async fn test_growth_from_zero_area_has_zero_percent() {
    let (_tmp, engine) = setup();
    engine.submit(analysis("1_1_a.jpg", 0)).await.unwrap();
    engine.submit(analysis("1_2_b.jpg", 0)).await.unwrap();
    engine.submit(analysis("2_1_a.jpg", 10)).await.unwrap();
    let block = paired_block(engine.submit(analysis("2_2_b.jpg", 5)).await.unwrap());

    assert_eq!(block.global_growth, 15);
    assert_eq!(block.global_growth_percent, 0.0);
    assert_eq!(block.images[0].growth_percent, 0.0);
}

#[tokio::test]
async fn test_oversized_area_still_pairs() {
    let (_tmp, engine) = setup();

    engine.submit(analysis("7_1_a.jpg", u64::MAX)).await.unwrap();
    let block = paired_block(engine.submit(analysis("7_2_b.jpg", 1)).await.unwrap());
    assert_eq!(block.global_area_pixels, u64::MAX);

    let next = paired_block({
        engine.submit(analysis("8_1_a.jpg", 0)).await.unwrap();
        engine.submit(analysis("8_2_b.jpg", 0)).await.unwrap()
    });
    assert_eq!(next.global_growth, i64::MIN);
    assert_eq!(engine.pending_groups("Cucumber").await, 0);
    assert_eq!(engine.store().load_plant("Cucumber").await.unwrap().len(), 2);
}

// ─── Durability ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_commit_keeps_previous_file_and_allows_retry() {
    let (_tmp, engine) = setup();

    engine.submit(analysis("1_1_a.jpg", 40)).await.unwrap();
    engine.submit(analysis("1_2_b.jpg", 60)).await.unwrap();
    let committed = fs::read(engine.store().path()).unwrap();

    // A directory squatting on the staging path makes the next commit fail.
    let staging = engine.store().staging_path();
    fs::create_dir_all(&staging).unwrap();

    engine.submit(analysis("2_1_a.jpg", 75)).await.unwrap();
    let err = engine
        .submit(analysis("2_2_b.jpg", 75))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Persist { .. }));
    assert!(err.is_retryable());

    assert_eq!(fs::read(engine.store().path()).unwrap(), committed);
    assert_eq!(engine.pending_groups("Cucumber").await, 1);

    fs::remove_dir(&staging).unwrap();

    // The failed image was never admitted, so a retry completes the pair.
    let block = paired_block(engine.submit(analysis("2_2_b.jpg", 75)).await.unwrap());
    assert_eq!(block.global_growth, 50);
    assert_eq!(engine.store().load_plant("Cucumber").await.unwrap().len(), 2);
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_corrupt_history_fails_submission() {
    let (_tmp, engine) = setup();
    let path = engine.store().path().to_path_buf();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{ not json").unwrap();

    let err = engine.submit(analysis("1_1_a.jpg", 40)).await.unwrap_err();
    assert!(matches!(err, IngestError::Corrupt { .. }));
    assert_eq!(engine.processed_count().await, 0);
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
}

// ─── Concurrency ────────────────────────────────────────────────────

/// Mirror that parks every upload until released.
struct GatedMirror {
    entered: mpsc::UnboundedSender<()>,
    release: Arc<Notify>,
}

#[async_trait]
impl HistoryMirror for GatedMirror {
    async fn persist(&self, _blob: &[u8], _key: &str) -> Result<()> {
        let _ = self.entered.send(());
        self.release.notified().await;
        Ok(())
    }

    async fn fetch(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_submit_still_commits() {
    let tmp = TempDir::new().unwrap();
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let mirror = GatedMirror {
        entered: entered_tx,
        release: release.clone(),
    };
    let engine = GrowthEngine::new(
        HistoryStore::new(tmp.path().join("plant_data.json"))
            .with_mirror(Arc::new(mirror), "plant_data.json"),
        "Cucumber",
    );

    engine.submit(analysis("1_1_a.jpg", 40)).await.unwrap();

    let caller = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.submit(analysis("1_2_b.jpg", 60)).await })
    };

    // The local file is written and the upload is in flight: drop the caller.
    tokio::time::timeout(Duration::from_secs(5), entered_rx.recv())
        .await
        .expect("commit never reached the mirror");
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());
    release.notify_one();

    // Taking the lock waits for the abandoned unit of work to finish.
    assert_eq!(engine.processed_count().await, 2);
    assert_eq!(engine.pending_groups("Cucumber").await, 0);
    assert_eq!(engine.store().load_plant("Cucumber").await.unwrap().len(), 1);

    let again = engine.submit(analysis("1_2_b.jpg", 60)).await.unwrap();
    assert_eq!(again.label(), "duplicate");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_account_once() {
    let (_tmp, engine) = setup();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.submit(analysis("5_1_a.jpg", 40)).await })
        })
        .collect();

    let mut fresh = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.label() != "duplicate" {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
    assert_eq!(engine.pending_groups("Cucumber").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_halves_pair_once() {
    let (_tmp, engine) = setup();

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.submit(analysis("6_1_a.jpg", 40)).await })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.submit(analysis("6_2_b.jpg", 60)).await })
    };

    let mut labels = vec![
        a.await.unwrap().unwrap().label(),
        b.await.unwrap().unwrap().label(),
    ];
    labels.sort();
    assert_eq!(labels, vec!["paired", "pending"]);

    let blocks = engine.store().load_plant("Cucumber").await.unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].images[0].file_key, "6_1_a.jpg");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_plants_in_parallel() {
    let (_tmp, engine) = setup();
    let plants = ["Basil", "Mint", "Thyme", "Sage"];

    let mut handles = Vec::new();
    for plant in plants {
        for key in ["1_1_a.jpg", "1_2_b.jpg"] {
            let engine = engine.clone();
            let mut a = analysis(key, 10);
            a.plant = Some(plant.to_string());
            handles.push(tokio::spawn(async move { engine.submit(a).await }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = engine.store().load().await.unwrap();
    assert_eq!(history.len(), plants.len());
    for plant in plants {
        assert_eq!(history[plant].len(), 1);
    }
}
