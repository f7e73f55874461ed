//! Integration tests for file snapshot persistence
//!
//! These tests verify that:
//! - A restarted file store sees everything written before
//! - Restore replays records through the merge path
//! - Periodic mode persists on close

use std::collections::HashMap;
use std::time::Duration;

use metrics_keeper::storage::{FileStore, FileStoreConfig, open_storage, StorageSettings};
use metrics_keeper::{Metric, MetricKey, MetricValue, Storage};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::helpers::{sync_file_config, test_retrier};

fn as_map(metrics: &[Metric]) -> HashMap<String, String> {
    metrics
        .iter()
        .map(|m| (m.id().to_string(), format!("{}:{}", m.kind(), m.value())))
        .collect()
}

#[tokio::test]
async fn test_snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let written: Vec<Metric> = (0..20)
        .map(|i| {
            if i % 2 == 0 {
                Metric::counter(format!("counter{i}"), i * 10).unwrap()
            } else {
                Metric::gauge(format!("gauge{i}"), i as f64 / 4.0).unwrap()
            }
        })
        .collect();

    let first = FileStore::open(sync_file_config(&dir), &test_retrier(), &cancel)
        .await
        .unwrap();
    for metric in &written {
        first.put(&cancel, metric.clone()).await.unwrap();
    }
    first.close().await.unwrap();
    drop(first);

    let second = FileStore::open(sync_file_config(&dir), &test_retrier(), &cancel)
        .await
        .unwrap();
    let restored = second.list(&cancel).await.unwrap();

    assert_eq!(as_map(&restored), as_map(&written));
}

#[tokio::test]
async fn test_restore_merges_with_new_writes() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let first = FileStore::open(sync_file_config(&dir), &test_retrier(), &cancel)
        .await
        .unwrap();
    first.put(&cancel, Metric::counter("PollCount", 5).unwrap()).await.unwrap();
    drop(first);

    let second = FileStore::open(sync_file_config(&dir), &test_retrier(), &cancel)
        .await
        .unwrap();
    let merged = second
        .put(&cancel, Metric::counter("PollCount", 2).unwrap())
        .await
        .unwrap();

    assert_eq!(merged.value(), MetricValue::Counter(7));
}

#[tokio::test]
async fn test_periodic_store_persists_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let config = FileStoreConfig {
        path: dir.path().join("metrics.json"),
        store_interval: Duration::from_secs(300),
        restore: true,
    };

    let first = FileStore::open(config.clone(), &test_retrier(), &cancel)
        .await
        .unwrap();
    first.put(&cancel, Metric::gauge("Alloc", 3.25).unwrap()).await.unwrap();
    first.close().await.unwrap();

    let second = FileStore::open(config, &test_retrier(), &cancel)
        .await
        .unwrap();
    let stored = second.get(&cancel, &MetricKey::gauge("Alloc")).await.unwrap();
    assert_eq!(stored.value(), MetricValue::Gauge(3.25));
    second.close().await.unwrap();
}

#[tokio::test]
async fn test_open_storage_prefers_file_over_memory() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let settings = StorageSettings {
        file_path: Some(dir.path().join("metrics.json")),
        restore: true,
        retrier: test_retrier(),
        ..StorageSettings::default()
    };

    let storage = open_storage(&settings, &cancel).await.unwrap();
    storage.put(&cancel, Metric::counter("c", 1).unwrap()).await.unwrap();

    assert!(dir.path().join("metrics.json").exists());
}
