//! Behaviour every backend must share
//!
//! These tests verify that:
//! - Counters accumulate and gauges overwrite
//! - Counter overflow is rejected the same way everywhere
//! - Missing metrics surface as NotFound
//! - Concurrent writes to one id lose nothing
//! - Batch failures behave as documented per backend

use assert_matches::assert_matches;
use metrics_keeper::{Metric, MetricKey, MetricValue, StorageError};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::helpers::{Backend, all_backends, open_backend};

#[tokio::test]
async fn test_counter_accumulation() {
    for backend in all_backends() {
        let store = open_backend(backend).await;
        let cancel = CancellationToken::new();

        store.storage.put(&cancel, Metric::counter("c", 4).unwrap()).await.unwrap();
        store.storage.put(&cancel, Metric::counter("c", 3).unwrap()).await.unwrap();

        let stored = store.storage.get(&cancel, &MetricKey::counter("c")).await.unwrap();
        assert_eq!(stored.value(), MetricValue::Counter(7), "{backend:?}");
    }
}

#[tokio::test]
async fn test_gauge_overwrite() {
    for backend in all_backends() {
        let store = open_backend(backend).await;
        let cancel = CancellationToken::new();

        store.storage.put(&cancel, Metric::gauge("g", 1.5).unwrap()).await.unwrap();
        store.storage.put(&cancel, Metric::gauge("g", 2.5).unwrap()).await.unwrap();

        let stored = store.storage.get(&cancel, &MetricKey::gauge("g")).await.unwrap();
        assert_eq!(stored.value(), MetricValue::Gauge(2.5), "{backend:?}");
    }
}

#[tokio::test]
async fn test_counter_overflow_is_rejected() {
    for backend in all_backends() {
        let store = open_backend(backend).await;
        let cancel = CancellationToken::new();

        store
            .storage
            .put(&cancel, Metric::counter("c", i64::MAX).unwrap())
            .await
            .unwrap();
        assert_matches!(
            store.storage.put(&cancel, Metric::counter("c", 1).unwrap()).await,
            Err(StorageError::InvalidValue(_)),
            "{backend:?}"
        );

        let stored = store.storage.get(&cancel, &MetricKey::counter("c")).await.unwrap();
        assert_eq!(stored.value(), MetricValue::Counter(i64::MAX), "{backend:?}");
    }
}

#[tokio::test]
async fn test_missing_metric_is_not_found() {
    for backend in all_backends() {
        let store = open_backend(backend).await;
        let cancel = CancellationToken::new();

        assert_matches!(
            store.storage.get(&cancel, &MetricKey::counter("missing")).await,
            Err(StorageError::NotFound(key)) if key.id == "missing",
            "{backend:?}"
        );
    }
}

#[tokio::test]
async fn test_list_returns_every_distinct_id() {
    for backend in all_backends() {
        let store = open_backend(backend).await;
        let cancel = CancellationToken::new();

        for i in 0..5 {
            store
                .storage
                .put(&cancel, Metric::counter(format!("c{i}"), i).unwrap())
                .await
                .unwrap();
            store
                .storage
                .put(&cancel, Metric::counter(format!("c{i}"), 1).unwrap())
                .await
                .unwrap();
        }
        store.storage.put(&cancel, Metric::gauge("g", 0.1).unwrap()).await.unwrap();

        let listing = store.storage.list(&cancel).await.unwrap();
        assert_eq!(listing.len(), 6, "{backend:?}");
        assert_eq!(listing[0], Metric::counter("c0", 1).unwrap(), "{backend:?}");
        assert_eq!(listing[5], Metric::gauge("g", 0.1).unwrap(), "{backend:?}");
    }
}

#[tokio::test]
async fn test_concurrent_same_id_updates() {
    for backend in all_backends() {
        let store = open_backend(backend).await;
        let cancel = CancellationToken::new();

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let storage = store.storage.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    storage.put(&cancel, Metric::counter("x", 1).unwrap()).await
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let stored = store.storage.get(&cancel, &MetricKey::counter("x")).await.unwrap();
        assert_eq!(stored.value(), MetricValue::Counter(100), "{backend:?}");
    }
}

#[tokio::test]
async fn test_batch_failure_divergence() {
    for backend in all_backends() {
        let store = open_backend(backend).await;
        let cancel = CancellationToken::new();

        // the second entry conflicts with the kind the first one establishes
        let batch = vec![
            Metric::counter("a", 1).unwrap(),
            Metric::gauge("a", 2.0).unwrap(),
            Metric::counter("b", 3).unwrap(),
        ];
        assert_matches!(
            store.storage.put_batch(&cancel, batch).await,
            Err(StorageError::KindMismatch { .. }),
            "{backend:?}"
        );

        let ids: Vec<String> = store
            .storage
            .list(&cancel)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id().to_string())
            .collect();

        match backend {
            Backend::Memory | Backend::File => assert_eq!(ids, vec!["a", "b"]),
            #[cfg(feature = "storage-sqlite")]
            Backend::Database => assert!(ids.is_empty(), "batch must roll back"),
        }
    }
}

#[tokio::test]
async fn test_cancelled_context_is_distinct_from_data_errors() {
    for backend in all_backends() {
        let store = open_backend(backend).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = store
            .storage
            .put(&cancel, Metric::counter("c", 1).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_cancelled(), "{backend:?}: {err}");

        let live = CancellationToken::new();
        assert_matches!(
            store.storage.get(&live, &MetricKey::counter("c")).await,
            Err(StorageError::NotFound(_)),
            "{backend:?}"
        );
    }
}

#[tokio::test]
async fn test_ping_and_close() {
    for backend in all_backends() {
        let store = open_backend(backend).await;
        store.storage.ping(&CancellationToken::new()).await.unwrap();
        store.storage.close().await.unwrap();
    }
}
