//! In-memory storage backend (no persistence)
//!
//! This backend keeps one entry per metric id in a `HashMap` guarded by a
//! Tokio `RwLock`. It is the merge authority the file backend builds on.
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **No batch atomicity**: `put_batch` applies what it can

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::backend::{Storage, sort_listing};
use super::error::{StorageError, StorageResult};
use crate::metric::{Metric, MetricKey};

/// In-memory storage backend
///
/// Writers hold the write lock for the full read-modify-write of one
/// operation, so updates to the same id never interleave.
#[derive(Debug, Default)]
pub struct MemoryStore {
    metrics: RwLock<HashMap<String, Metric>>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct ids stored
    pub async fn len(&self) -> usize {
        self.metrics.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.metrics.read().await.is_empty()
    }

    fn merge_into(metrics: &mut HashMap<String, Metric>, metric: Metric) -> StorageResult<Metric> {
        match metrics.get_mut(metric.id()) {
            Some(stored) => {
                stored.merge(&metric)?;
                Ok(stored.clone())
            }
            None => {
                metrics.insert(metric.id().to_string(), metric.clone());
                Ok(metric)
            }
        }
    }

    /// Merge a metric without a cancellation context
    pub async fn merge(&self, metric: Metric) -> StorageResult<Metric> {
        let mut metrics = self.metrics.write().await;
        Self::merge_into(&mut metrics, metric)
    }

    /// Merge every metric in order, skipping failures
    ///
    /// Returns the number of applied metrics and the first error, if any.
    pub async fn merge_all(&self, batch: Vec<Metric>) -> (usize, Option<StorageError>) {
        let mut metrics = self.metrics.write().await;
        let mut applied = 0;
        let mut first_error = None;

        for metric in batch {
            match Self::merge_into(&mut metrics, metric) {
                Ok(_) => applied += 1,
                Err(e) => {
                    trace!("skipping batch entry: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        (applied, first_error)
    }

    /// Snapshot of every stored metric, ordered by kind then id
    pub async fn snapshot(&self) -> Vec<Metric> {
        let mut listing: Vec<Metric> = self.metrics.read().await.values().cloned().collect();
        sort_listing(&mut listing);
        listing
    }
}

fn ensure_live(cancel: &CancellationToken) -> StorageResult<()> {
    if cancel.is_cancelled() {
        Err(StorageError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn put(&self, cancel: &CancellationToken, metric: Metric) -> StorageResult<Metric> {
        ensure_live(cancel)?;
        trace!("storing {} {}", metric.kind(), metric.id());
        self.merge(metric).await
    }

    async fn get(&self, cancel: &CancellationToken, key: &MetricKey) -> StorageResult<Metric> {
        ensure_live(cancel)?;
        let metrics = self.metrics.read().await;
        metrics
            .get(&key.id)
            .filter(|m| m.kind() == key.kind)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.clone()))
    }

    async fn list(&self, cancel: &CancellationToken) -> StorageResult<Vec<Metric>> {
        ensure_live(cancel)?;
        Ok(self.snapshot().await)
    }

    async fn put_batch(
        &self,
        cancel: &CancellationToken,
        metrics: Vec<Metric>,
    ) -> StorageResult<()> {
        ensure_live(cancel)?;
        let total = metrics.len();
        let (applied, first_error) = self.merge_all(metrics).await;
        debug!("applied {applied}/{total} batch entries");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn ping(&self, cancel: &CancellationToken) -> StorageResult<()> {
        ensure_live(cancel)
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}
