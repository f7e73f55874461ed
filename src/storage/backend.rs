//! Storage contract shared by every backend
//!
//! This module defines the `Storage` trait that the memory, file and
//! database backends implement and that the HTTP layer depends on.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::StorageResult;
use crate::metric::{Metric, MetricKey};

/// Trait for metric storage backends
///
/// All backends apply the same merge rule: counters accumulate, gauges
/// overwrite. They differ in durability and in batch atomicity:
///
/// - **Memory / File**: `put_batch` is best-effort, an element that fails
///   does not undo the elements applied before or after it
/// - **Database**: `put_batch` runs in one transaction, any failure rolls
///   the whole batch back
///
/// ## Cancellation
///
/// Every operation takes a `CancellationToken`. A cancelled token aborts
/// retry waits and in-flight queries with `StorageError::Cancelled`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared by
/// all request handlers behind an `Arc`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Merge a metric into the store and return the post-merge value
    async fn put(&self, cancel: &CancellationToken, metric: Metric) -> StorageResult<Metric>;

    /// Look up a metric by id and kind
    ///
    /// Fails with `StorageError::NotFound` when nothing of that kind is
    /// stored under the id.
    async fn get(&self, cancel: &CancellationToken, key: &MetricKey) -> StorageResult<Metric>;

    /// Every stored metric, ordered by kind then id
    async fn list(&self, cancel: &CancellationToken) -> StorageResult<Vec<Metric>>;

    /// Merge many metrics in input order
    async fn put_batch(&self, cancel: &CancellationToken, metrics: Vec<Metric>)
    -> StorageResult<()>;

    /// Check that the backend is reachable
    async fn ping(&self, cancel: &CancellationToken) -> StorageResult<()>;

    /// Release resources and flush pending state
    async fn close(&self) -> StorageResult<()>;
}

/// Sort metrics the way `Storage::list` promises
pub(crate) fn sort_listing(metrics: &mut [Metric]) {
    metrics.sort_by(|a, b| a.kind().cmp(&b.kind()).then_with(|| a.id().cmp(b.id())));
}
