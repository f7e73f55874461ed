//! Metrics collection and storage pipeline
//!
//! An agent samples host counters and gauges and pushes them over HTTP to a
//! server, which keeps them in a pluggable [`storage`] backend.

pub mod agent;
pub mod api;
pub mod config;
pub mod metric;
pub mod retry;
pub mod storage;

pub use metric::{Metric, MetricKey, MetricKind, MetricRecord, MetricValue};
pub use retry::{Retrier, RetryError, Transient};
pub use storage::{Storage, StorageError, StorageResult};
