//! SQLite storage backend implementation
//!
//! This module provides the relational implementation of the `Storage` trait.
//!
//! ## Schema
//!
//! Two tables keyed by metric id, created idempotently on connect:
//!
//! - `counter(id TEXT PRIMARY KEY, value BIGINT)`
//! - `gauge(id TEXT PRIMARY KEY, value DOUBLE PRECISION)`
//!
//! ## Merge Semantics
//!
//! Writes are single-statement upserts, so accumulation happens inside the
//! database and concurrent writers cannot lose updates:
//!
//! - counter: `ON CONFLICT(id) DO UPDATE SET value = counter.value + excluded.value`
//! - gauge: `ON CONFLICT(id) DO UPDATE SET value = excluded.value`
//!
//! Both return the stored value (`RETURNING value`). A counter sum that
//! leaves the i64 range is rejected with `InvalidValue` and rolled back, the
//! same as the in-memory merge.
//!
//! ## Batches
//!
//! `put_batch` runs every upsert in one transaction. Any failing entry drops
//! the transaction, which rolls back the whole batch.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use super::backend::Storage;
use super::error::{StorageError, StorageResult};
use crate::metric::{Metric, MetricKey, MetricKind, MetricValue};
use crate::retry::Retrier;

const CREATE_COUNTER_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS counter (
        id TEXT PRIMARY KEY,
        value BIGINT NOT NULL
    )
"#;

const CREATE_GAUGE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS gauge (
        id TEXT PRIMARY KEY,
        value DOUBLE PRECISION NOT NULL
    )
"#;

const UPSERT_COUNTER: &str = r#"
    INSERT INTO counter (id, value) VALUES (?, ?)
    ON CONFLICT (id) DO UPDATE SET value = counter.value + excluded.value
    RETURNING value, typeof(value) AS storage
"#;

const UPSERT_GAUGE: &str = r#"
    INSERT INTO gauge (id, value) VALUES (?, ?)
    ON CONFLICT (id) DO UPDATE SET value = excluded.value
    RETURNING value
"#;

const SELECT_COUNTER: &str = "SELECT value FROM counter WHERE id = ?";
const SELECT_GAUGE: &str = "SELECT value FROM gauge WHERE id = ?";
const COUNTER_EXISTS: &str = "SELECT 1 FROM counter WHERE id = ?";
const GAUGE_EXISTS: &str = "SELECT 1 FROM gauge WHERE id = ?";

const SELECT_ALL: &str = r#"
    SELECT id, 'counter' AS kind, value FROM counter
    UNION ALL
    SELECT id, 'gauge' AS kind, value FROM gauge
    ORDER BY kind, id
"#;

/// Relational storage backend
///
/// Every operation runs inside the Retrier, so lost connections, pool
/// timeouts and lock contention are retried until the elapsed-time budget
/// runs out.
pub struct DatabaseStore {
    pool: Pool<Sqlite>,
    retrier: Retrier,
}

impl DatabaseStore {
    /// Connect to the database and create the schema
    ///
    /// ## Arguments
    ///
    /// * `url` - SQLite connection string (e.g., "sqlite://metrics.db")
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use metrics_keeper::{retry::Retrier, storage::sqlite::DatabaseStore};
    /// # use tokio_util::sync::CancellationToken;
    /// # async fn example() -> anyhow::Result<()> {
    /// let cancel = CancellationToken::new();
    /// let store = DatabaseStore::connect("sqlite://metrics.db", Retrier::default(), &cancel).await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn connect(
        url: &str,
        retrier: Retrier,
        cancel: &CancellationToken,
    ) -> StorageResult<Self> {
        info!("initializing database backend");

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = retrier
            .run(cancel, || {
                let options = options.clone();
                async move {
                    SqlitePoolOptions::new()
                        .max_connections(5)
                        .acquire_timeout(Duration::from_secs(3))
                        .connect_with(options)
                        .await
                        .map_err(StorageError::from)
                }
            })
            .await?;

        debug!("creating tables");
        retrier.run(cancel, || create_schema(&pool)).await?;

        info!("database backend ready");
        Ok(Self { pool, retrier })
    }

    async fn put_once(&self, metric: &Metric) -> StorageResult<Metric> {
        let mut tx = self.pool.begin().await?;
        let merged = upsert(&mut *tx, metric).await?;
        tx.commit().await?;
        Ok(merged)
    }

    async fn get_once(&self, key: &MetricKey) -> StorageResult<Metric> {
        let sql = match key.kind {
            MetricKind::Counter => SELECT_COUNTER,
            MetricKind::Gauge => SELECT_GAUGE,
        };

        let row = sqlx::query(sql)
            .bind(&key.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.clone()))?;

        let value = match key.kind {
            MetricKind::Counter => MetricValue::Counter(row.try_get("value")?),
            MetricKind::Gauge => MetricValue::Gauge(row.try_get("value")?),
        };
        Metric::new(key.id.clone(), value)
    }

    async fn list_once(&self) -> StorageResult<Vec<Metric>> {
        let rows = sqlx::query(SELECT_ALL).fetch_all(&self.pool).await?;
        rows.iter().map(metric_from_row).collect()
    }

    async fn put_batch_once(&self, metrics: &[Metric]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for metric in metrics {
            upsert(&mut *tx, metric).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn create_schema(pool: &Pool<Sqlite>) -> StorageResult<()> {
    sqlx::query(CREATE_COUNTER_TABLE).execute(pool).await?;
    sqlx::query(CREATE_GAUGE_TABLE).execute(pool).await?;
    Ok(())
}

/// Upsert one metric inside an open transaction
///
/// The write goes first so the transaction holds the write lock before it
/// reads; the kind check afterwards sees this transaction's own insert.
async fn upsert(conn: &mut SqliteConnection, metric: &Metric) -> StorageResult<Metric> {
    let (merged, other_table, other_kind) = match metric.value() {
        MetricValue::Counter(delta) => {
            let row = sqlx::query(UPSERT_COUNTER)
                .bind(metric.id())
                .bind(delta)
                .fetch_one(&mut *conn)
                .await?;
            // integer overflow in SQLite arithmetic yields a REAL
            let storage: String = row.try_get("storage")?;
            if storage != "integer" {
                return Err(StorageError::InvalidValue(format!(
                    "counter {} overflows",
                    metric.id()
                )));
            }
            let stored: i64 = row.try_get("value")?;
            (MetricValue::Counter(stored), GAUGE_EXISTS, MetricKind::Gauge)
        }
        MetricValue::Gauge(value) => {
            let stored: f64 = sqlx::query(UPSERT_GAUGE)
                .bind(metric.id())
                .bind(value)
                .fetch_one(&mut *conn)
                .await?
                .try_get("value")?;
            (MetricValue::Gauge(stored), COUNTER_EXISTS, MetricKind::Counter)
        }
    };

    let conflict = sqlx::query(other_table)
        .bind(metric.id())
        .fetch_optional(&mut *conn)
        .await?;
    if conflict.is_some() {
        return Err(StorageError::KindMismatch {
            id: metric.id().to_string(),
            stored: other_kind,
            incoming: metric.kind(),
        });
    }

    trace!("upserted {} {}", metric.kind(), metric.id());
    Metric::new(metric.id(), merged)
}

fn metric_from_row(row: &SqliteRow) -> StorageResult<Metric> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let value = match kind.parse::<MetricKind>()? {
        MetricKind::Counter => MetricValue::Counter(row.try_get("value")?),
        MetricKind::Gauge => MetricValue::Gauge(row.try_get("value")?),
    };
    Metric::new(id, value)
}

#[async_trait]
impl Storage for DatabaseStore {
    #[instrument(skip_all, fields(id = metric.id()))]
    async fn put(&self, cancel: &CancellationToken, metric: Metric) -> StorageResult<Metric> {
        Ok(self.retrier.run(cancel, || self.put_once(&metric)).await?)
    }

    async fn get(&self, cancel: &CancellationToken, key: &MetricKey) -> StorageResult<Metric> {
        Ok(self.retrier.run(cancel, || self.get_once(key)).await?)
    }

    async fn list(&self, cancel: &CancellationToken) -> StorageResult<Vec<Metric>> {
        Ok(self.retrier.run(cancel, || self.list_once()).await?)
    }

    #[instrument(skip_all, fields(count = metrics.len()))]
    async fn put_batch(
        &self,
        cancel: &CancellationToken,
        metrics: Vec<Metric>,
    ) -> StorageResult<()> {
        if metrics.is_empty() {
            return Ok(());
        }

        debug!("writing batch of {} metrics", metrics.len());
        self.retrier
            .run(cancel, || self.put_batch_once(&metrics))
            .await?;
        debug!("batch committed");
        Ok(())
    }

    async fn ping(&self, cancel: &CancellationToken) -> StorageResult<()> {
        self.retrier
            .run(cancel, || async {
                sqlx::query("SELECT 1")
                    .execute(&self.pool)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing database backend");
        self.pool.close().await;
        Ok(())
    }
}
