//! File snapshot storage backend
//!
//! `FileStore` wraps a [`MemoryStore`] and persists full snapshots of it to a
//! file, one JSON [`MetricRecord`] per line.
//!
//! ## Durability Modes
//!
//! - **Synchronous** (`store_interval == 0`): every successful write is
//!   followed by a dump; a failed dump surfaces as
//!   `StorageError::DurabilityFailed` even though memory already changed
//! - **Periodic** (`store_interval > 0`): writes only touch memory, a
//!   background task dumps on every tick and stops for good on the first
//!   failed dump
//!
//! ## Restore
//!
//! On open, the snapshot is read (through the Retrier) and every record is
//! replayed through the same merge path live traffic uses. Lines that fail to
//! parse are skipped.
//!
//! `close` writes a final snapshot in periodic mode.
//!
//! Dumps go to `<path>.tmp` first and are renamed over the snapshot, so a
//! crash mid-write leaves the previous snapshot intact.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::backend::Storage;
use super::error::{StorageError, StorageResult};
use super::memory::MemoryStore;
use crate::metric::{Metric, MetricKey, MetricRecord};
use crate::retry::Retrier;

/// File backend configuration
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Snapshot file location
    pub path: PathBuf,

    /// Dump interval; zero means dump after every write
    pub store_interval: Duration,

    /// Load the existing snapshot before serving
    pub restore: bool,
}

/// Writes full snapshots of a memory store to disk
#[derive(Debug, Clone)]
struct Snapshotter {
    memory: Arc<MemoryStore>,
    path: PathBuf,
    /// Keeps the periodic task and synchronous writers from interleaving
    write_lock: Arc<Mutex<()>>,
}

impl Snapshotter {
    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    async fn dump(&self) -> StorageResult<usize> {
        let _guard = self.write_lock.lock().await;

        let metrics = self.memory.snapshot().await;
        let mut buffer = String::new();
        for metric in &metrics {
            buffer.push_str(&serde_json::to_string(&MetricRecord::from(metric))?);
            buffer.push('\n');
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, buffer.as_bytes()).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        trace!("dumped {} metrics to {}", metrics.len(), self.path.display());
        Ok(metrics.len())
    }
}

/// File snapshot storage backend
pub struct FileStore {
    snapshotter: Snapshotter,
    synchronous: bool,
    shutdown: CancellationToken,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl FileStore {
    /// Open the file backend
    ///
    /// This will:
    /// 1. Restore the snapshot at `config.path` (when `config.restore`)
    /// 2. Start the periodic dump task (when `config.store_interval > 0`)
    ///
    /// A missing snapshot file restores as an empty store.
    #[instrument(skip_all, fields(path = %config.path.display()))]
    pub async fn open(
        config: FileStoreConfig,
        retrier: &Retrier,
        cancel: &CancellationToken,
    ) -> StorageResult<Self> {
        let memory = Arc::new(MemoryStore::new());

        if config.restore {
            let path = config.path.as_path();
            restore(&memory, path, retrier, cancel, || read_snapshot(path)).await?;
        }

        let snapshotter = Snapshotter {
            memory,
            path: config.path,
            write_lock: Arc::new(Mutex::new(())),
        };

        let synchronous = config.store_interval.is_zero();
        let shutdown = cancel.child_token();

        let periodic = if synchronous {
            info!("file store in synchronous mode");
            None
        } else {
            info!("file store dumping every {:?}", config.store_interval);
            Some(spawn_periodic_dump(
                snapshotter.clone(),
                config.store_interval,
                shutdown.clone(),
            ))
        };

        Ok(Self {
            snapshotter,
            synchronous,
            shutdown,
            periodic: Mutex::new(periodic),
        })
    }

    /// Write a snapshot now, returning how many metrics it holds
    pub async fn dump(&self) -> StorageResult<usize> {
        self.snapshotter.dump().await
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.snapshotter.path
    }

    /// Whether the periodic dump task is still alive
    pub async fn is_periodic_dump_running(&self) -> bool {
        self.periodic
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn sync_dump(&self) -> StorageResult<()> {
        if self.synchronous {
            self.snapshotter
                .dump()
                .await
                .map_err(|e| StorageError::DurabilityFailed(Box::new(e)))?;
        }
        Ok(())
    }
}

async fn read_snapshot(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_record(line: &[u8]) -> StorageResult<Metric> {
    let record: MetricRecord = serde_json::from_slice(line)?;
    Metric::try_from(record)
}

/// Replay snapshot content into `memory`, returning (restored, skipped)
///
/// Lines are split on raw bytes, so one line that is not valid UTF-8 only
/// costs that line.
async fn replay(memory: &MemoryStore, content: &[u8]) -> (usize, usize) {
    let mut restored = 0;
    let mut skipped = 0;

    let lines = content
        .split(|b| *b == b'\n')
        .filter(|l| !l.trim_ascii().is_empty());
    for line in lines {
        match parse_record(line) {
            Ok(metric) => match memory.merge(metric).await {
                Ok(_) => restored += 1,
                Err(e) => {
                    trace!("skipping snapshot record: {}", e);
                    skipped += 1;
                }
            },
            Err(e) => {
                trace!("skipping unreadable snapshot line: {}", e);
                skipped += 1;
            }
        }
    }

    (restored, skipped)
}

async fn restore<F, Fut>(
    memory: &MemoryStore,
    path: &Path,
    retrier: &Retrier,
    cancel: &CancellationToken,
    read: F,
) -> StorageResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<Option<Vec<u8>>>>,
{
    let Some(content) = retrier.run(cancel, read).await? else {
        info!("no snapshot at {}, starting empty", path.display());
        return Ok(());
    };

    let (restored, skipped) = replay(memory, &content).await;
    if skipped > 0 {
        warn!("skipped {} unreadable records in {}", skipped, path.display());
    }
    info!("restored {} records from {}", restored, path.display());
    Ok(())
}

fn spawn_periodic_dump(
    snapshotter: Snapshotter,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("periodic dump stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = snapshotter.dump().await {
                        error!(
                            "snapshot dump to {} failed, periodic dumps disabled: {}",
                            snapshotter.path.display(),
                            e
                        );
                        break;
                    }
                }
            }
        }
    })
}

#[async_trait]
impl Storage for FileStore {
    async fn put(&self, cancel: &CancellationToken, metric: Metric) -> StorageResult<Metric> {
        let merged = self.snapshotter.memory.put(cancel, metric).await?;
        self.sync_dump().await?;
        Ok(merged)
    }

    async fn get(&self, cancel: &CancellationToken, key: &MetricKey) -> StorageResult<Metric> {
        self.snapshotter.memory.get(cancel, key).await
    }

    async fn list(&self, cancel: &CancellationToken) -> StorageResult<Vec<Metric>> {
        self.snapshotter.memory.list(cancel).await
    }

    async fn put_batch(
        &self,
        cancel: &CancellationToken,
        metrics: Vec<Metric>,
    ) -> StorageResult<()> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let (applied, first_error) = self.snapshotter.memory.merge_all(metrics).await;
        if applied > 0 {
            self.sync_dump().await?;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn ping(&self, cancel: &CancellationToken) -> StorageResult<()> {
        self.snapshotter.memory.ping(cancel).await
    }

    /// Stop the periodic task and write one final snapshot
    ///
    /// In periodic mode the final dump runs even when the task already
    /// stopped after a failed dump, since it is the last chance to persist
    /// accepted writes. Its failure is returned. Synchronous mode has nothing
    /// left to flush.
    async fn close(&self) -> StorageResult<()> {
        self.shutdown.cancel();

        let handle = self.periodic.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("periodic dump task ended abnormally: {}", e);
            }
            let count = self.snapshotter.dump().await?;
            info!("final snapshot of {} metrics written", count);
        }

        debug!("file store closed");
        Ok(())
    }
}
