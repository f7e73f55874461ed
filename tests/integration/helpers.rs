//! Test helpers shared by the integration tests

use std::sync::Arc;
use std::time::Duration;

use metrics_keeper::retry::Retrier;
use metrics_keeper::storage::{FileStore, FileStoreConfig, MemoryStore, Storage};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "storage-sqlite")]
use metrics_keeper::storage::DatabaseStore;

/// Backends exercised by the contract tests
#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Memory,
    File,
    #[cfg(feature = "storage-sqlite")]
    Database,
}

pub fn all_backends() -> Vec<Backend> {
    vec![
        Backend::Memory,
        Backend::File,
        #[cfg(feature = "storage-sqlite")]
        Backend::Database,
    ]
}

/// A store plus the temp directory backing it
pub struct TestStore {
    pub storage: Arc<dyn Storage>,
    pub _dir: TempDir,
}

/// Retry policy short enough for tests
pub fn test_retrier() -> Retrier {
    Retrier::default()
        .with_initial_interval(Duration::from_millis(5))
        .with_max_interval(Duration::from_millis(50))
        .with_max_elapsed(Duration::from_secs(5))
}

/// Synchronous-mode file store config at `dir/metrics.json`
pub fn sync_file_config(dir: &TempDir) -> FileStoreConfig {
    FileStoreConfig {
        path: dir.path().join("metrics.json"),
        store_interval: Duration::ZERO,
        restore: true,
    }
}

pub async fn open_backend(backend: Backend) -> TestStore {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let storage: Arc<dyn Storage> = match backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::File => Arc::new(
            FileStore::open(sync_file_config(&dir), &test_retrier(), &cancel)
                .await
                .unwrap(),
        ),
        #[cfg(feature = "storage-sqlite")]
        Backend::Database => {
            let url = format!("sqlite://{}", dir.path().join("metrics.db").display());
            Arc::new(
                DatabaseStore::connect(&url, test_retrier(), &cancel)
                    .await
                    .unwrap(),
            )
        }
    };

    TestStore { storage, _dir: dir }
}
