//! Storage backends for metric persistence
//!
//! This module provides a trait-based abstraction over where metrics live.
//!
//! ## Design
//!
//! - **Trait-based**: `Storage` trait allows swapping implementations
//! - **Async**: All operations are async and take a `CancellationToken`
//! - **One merge rule**: counters accumulate, gauges overwrite, everywhere
//!
//! ## Backends
//!
//! - **Memory**: No persistence, the merge authority for the file backend
//! - **File**: Memory plus newline-delimited JSON snapshots
//! - **SQLite**: Two upsert tables, transactional batches
//!
//! ## Usage
//!
//! ```no_run
//! use metrics_keeper::storage::{StorageSettings, open_storage};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cancel = CancellationToken::new();
//!     let storage = open_storage(&StorageSettings::default(), &cancel).await?;
//!     storage.ping(&cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod file;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

pub use backend::Storage;
pub use error::{StorageError, StorageResult};
pub use file::{FileStore, FileStoreConfig};
pub use memory::MemoryStore;
#[cfg(feature = "storage-sqlite")]
pub use sqlite::DatabaseStore;

use crate::retry::Retrier;

/// Resolved storage configuration
#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    /// Database connection string; non-empty selects the database backend
    pub database_url: Option<String>,

    /// Snapshot file; used when no database is configured
    pub file_path: Option<PathBuf>,

    /// Snapshot interval; zero dumps after every write
    pub store_interval: Duration,

    /// Load the snapshot on start
    pub restore: bool,

    /// Retry policy for backend I/O
    pub retrier: Retrier,
}

/// Build the storage backend selected by `settings`
///
/// Precedence: database, then file, then memory. The returned handle is
/// created once at startup and shared with every consumer.
pub async fn open_storage(
    settings: &StorageSettings,
    cancel: &CancellationToken,
) -> StorageResult<Arc<dyn Storage>> {
    #[cfg(feature = "storage-sqlite")]
    if let Some(url) = settings.database_url.as_deref().filter(|u| !u.is_empty()) {
        info!("using database storage");
        let store = DatabaseStore::connect(url, settings.retrier.clone(), cancel).await?;
        return Ok(Arc::new(store));
    }

    if let Some(path) = settings
        .file_path
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
    {
        info!("using file storage at {}", path.display());
        let config = FileStoreConfig {
            path: path.clone(),
            store_interval: settings.store_interval,
            restore: settings.restore,
        };
        let store = FileStore::open(config, &settings.retrier, cancel).await?;
        return Ok(Arc::new(store));
    }

    info!("using in-memory storage");
    Ok(Arc::new(MemoryStore::new()))
}
