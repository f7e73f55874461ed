//! Error types for storage operations

use std::fmt;

use crate::metric::{MetricKey, MetricKind};
use crate::retry::{RetryError, Transient};

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug)]
pub enum StorageError {
    /// No value is stored under the requested id and kind
    NotFound(MetricKey),

    /// Malformed numeric payload or id
    InvalidValue(String),

    /// Unknown metric kind
    InvalidType(String),

    /// The id is already stored with a different kind
    KindMismatch {
        id: String,
        stored: MetricKind,
        incoming: MetricKind,
    },

    /// I/O error (snapshot file access, etc.)
    IoError(std::io::Error),

    /// Snapshot record serialization/deserialization error
    SerializationError(String),

    /// Database driver error
    #[cfg(feature = "storage-sqlite")]
    DatabaseError(sqlx::Error),

    /// Memory was updated but the snapshot could not be written
    DurabilityFailed(Box<StorageError>),

    /// The operation was cancelled by its caller
    Cancelled,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(key) => write!(f, "metric not found: {} ({})", key.id, key.kind),
            StorageError::InvalidValue(msg) => write!(f, "invalid metric value: {}", msg),
            StorageError::InvalidType(kind) => write!(f, "invalid metric type: {}", kind),
            StorageError::KindMismatch {
                id,
                stored,
                incoming,
            } => write!(
                f,
                "metric {} is stored as {}, refusing {} update",
                id, stored, incoming
            ),
            StorageError::IoError(err) => write!(f, "I/O error: {}", err),
            StorageError::SerializationError(msg) => {
                write!(f, "metric serialization error: {}", msg)
            }
            #[cfg(feature = "storage-sqlite")]
            StorageError::DatabaseError(err) => write!(f, "database error: {}", err),
            StorageError::DurabilityFailed(err) => {
                write!(f, "metric stored in memory but snapshot failed: {}", err)
            }
            StorageError::Cancelled => write!(f, "storage operation cancelled"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(err) => Some(err),
            #[cfg(feature = "storage-sqlite")]
            StorageError::DatabaseError(err) => Some(err),
            StorageError::DurabilityFailed(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl StorageError {
    /// Whether the error came from a cancelled context rather than from data
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Cancelled)
    }
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        match self {
            StorageError::IoError(err) => !matches!(
                err.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::InvalidInput
                    | std::io::ErrorKind::InvalidData
            ),
            #[cfg(feature = "storage-sqlite")]
            StorageError::DatabaseError(err) => is_transient_sqlx(err),
            _ => false,
        }
    }
}

#[cfg(feature = "storage-sqlite")]
fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
        // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("5" | "6" | "261" | "262" | "517")
        ),
        _ => false,
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::IoError(io_err),
            _ => StorageError::DatabaseError(err),
        }
    }
}

impl From<RetryError<StorageError>> for StorageError {
    fn from(err: RetryError<StorageError>) -> Self {
        match err {
            RetryError::Cancelled => StorageError::Cancelled,
            RetryError::Permanent(err) | RetryError::Exhausted { last: err, .. } => err,
        }
    }
}
