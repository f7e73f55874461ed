//! API shared state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::storage::Storage;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// The storage backend chosen at startup
    pub storage: Arc<dyn Storage>,

    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
}

impl ApiState {
    pub fn new(storage: Arc<dyn Storage>, shutdown: CancellationToken) -> Self {
        Self { storage, shutdown }
    }
}
