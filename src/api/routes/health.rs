//! Liveness endpoint

use axum::extract::State;

use crate::api::{error::ApiResult, state::ApiState};

/// GET /ping
///
/// Succeeds when the storage backend answers its ping
pub async fn ping(State(state): State<ApiState>) -> ApiResult<&'static str> {
    state.storage.ping(&state.shutdown).await?;
    Ok("pong")
}
