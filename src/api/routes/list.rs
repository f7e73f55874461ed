//! Full listing endpoint

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState};
use crate::metric::MetricRecord;

/// GET /
///
/// Every stored metric, ordered by kind then id
pub async fn list_metrics(State(state): State<ApiState>) -> ApiResult<Json<Vec<MetricRecord>>> {
    let metrics = state.storage.list(&state.shutdown).await?;
    Ok(Json(metrics.iter().map(MetricRecord::from).collect()))
}
