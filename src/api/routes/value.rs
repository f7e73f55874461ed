//! Metric lookup endpoints

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{error::ApiResult, state::ApiState};
use crate::metric::{MetricKey, MetricKind, MetricRecord};

/// GET /value/{kind}/{id}
pub async fn value_text(
    State(state): State<ApiState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<String> {
    let key = MetricKey::new(id, kind.parse::<MetricKind>()?);

    let metric = state.storage.get(&state.shutdown, &key).await?;
    Ok(metric.value().to_string())
}

/// POST /value/
///
/// Takes a record carrying `id` and `type`; numeric fields are ignored
pub async fn value_json(
    State(state): State<ApiState>,
    Json(record): Json<MetricRecord>,
) -> ApiResult<Json<MetricRecord>> {
    let key = MetricKey::new(record.id, record.kind.parse::<MetricKind>()?);

    let metric = state.storage.get(&state.shutdown, &key).await?;
    Ok(Json(MetricRecord::from(&metric)))
}
