//! Metric update endpoints

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::api::{error::ApiResult, state::ApiState};
use crate::metric::{Metric, MetricKind, MetricRecord};

/// POST /update/{kind}/{id}/{value}
///
/// Text form; responds with the post-merge value
#[instrument(skip_all, fields(kind = %kind, id = %id))]
pub async fn update_text(
    State(state): State<ApiState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind.parse()?;
    let metric = Metric::new(id, kind.parse_value(&value)?)?;

    let merged = state.storage.put(&state.shutdown, metric).await?;
    Ok(merged.value().to_string())
}

/// POST /update/
///
/// JSON form; responds with the post-merge record
#[instrument(skip_all, fields(id = %record.id))]
pub async fn update_json(
    State(state): State<ApiState>,
    Json(record): Json<MetricRecord>,
) -> ApiResult<Json<MetricRecord>> {
    let metric = Metric::try_from(record)?;

    let merged = state.storage.put(&state.shutdown, metric).await?;
    Ok(Json(MetricRecord::from(&merged)))
}

/// POST /updates/
///
/// Batch form. Every record is validated before anything reaches the store.
#[instrument(skip_all, fields(count = records.len()))]
pub async fn update_batch(
    State(state): State<ApiState>,
    Json(records): Json<Vec<MetricRecord>>,
) -> ApiResult<Json<Value>> {
    let metrics = records
        .into_iter()
        .map(Metric::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    debug!("received batch of {} metrics", metrics.len());
    state.storage.put_batch(&state.shutdown, metrics).await?;
    Ok(Json(json!({})))
}
