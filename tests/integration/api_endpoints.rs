//! Integration tests for the HTTP routes
//!
//! Requests go straight through the router with `oneshot`, no socket needed.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use metrics_keeper::api::{ApiState, router};
use metrics_keeper::storage::MemoryStore;
use metrics_keeper::{MetricRecord, Storage};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn test_app() -> (Router, Arc<dyn Storage>) {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStore::new());
    let state = ApiState::new(storage.clone(), CancellationToken::new());
    (router(state), storage)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn post_text(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_text_update_accumulates_counter() {
    let (app, _) = test_app();

    let (status, body) = send(&app, post_text("/update/counter/PollCount/3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "3");

    let (_, body) = send(&app, post_text("/update/counter/PollCount/4")).await;
    assert_eq!(body, "7");

    let (status, body) = send(&app, get("/value/counter/PollCount")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "7");
}

#[tokio::test]
async fn test_text_update_overwrites_gauge() {
    let (app, _) = test_app();

    send(&app, post_text("/update/gauge/Alloc/1.5")).await;
    let (status, body) = send(&app, post_text("/update/gauge/Alloc/2.25")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "2.25");
}

#[tokio::test]
async fn test_text_update_rejects_bad_input() {
    let (app, _) = test_app();

    let (status, _) = send(&app, post_text("/update/histogram/x/1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post_text("/update/counter/x/1.5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post_text("/update/gauge/x/nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_kind_conflict_is_bad_request() {
    let (app, _) = test_app();

    send(&app, post_text("/update/counter/shared/1")).await;
    let (status, _) = send(&app, post_text("/update/gauge/shared/1.0")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_value_is_not_found() {
    let (app, _) = test_app();

    let (status, _) = send(&app, get("/value/gauge/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json("/value/", json!({"id": "missing", "type": "counter"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_json_update_and_lookup() {
    let (app, _) = test_app();

    let (status, body) = send(
        &app,
        post_json("/update/", json!({"id": "hits", "type": "counter", "delta": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let record: MetricRecord = serde_json::from_str(&body).unwrap();
    assert_eq!(record.delta, Some(2));

    send(
        &app,
        post_json("/update/", json!({"id": "hits", "type": "counter", "delta": 5})),
    )
    .await;

    let (status, body) = send(
        &app,
        post_json("/value/", json!({"id": "hits", "type": "counter"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({"id": "hits", "type": "counter", "delta": 7})
    );
}

#[tokio::test]
async fn test_json_update_requires_matching_field() {
    let (app, _) = test_app();

    let (status, _) = send(&app, post_json("/update/", json!({"id": "c", "type": "counter"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json("/update/", json!({"id": "g", "type": "gauge", "delta": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_update_is_validated_up_front() {
    let (app, storage) = test_app();

    let (status, _) = send(
        &app,
        post_json(
            "/updates/",
            json!([
                {"id": "ok", "type": "counter", "delta": 1},
                {"id": "bad", "type": "gauge"},
            ]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(storage.list(&CancellationToken::new()).await.unwrap().is_empty());

    let (status, body) = send(
        &app,
        post_json(
            "/updates/",
            json!([
                {"id": "ok", "type": "counter", "delta": 1},
                {"id": "ok", "type": "counter", "delta": 2},
                {"id": "load", "type": "gauge", "value": 0.5},
            ]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "{}");

    let (_, body) = send(&app, get("/value/counter/ok")).await;
    assert_eq!(body, "3");
}

#[tokio::test]
async fn test_list_and_ping() {
    let (app, _) = test_app();

    send(&app, post_text("/update/gauge/b/1")).await;
    send(&app, post_text("/update/counter/a/1")).await;

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    let records: Vec<MetricRecord> = serde_json::from_str(&body).unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    let (status, body) = send(&app, get("/ping")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "pong");
}

#[tokio::test]
async fn test_shutdown_maps_to_unavailable() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStore::new());
    let shutdown = CancellationToken::new();
    let app = router(ApiState::new(storage, shutdown.clone()));
    shutdown.cancel();

    let (status, _) = send(&app, post_text("/update/counter/x/1")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
