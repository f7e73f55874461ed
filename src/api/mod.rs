//! HTTP server for receiving and serving metrics
//!
//! A thin layer over [`Storage`](crate::storage::Storage): handlers decode a
//! request into a metric, call the store and encode the result.
//!
//! ## Endpoints
//!
//! - `POST /update/{kind}/{id}/{value}` - Text update
//! - `POST /update/` - JSON update
//! - `POST /updates/` - JSON batch update
//! - `GET /value/{kind}/{id}` - Text lookup
//! - `POST /value/` - JSON lookup
//! - `GET /` - All stored metrics
//! - `GET /ping` - Storage liveness

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the router with all routes and middleware
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(routes::list::list_metrics))
        .route("/ping", get(routes::health::ping))
        .route(
            "/update/:kind/:id/:value",
            post(routes::update::update_text),
        )
        .route("/update/", post(routes::update::update_json))
        .route("/updates/", post(routes::update::update_batch))
        .route("/value/:kind/:id", get(routes::value::value_text))
        .route("/value/", post(routes::value::value_json))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(RequestDecompressionLayer::new()),
        )
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task that stops once
/// `state.shutdown` is cancelled. Returns the server's local address and the
/// task handle.
pub async fn spawn_api_server(
    bind_addr: SocketAddr,
    state: ApiState,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    info!("starting API server on {}", bind_addr);

    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await });
        if let Err(e) = server.await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok((addr, handle))
}
