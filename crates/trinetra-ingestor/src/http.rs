//! Health, metrics, and camera listing endpoints.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use trinetra_core::metrics::Registry;

/// Shared endpoint state. `active_cameras` is refreshed by the caller's
/// closure so the router stays decoupled from the service type.
#[derive(Clone)]
pub struct HttpState {
    pub registry: Arc<Registry>,
    pub healthy: Arc<AtomicBool>,
    pub active_cameras: Arc<dyn Fn() -> Vec<String> + Send + Sync>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health(State(state): State<HttpState>) -> (StatusCode, Json<HealthResponse>) {
    if state.healthy.load(Ordering::Relaxed) {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                service: "stream-ingestor",
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "starting",
                service: "stream-ingestor",
            }),
        )
    }
}

async fn metrics(State(state): State<HttpState>) -> String {
    state.registry.render()
}

#[derive(Serialize)]
struct CamerasResponse {
    active_tasks: Vec<String>,
}

async fn cameras(State(state): State<HttpState>) -> Json<CamerasResponse> {
    Json(CamerasResponse {
        active_tasks: (state.active_cameras)(),
    })
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/cameras", get(cameras))
        .with_state(state)
}

/// Serve the endpoints until the process exits.
pub async fn serve(state: HttpState, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "metrics endpoint listening");
    axum::serve(listener, router(state)).await
}
