//! Health and metrics endpoints.

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

#[derive(Clone)]
pub struct HttpState {
    pub registry: Arc<Registry>,
    pub healthy: Arc<AtomicBool>,
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
                service: "inference-worker",
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "starting",
                service: "inference-worker",
            }),
        )
    }
}

async fn metrics(State(state): State<HttpState>) -> String {
    state.registry.render()
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(state: HttpState, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "metrics endpoint listening");
    axum::serve(listener, router(state)).await
}
