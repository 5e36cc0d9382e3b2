//! HTTP servers.
//!
//! Two listeners: the primary JSON-RPC surface (`POST /mcp/:method` plus a
//! versioned `GET /health`), and a dedicated health listener that shares
//! nothing with the request pipeline and answers within one second.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use skygate_common::{GatewayError, Result};

use crate::dispatch;
use crate::state::AppState;

/// Builds the primary router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp/:method", post(dispatch::handle_rpc))
        .route("/health", get(primary_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Builds the dedicated health router with its own tight timeout.
pub fn health_router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .layer(TimeoutLayer::new(Duration::from_secs(1)))
}

/// Runs the primary server until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| GatewayError::Internal(format!("failed to bind {addr}: {err}")))?;
    info!(
        "gateway listening on {}",
        listener
            .local_addr()
            .map_err(|err| GatewayError::Internal(err.to_string()))?
    );

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|err| GatewayError::Internal(format!("server error: {err}")))
}

/// Runs the health server until `shutdown` resolves.
pub async fn serve_health(
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| GatewayError::Internal(format!("failed to bind {addr}: {err}")))?;
    info!(
        "health listener on {}",
        listener
            .local_addr()
            .map_err(|err| GatewayError::Internal(err.to_string()))?
    );

    axum::serve(listener, health_router())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| GatewayError::Internal(format!("health server error: {err}")))
}

async fn primary_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
