//! Observability HTTP endpoints
//!
//! `/healthz` is liveness, `/readyz` reports OK only while the time-series
//! table is reachable, `/metrics` renders the explicit registry.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Readiness probe dependency
#[async_trait]
pub trait Readiness: Send + Sync {
    /// Ok iff the service should receive traffic
    async fn ready(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl Readiness for crate::sinks::TimescaleSink {
    async fn ready(&self) -> anyhow::Result<()> {
        self.ping().await
    }
}

#[derive(Clone)]
struct AppState {
    registry: Registry,
    readiness: Arc<dyn Readiness>,
}

/// Build the observability router.
pub fn router(registry: Registry, readiness: Arc<dyn Readiness>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(AppState {
            registry,
            readiness,
        })
}

/// Bind and serve until the shutdown signal flips.
pub async fn serve(
    port: u16,
    registry: Registry,
    readiness: Arc<dyn Readiness>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "observability server listening");

    axum::serve(listener, router(registry, readiness))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.readiness.ready().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(err) => {
            error!(error = %err, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "not ready")
        }
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&state.registry.gather(), &mut buffer) {
        Ok(()) => (StatusCode::OK, buffer).into_response(),
        Err(err) => {
            error!(error = %err, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "encode failed").into_response()
        }
    }
}
