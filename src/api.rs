//! Health & metrics API endpoints
//!
//! - GET /health - Simple health check
//! - GET /metrics - Prometheus metrics
//! - GET /status - Uptime and configured networks

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::metrics;
use crate::types::NetworkLabel;

/// Server start time for uptime calculation
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Networks reported by /status
#[derive(Clone)]
struct AppState {
    networks: Arc<Vec<NetworkLabel>>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    networks: Vec<NetworkStatus>,
}

#[derive(Serialize)]
struct NetworkStatus {
    name: String,
    chain_id: u64,
    in_flight: f64,
    logs_received: f64,
}

/// Bind `addr` and serve until `shutdown` flips to true
pub async fn start_api_server(
    addr: SocketAddr,
    networks: Vec<NetworkLabel>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    info!("  /health  - Liveness");
    info!("  /metrics - Prometheus metrics");
    info!("  /status  - Uptime and per-network counters (JSON)");
    serve(listener, networks, shutdown).await
}

/// Serve on an already-bound listener, draining connections on shutdown
pub async fn serve(
    listener: TcpListener,
    networks: Vec<NetworkLabel>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    START_TIME.get_or_init(Instant::now);
    metrics::UP.set(1.0);

    axum::serve(listener, router(networks))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("API server stopped");
    metrics::UP.set(0.0);
    Ok(())
}

fn router(networks: Vec<NetworkLabel>) -> Router {
    let state = AppState {
        networks: Arc::new(networks),
    };

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/status", get(status))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(build_status_response(&state.networks))
}

fn build_status_response(networks: &[NetworkLabel]) -> StatusResponse {
    let uptime = START_TIME
        .get()
        .map(|t| t.elapsed().as_secs())
        .unwrap_or(0);

    StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime,
        networks: networks
            .iter()
            .map(|n| NetworkStatus {
                name: n.name.clone(),
                chain_id: n.chain_id,
                in_flight: metrics::IN_FLIGHT.with_label_values(&[&n.name]).get(),
                logs_received: metrics::LOGS_RECEIVED.with_label_values(&[&n.name]).get(),
            })
            .collect(),
    }
}
