//! HTTP API for health checks, Prometheus metrics and the latest tick

use agent_lib::{
    collector::TickReport,
    health::{ComponentStatus, HealthRegistry},
    observability::AgentMetrics,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AgentMetrics,
    /// Most recent tick, published by the report consumer
    pub latest: Arc<RwLock<Option<TickReport>>>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: AgentMetrics) -> Self {
        Self {
            health_registry,
            metrics,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn publish(&self, report: TickReport) {
        *self.latest.write().await = Some(report);
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        // Zero-filled samples still produce output
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        state
            .health_registry
            .set_degraded(
                agent_lib::health::components::EXPORTER,
                format!("Metrics encoding failed: {}", e),
            )
            .await;
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Latest tick report - 503 until the first tick completes
async fn measure(State(state): State<Arc<AppState>>) -> Response {
    match state.latest.read().await.clone() {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/measure", get(measure))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run the API server, reporting a failure through logs and exporter health
pub async fn run(port: u16, state: Arc<AppState>) {
    let health_registry = state.health_registry.clone();

    if let Err(e) = serve(port, state).await {
        error!(port = port, error = %e, "API server stopped");
        health_registry
            .set_unhealthy(
                agent_lib::health::components::EXPORTER,
                format!("API server failed: {}", e),
            )
            .await;
    }
}
