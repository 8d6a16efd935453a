//! Health Check and Metrics Endpoint
//!
//! Health checks, session status reporting and Prometheus metrics. Mounted
//! on the gateway's HTTP port next to the API routes.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (broker session connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::services::{SessionSnapshot, SessionState, SubscriptionRegistry};
use crate::domain::subscription::SubscriptionStats;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Broker session status.
    pub broker: SessionSnapshot,
    /// Streaming subscription statistics.
    pub subscriptions: SubscriptionStats,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Session connected, no outstanding error.
    Healthy,
    /// Session connected, but the broker reported an error.
    Degraded,
    /// Session not connected.
    Unhealthy,
}

// =============================================================================
// Health State
// =============================================================================

/// Shared state for the health routes.
pub struct HealthState {
    version: String,
    started_at: Instant,
    session: Arc<SessionState>,
    registry: Arc<SubscriptionRegistry>,
}

impl HealthState {
    /// Create health state.
    #[must_use]
    pub fn new(
        version: String,
        session: Arc<SessionState>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            session,
            registry,
        }
    }
}

/// Health and metrics routes.
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.session.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthState) -> HealthResponse {
    let broker = state.session.snapshot();
    HealthResponse {
        status: determine_health_status(&broker),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        broker,
        subscriptions: state.registry.stats(),
    }
}

fn determine_health_status(session: &SessionSnapshot) -> HealthStatus {
    use crate::application::services::ConnectionState;

    match (session.state, &session.last_error) {
        (ConnectionState::Connected, None) => HealthStatus::Healthy,
        (ConnectionState::Connected, Some(_)) => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Tests
// =============================================================================
