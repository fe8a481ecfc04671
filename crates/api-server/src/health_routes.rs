//! Liveness, readiness and dependency health.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde_json::json;
use tokio::time::Instant;

use crate::{request_id::current_request_id, AppState};

const API_VERSION: &str = "v1";

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Market pulse API is running",
        "version": API_VERSION,
        "environment": state.config.environment,
        "uptime": state.started.elapsed().as_secs(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 503 when the provider ping fails; cache and call counters are included
/// either way.
async fn health_detailed(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let orchestrator = state.insights.orchestrator();
    let provider_healthy = orchestrator.provider_healthy().await;
    let response_ms = started.elapsed().as_millis() as u64;

    tracing::info!(
        "Detailed health check: provider {} in {}ms",
        if provider_healthy { "up" } else { "down" },
        response_ms
    );

    let status = if provider_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "success": provider_healthy,
        "data": {
            "status": if provider_healthy { "healthy" } else { "degraded" },
            "version": API_VERSION,
            "environment": state.config.environment,
            "responseTime": response_ms,
            "uptime": state.started.elapsed().as_secs(),
            "services": {
                "provider": {
                    "status": if provider_healthy { "up" } else { "down" },
                    "stats": orchestrator.stats(),
                },
                "cache": {
                    "status": "up",
                    "stats": orchestrator.cache().stats(),
                },
            },
            "rateLimiter": { "trackedWindows": state.limiter.tracked() },
        },
        "timestamp": Utc::now().to_rfc3339(),
        "requestId": current_request_id(),
    });

    (status, Json(body))
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.insights.orchestrator().provider_healthy().await;
    let (status, message) = if ready {
        (StatusCode::OK, "Service is ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service is not ready")
    };
    (
        status,
        Json(json!({
            "success": ready,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

async fn liveness() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Service is alive",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
