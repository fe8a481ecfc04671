use axum::{extract::State, routing::{get, post}, Json, Router};

use crate::monitoring::MetricsSnapshot;
use crate::{ApiResponse, AppError, AppState};

pub fn metrics_routes() -> Router<AppState> {
    Router::new()
        .route("/metrics/json", get(get_metrics))
        .route("/metrics/reset", post(reset_metrics))
}

async fn get_metrics(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MetricsSnapshot>>, AppError> {
    Ok(Json(ApiResponse::success(state.monitor.get_metrics())))
}

async fn reset_metrics(State(state): State<AppState>) -> Result<Json<ApiResponse<String>>, AppError> {
    state.monitor.reset();
    Ok(Json(ApiResponse::success("Metrics reset".to_string())))
}
