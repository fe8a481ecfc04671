use axum::{extract::State, routing::get, Json, Router};
use retrieval_orchestrator::{FinancialVideo, LiveEventCategory};

use crate::{ApiResponse, AppError, AppState};

pub fn content_routes() -> Router<AppState> {
    Router::new()
        .route("/content/videos", get(get_videos))
        .route("/content/events", get(get_live_events))
}

async fn get_videos(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<FinancialVideo>>>, AppError> {
    let videos = state.insights.videos().await;
    tracing::info!("Retrieved {} financial videos", videos.len());
    Ok(Json(ApiResponse::success(videos)))
}

async fn get_live_events(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<LiveEventCategory>>>, AppError> {
    let events = state.insights.live_events().await;
    tracing::info!("Retrieved {} live event categories", events.len());
    Ok(Json(ApiResponse::success(events)))
}
