//! Financial news feed and the dashboard bundle.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    middleware,
    routing::get,
    Json, Router,
};
use pulse_core::RateTier;
use retrieval_orchestrator::{DashboardData, FinancialNewsArticle};
use serde::Deserialize;

use crate::rate_limit::{rate_limit_middleware, RateLimiter, TierGuard};
use crate::{validation, ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct NewsQuery {
    /// A category label, or "Todo" for all.
    pub category: Option<String>,
}

pub fn news_routes(limiter: Arc<RateLimiter>) -> Router<AppState> {
    let dashboard = Router::new()
        .route("/news/dashboard", get(get_dashboard))
        .route_layer(middleware::from_fn_with_state(
            TierGuard::new(limiter, RateTier::Expensive),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/news", get(get_financial_news))
        .merge(dashboard)
}

async fn get_financial_news(
    State(state): State<AppState>,
    Query(query): Query<NewsQuery>,
) -> Result<Json<ApiResponse<Vec<FinancialNewsArticle>>>, AppError> {
    let category = validation::category(query.category.as_deref())?;
    tracing::info!(
        "Fetching financial news ({})",
        category.map_or("all categories", |c| c.as_str())
    );

    let articles = state.insights.financial_news(category).await;
    let count = articles.len();
    Ok(Json(
        ApiResponse::success(articles).with_message(format!("Retrieved {} articles", count)),
    ))
}

/// An unavailable provider yields an empty dashboard rather than an error.
async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DashboardData>>, AppError> {
    tracing::info!("Fetching dashboard data");
    let dashboard = state.insights.dashboard().await.unwrap_or_default();
    Ok(Json(ApiResponse::success(dashboard)))
}
