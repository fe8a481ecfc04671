//! Stock quotes, watchlist prices and regional market indices.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use retrieval_orchestrator::{MarketIndex, StockData, WatchlistPriceData};
use serde::Deserialize;

use crate::{validation, ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct WatchlistPricesRequest {
    #[serde(default)]
    pub tickers: Vec<String>,
}

pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/stocks/:ticker", get(get_stock_data))
        .route("/stocks/watchlist/prices", post(get_watchlist_prices))
        .route("/stocks/indices/:region", get(get_market_indices))
}

async fn get_stock_data(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ApiResponse<StockData>>, AppError> {
    let ticker = validation::ticker(&ticker)?;
    tracing::info!("Fetching stock data for {}", ticker);

    let data = state.insights.stock_data(&ticker).await.ok_or_else(|| {
        AppError::not_found(format!("Stock data not found for ticker {}", ticker))
    })?;

    Ok(Json(
        ApiResponse::success(data).with_message(format!("Stock data retrieved for {}", ticker)),
    ))
}

async fn get_watchlist_prices(
    State(state): State<AppState>,
    payload: Result<Json<WatchlistPricesRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Vec<WatchlistPriceData>>>, AppError> {
    let request = validation::body(payload)?;
    let tickers = validation::watchlist(&request.tickers)?;
    tracing::info!("Fetching watchlist prices for {} tickers", tickers.len());

    let prices = state.insights.watchlist_prices(&tickers).await;
    Ok(Json(ApiResponse::success(prices)))
}

async fn get_market_indices(
    State(state): State<AppState>,
    Path(region): Path<String>,
) -> Result<Json<ApiResponse<Vec<MarketIndex>>>, AppError> {
    let region = validation::region(&region)?;
    tracing::info!("Fetching market indices for {}", region.as_str());

    let indices = state.insights.market_indices(region).await;
    Ok(Json(ApiResponse::success(indices)))
}
