//! AI analysis endpoints. Each has a fallback body so a provider outage
//! still yields a 200 with explanatory content.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    middleware,
    routing::post,
    Json, Router,
};
use pulse_core::RateTier;
use retrieval_orchestrator::{
    AiAnalysisResult, BacktestResult, BacktestScenario, CompanyProfile, RetirementInputs,
    SentimentAnalysisResult, RETIREMENT_UNAVAILABLE,
};
use serde::Deserialize;

use crate::rate_limit::{rate_limit_middleware, RateLimiter, TierGuard};
use crate::{validation, ApiResponse, AppError, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRequest {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub analysis_type: Option<String>,
}

#[derive(Deserialize)]
pub struct BacktestRequest {
    pub scenario: BacktestScenario,
}

/// AI tier on analysis, sentiment and retirement; expensive tier on backtest.
pub fn analysis_routes(limiter: Arc<RateLimiter>) -> Router<AppState> {
    let ai = Router::new()
        .route("/analysis/ai", post(get_ai_analysis))
        .route("/analysis/sentiment", post(get_sentiment_analysis))
        .route("/analysis/retirement", post(get_retirement_analysis))
        .route_layer(middleware::from_fn_with_state(
            TierGuard::new(limiter.clone(), RateTier::Ai),
            rate_limit_middleware,
        ));

    let expensive = Router::new()
        .route("/analysis/backtest", post(run_backtest))
        .route_layer(middleware::from_fn_with_state(
            TierGuard::new(limiter, RateTier::Expensive),
            rate_limit_middleware,
        ));

    ai.merge(expensive)
}

fn company(request: &CompanyRequest) -> Result<CompanyProfile, AppError> {
    Ok(CompanyProfile {
        ticker: validation::ticker(&request.ticker)?,
        name: validation::company_name(&request.name)?,
    })
}

async fn get_ai_analysis(
    State(state): State<AppState>,
    payload: Result<Json<CompanyRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AiAnalysisResult>>, AppError> {
    let request = validation::body(payload)?;
    let company = company(&request)?;
    let analysis_type =
        validation::analysis_type(request.analysis_type.as_deref().unwrap_or_default())?;
    tracing::info!("Fetching AI analysis for {} ({})", company.ticker, analysis_type);

    let analysis = state
        .insights
        .ai_analysis(&company, analysis_type)
        .await
        .unwrap_or_else(|| AiAnalysisResult::unavailable(analysis_type));

    Ok(Json(
        ApiResponse::success(analysis)
            .with_message(format!("AI analysis completed for {}", company.ticker)),
    ))
}

async fn get_sentiment_analysis(
    State(state): State<AppState>,
    payload: Result<Json<CompanyRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<SentimentAnalysisResult>>, AppError> {
    let request = validation::body(payload)?;
    let company = company(&request)?;
    tracing::info!("Fetching sentiment analysis for {}", company.ticker);

    let sentiment = state
        .insights
        .sentiment(&company)
        .await
        .unwrap_or_else(SentimentAnalysisResult::unavailable);

    Ok(Json(
        ApiResponse::success(sentiment)
            .with_message(format!("Sentiment analysis completed for {}", company.ticker)),
    ))
}

async fn run_backtest(
    State(state): State<AppState>,
    payload: Result<Json<BacktestRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<BacktestResult>>, AppError> {
    let scenario = validation::backtest(validation::body(payload)?.scenario)?;
    tracing::info!("Running backtest {} for {}", scenario.id, scenario.ticker);

    let result = state
        .insights
        .backtest(&scenario)
        .await
        .unwrap_or_else(BacktestResult::failed);

    Ok(Json(
        ApiResponse::success(result)
            .with_message(format!("Backtest completed for scenario {}", scenario.id)),
    ))
}

async fn get_retirement_analysis(
    State(state): State<AppState>,
    payload: Result<Json<RetirementInputs>, JsonRejection>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let inputs = validation::body(payload)?;
    validation::retirement(&inputs)?;
    tracing::info!(
        "Fetching retirement analysis: age {} to {}",
        inputs.current_age,
        inputs.retirement_age
    );

    let analysis = state
        .insights
        .retirement(&inputs)
        .await
        .unwrap_or_else(|| RETIREMENT_UNAVAILABLE.to_string());

    Ok(Json(
        ApiResponse::success(analysis).with_message("Retirement analysis completed"),
    ))
}
