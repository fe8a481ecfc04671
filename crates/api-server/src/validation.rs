//! Request validation. Every failure maps to a 400.

use std::str::FromStr;

use axum::{extract::rejection::JsonRejection, Json};
use retrieval_orchestrator::{
    AnalysisType, BacktestScenario, NewsCategory, Region, RetirementInputs,
};

use crate::AppError;

const MAX_TICKER_LEN: usize = 10;
const MAX_WATCHLIST: usize = 50;

/// Uppercase a ticker and check it against `[A-Z^.-]{1,10}`.
pub fn ticker(raw: &str) -> Result<String, AppError> {
    let ticker = raw.trim().to_uppercase();
    let valid = !ticker.is_empty()
        && ticker.len() <= MAX_TICKER_LEN
        && ticker
            .chars()
            .all(|c| c.is_ascii_uppercase() || matches!(c, '^' | '.' | '-'));
    if valid {
        Ok(ticker)
    } else {
        Err(AppError::bad_request(format!("Invalid ticker format: {}", raw)))
    }
}

/// Unwrap a JSON body, turning a malformed or mistyped body into a 400.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

pub fn watchlist(raw: &[String]) -> Result<Vec<String>, AppError> {
    if raw.is_empty() || raw.len() > MAX_WATCHLIST {
        return Err(AppError::bad_request(format!(
            "Tickers must be a list of 1-{} symbols",
            MAX_WATCHLIST
        )));
    }
    raw.iter().map(|t| ticker(t)).collect()
}

pub fn region(raw: &str) -> Result<Region, AppError> {
    Region::from_str(raw).map_err(AppError::bad_request)
}

/// `None` means all categories.
pub fn category(raw: Option<&str>) -> Result<Option<NewsCategory>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(label) if label == NewsCategory::ALL_LABEL => Ok(None),
        Some(label) => NewsCategory::from_str(label)
            .map(Some)
            .map_err(AppError::bad_request),
    }
}

pub fn analysis_type(raw: &str) -> Result<AnalysisType, AppError> {
    AnalysisType::ALL
        .into_iter()
        .find(|t| t.as_str() == raw.trim())
        .ok_or_else(|| AppError::bad_request(format!("Invalid analysis type: {}", raw)))
}

fn length(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(AppError::bad_request(format!(
            "{} must be {}-{} characters",
            field, min, max
        )));
    }
    Ok(())
}

pub fn company_name(name: &str) -> Result<String, AppError> {
    length("Company name", name, 1, 200)?;
    Ok(name.trim().to_string())
}

pub fn backtest(mut scenario: BacktestScenario) -> Result<BacktestScenario, AppError> {
    length("Scenario ID", &scenario.id, 1, 50)?;
    scenario.ticker = ticker(&scenario.ticker)?;
    length("Company name", &scenario.company_name, 1, 200)?;
    length("Event description", &scenario.event_description, 10, 500)?;
    length("Event date", &scenario.event_date, 1, 50)?;
    length(
        "Pre-event data summary",
        &scenario.pre_event_data_summary,
        50,
        2000,
    )?;
    Ok(scenario)
}

pub fn retirement(inputs: &RetirementInputs) -> Result<(), AppError> {
    if !(18..=80).contains(&inputs.current_age) {
        return Err(AppError::bad_request("Current age must be between 18 and 80"));
    }
    if !(50..=100).contains(&inputs.retirement_age) {
        return Err(AppError::bad_request("Retirement age must be between 50 and 100"));
    }
    if !(0.0..=50_000.0).contains(&inputs.monthly_contribution) {
        return Err(AppError::bad_request(
            "Monthly contribution must be between 0 and 50000",
        ));
    }
    if !inputs.final_amount.is_finite() || inputs.final_amount < 0.0 {
        return Err(AppError::bad_request("Final amount must be a positive number"));
    }
    Ok(())
}
