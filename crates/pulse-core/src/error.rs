use thiserror::Error;

use crate::RateTier;

/// Failures talking to the generative-AI provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider returned no text")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("External service error: {0}")]
    ExternalService(#[from] ProviderError),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Rate limit exceeded for {tier} tier (retry after {retry_after_ms}ms)")]
    RateLimitExceeded { tier: RateTier, retry_after_ms: u64 },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

pub type PulseResult<T> = Result<T, PulseError>;
