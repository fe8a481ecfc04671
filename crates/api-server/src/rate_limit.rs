use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use pulse_core::{PulseError, RateTier};
use serde_json::json;
use tokio::time::Instant;

use crate::{client_identity, AppError};

/// Request ceiling for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimit {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub default: TierLimit,
    pub ai: TierLimit,
    pub expensive: TierLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default: TierLimit {
                max_requests: 100,
                window: Duration::from_secs(15 * 60),
            },
            ai: TierLimit {
                max_requests: 10,
                window: Duration::from_secs(60),
            },
            expensive: TierLimit {
                max_requests: 5,
                window: Duration::from_secs(60 * 60),
            },
        }
    }
}

impl RateLimitConfig {
    pub fn for_tier(&self, tier: RateTier) -> TierLimit {
        match tier {
            RateTier::Default => self.default,
            RateTier::Ai => self.ai,
            RateTier::Expensive => self.expensive,
        }
    }
}

struct RateWindow {
    window_start: Instant,
    count: u32,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Time until the window resets. Zero when admitted.
    pub retry_after_ms: u64,
    pub limit: u32,
    pub remaining: u32,
}

/// Fixed-window request counter per (client, tier).
///
/// Each tier has its own window, so exhausting one never blocks another.
/// A window resets fully once its length has elapsed since it opened.
pub struct RateLimiter {
    windows: DashMap<(String, RateTier), RateWindow>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        for tier in RateTier::ALL {
            let limit = config.for_tier(tier);
            tracing::info!(
                "Rate limit [{}]: {} requests per {}s",
                tier,
                limit.max_requests,
                limit.window.as_secs()
            );
        }

        Self {
            windows: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request against `identity` in `tier`. A rejected request is
    /// not counted.
    pub fn admit(&self, identity: &str, tier: RateTier) -> Admission {
        let limit = self.config.for_tier(tier);
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry((identity.to_string(), tier))
            .or_insert(RateWindow {
                window_start: now,
                count: 0,
            });
        let window = entry.value_mut();

        let elapsed = now.duration_since(window.window_start);
        if elapsed >= limit.window {
            window.window_start = now;
            window.count = 0;
        }

        if window.count >= limit.max_requests {
            let retry_after = limit.window.saturating_sub(now.duration_since(window.window_start));
            return Admission {
                allowed: false,
                retry_after_ms: retry_after.as_millis() as u64,
                limit: limit.max_requests,
                remaining: 0,
            };
        }

        window.count += 1;
        Admission {
            allowed: true,
            retry_after_ms: 0,
            limit: limit.max_requests,
            remaining: limit.max_requests - window.count,
        }
    }

    /// [`admit`](Self::admit) as a `Result`, for callers that gate work on it.
    pub fn check(&self, identity: &str, tier: RateTier) -> Result<Admission, PulseError> {
        let admission = self.admit(identity, tier);
        if admission.allowed {
            Ok(admission)
        } else {
            Err(PulseError::RateLimitExceeded {
                tier,
                retry_after_ms: admission.retry_after_ms,
            })
        }
    }

    /// Drop windows that have fully elapsed. Called periodically.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|(_, tier), window| {
            now.duration_since(window.window_start) < self.config.for_tier(*tier).window
        });
        before - self.windows.len()
    }

    pub fn reset(&self) {
        self.windows.clear();
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

/// Middleware state: which tier a route group is charged against.
#[derive(Clone)]
pub struct TierGuard {
    pub limiter: Arc<RateLimiter>,
    pub tier: RateTier,
}

impl TierGuard {
    pub fn new(limiter: Arc<RateLimiter>, tier: RateTier) -> Self {
        Self { limiter, tier }
    }
}

pub async fn rate_limit_middleware(
    State(guard): State<TierGuard>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(&request);

    match guard.limiter.check(&identity, guard.tier) {
        Ok(admission) => {
            let mut response = next.run(request).await;
            // An inner, stricter tier has already reported its own budget.
            let headers = response.headers_mut();
            headers
                .entry("ratelimit-limit")
                .or_insert(HeaderValue::from(admission.limit));
            headers
                .entry("ratelimit-remaining")
                .or_insert(HeaderValue::from(admission.remaining));
            response
        }
        Err(PulseError::RateLimitExceeded {
            tier,
            retry_after_ms,
        }) => {
            tracing::warn!(
                "Rate limit [{}] exceeded for {} on {}",
                tier,
                identity,
                request.uri().path()
            );
            let limit = guard.limiter.config().for_tier(tier).max_requests;
            rejection(tier, retry_after_ms, limit)
        }
        Err(other) => AppError::from(other).into_response(),
    }
}

/// 429 body with a tier-specific reason code.
pub fn rejection(tier: RateTier, retry_after_ms: u64, limit: u32) -> Response {
    let retry_after_secs = retry_after_ms.div_ceil(1000).max(1);
    let body = json!({
        "success": false,
        "error": tier.rejection_message(),
        "reason": tier.rejection_reason(),
        "retryAfter": retry_after_secs,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert("retry-after", HeaderValue::from(retry_after_secs));
    headers.insert("ratelimit-limit", HeaderValue::from(limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(0u32));
    response
}
