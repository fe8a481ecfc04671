use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::client_identity;

#[derive(Debug, Clone, Copy)]
pub struct SlowDownConfig {
    pub window: Duration,
    /// Requests per window served without delay.
    pub delay_after: u32,
    /// Added delay for each request past `delay_after`.
    pub delay_step: Duration,
    pub max_delay: Duration,
}

impl Default for SlowDownConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            delay_after: 50,
            delay_step: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
        }
    }
}

struct HitWindow {
    window_start: Instant,
    hits: u32,
}

/// Delays heavy clients before the hard limit rejects them. The delay grows
/// by one step per request past the threshold, up to the cap.
pub struct SpeedLimiter {
    hits: DashMap<String, HitWindow>,
    config: SlowDownConfig,
}

impl SpeedLimiter {
    pub fn new(config: SlowDownConfig) -> Self {
        tracing::info!(
            "Speed limiter: delay after {} requests per {}s, +{}ms each, max {}ms",
            config.delay_after,
            config.window.as_secs(),
            config.delay_step.as_millis(),
            config.max_delay.as_millis()
        );
        Self {
            hits: DashMap::new(),
            config,
        }
    }

    /// Count a request and return how long to hold it.
    pub fn delay_for(&self, identity: &str) -> Duration {
        let now = Instant::now();
        let mut entry = self
            .hits
            .entry(identity.to_string())
            .or_insert(HitWindow {
                window_start: now,
                hits: 0,
            });
        let window = entry.value_mut();

        if now.duration_since(window.window_start) >= self.config.window {
            window.window_start = now;
            window.hits = 0;
        }
        window.hits = window.hits.saturating_add(1);

        let excess = window.hits.saturating_sub(self.config.delay_after);
        if excess == 0 {
            return Duration::ZERO;
        }
        self.config
            .delay_step
            .saturating_mul(excess)
            .min(self.config.max_delay)
    }

    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.hits.len();
        self.hits
            .retain(|_, window| now.duration_since(window.window_start) < self.config.window);
        before - self.hits.len()
    }

    pub fn reset(&self) {
        self.hits.clear();
    }
}

pub async fn speed_limit_middleware(
    State(limiter): State<Arc<SpeedLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(&request);
    let delay = limiter.delay_for(&identity);
    if !delay.is_zero() {
        tracing::debug!("Slowing {} by {}ms", identity, delay.as_millis());
        tokio::time::sleep(delay).await;
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> SpeedLimiter {
        SpeedLimiter::new(SlowDownConfig {
            window: Duration::from_secs(60),
            delay_after: 3,
            delay_step: Duration::from_millis(500),
            max_delay: Duration::from_millis(1200),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_grows_then_caps() {
        let limiter = limiter();
        let delays: Vec<u128> = (0..6)
            .map(|_| limiter.delay_for("a").as_millis())
            .collect();
        assert_eq!(delays, vec![0, 0, 0, 500, 1000, 1200]);
        assert_eq!(limiter.delay_for("b"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reset_clears_delay() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.delay_for("a");
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.delay_for("a"), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.cleanup(), 1);
    }
}
