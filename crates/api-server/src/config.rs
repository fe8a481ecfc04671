use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use gemini_client::GeminiConfig;
use response_cache::CacheConfig;

use crate::monitoring::MonitorConfig;
use crate::rate_limit::{RateLimitConfig, TierLimit};
use crate::speed_limit::SlowDownConfig;

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub environment: String,
    pub gemini: GeminiConfig,
    pub cache: CacheConfig,
    pub rate_limits: RateLimitConfig,
    pub slow_down: SlowDownConfig,
    pub monitor: MonitorConfig,
    pub cors_origins: Vec<String>,
    /// Reverse proxies in front of the server whose `X-Forwarded-For`
    /// entries are trusted. Zero keys clients on the peer address.
    pub trusted_proxy_hops: usize,
}

impl ServerConfig {
    /// Load `.env` (if present) and read the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY must be set")?;
        if api_key.trim().is_empty() {
            return Err(anyhow!("GEMINI_API_KEY must not be empty"));
        }

        let gemini_defaults = GeminiConfig::default();
        let gemini = GeminiConfig {
            api_key,
            model: env_string("GEMINI_MODEL", &gemini_defaults.model),
            base_url: env_string("GEMINI_BASE_URL", &gemini_defaults.base_url),
            timeout: Duration::from_secs(env_or("GEMINI_TIMEOUT_SECS", 60u64)?),
        };

        let cache = CacheConfig {
            default_ttl: Duration::from_secs(env_or("CACHE_DEFAULT_TTL", 300u64)?),
            max_entries: env_or("CACHE_MAX_KEYS", 1000usize)?,
            check_period: Duration::from_secs(env_or("CACHE_CHECK_PERIOD_SECS", 120u64)?),
        };

        let rate_limits = RateLimitConfig {
            default: tier_from_env("RATE_LIMIT", RateLimitConfig::default().default)?,
            ai: tier_from_env("AI_RATE_LIMIT", RateLimitConfig::default().ai)?,
            expensive: tier_from_env("EXPENSIVE_RATE_LIMIT", RateLimitConfig::default().expensive)?,
        };

        let slow_down = SlowDownConfig {
            window: Duration::from_millis(env_or("SLOWDOWN_WINDOW_MS", 900_000u64)?),
            delay_after: env_or("SLOWDOWN_DELAY_AFTER", 50u32)?,
            delay_step: Duration::from_millis(env_or("SLOWDOWN_DELAY_MS", 500u64)?),
            max_delay: Duration::from_millis(env_or("SLOWDOWN_MAX_DELAY_MS", 20_000u64)?),
        };

        let monitor_defaults = MonitorConfig::default();
        let monitor = MonitorConfig {
            epoch: Duration::from_secs(env_or("MONITOR_EPOCH_SECS", 3600u64)?),
            identity_ceiling: env_or("MONITOR_IP_CEILING", monitor_defaults.identity_ceiling)?,
            error_ratio: env_or("MONITOR_ERROR_RATIO", monitor_defaults.error_ratio)?,
            min_samples: env_or("MONITOR_MIN_SAMPLES", monitor_defaults.min_samples)?,
            slow_request: Duration::from_millis(env_or("MONITOR_SLOW_REQUEST_MS", 5000u64)?),
            capacity: monitor_defaults.capacity,
        };

        let cors_origins = env_string(
            "CORS_ORIGINS",
            "http://localhost:5173,http://localhost:3000",
        )
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

        Ok(Self {
            port: env_or("PORT", 3001u16)?,
            environment: env_string("APP_ENV", "development"),
            gemini,
            cache,
            rate_limits,
            slow_down,
            monitor,
            cors_origins,
            trusted_proxy_hops: env_or("TRUST_PROXY_HOPS", 0usize)?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// JSON logs in production or when `LOG_FORMAT=json`.
    pub fn json_logs(&self) -> bool {
        self.is_production() || env_string("LOG_FORMAT", "text").eq_ignore_ascii_case("json")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            environment: "development".to_string(),
            gemini: GeminiConfig::default(),
            cache: CacheConfig::default(),
            rate_limits: RateLimitConfig::default(),
            slow_down: SlowDownConfig::default(),
            monitor: MonitorConfig::default(),
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            trusted_proxy_hops: 0,
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parse an optional variable; a present but malformed value is an error.
fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid value for {}: {} ({})", name, raw, e)),
        _ => Ok(default),
    }
}

fn tier_from_env(prefix: &str, default: TierLimit) -> anyhow::Result<TierLimit> {
    let window_ms = env_or(
        &format!("{}_WINDOW_MS", prefix),
        default.window.as_millis() as u64,
    )?;
    Ok(TierLimit {
        max_requests: env_or(&format!("{}_MAX", prefix), default.max_requests)?,
        window: Duration::from_millis(window_ms),
    })
}
