//! HTTP boundary for the market pulse service.
//!
//! Wires the retrieval layer behind axum: request ids, security headers,
//! tiered rate limits, a progressive speed limiter and request monitoring.

pub mod config;
pub mod monitoring;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod speed_limit;
pub mod validation;

mod analysis_routes;
mod content_routes;
mod health_routes;
mod metrics_routes;
mod news_routes;
mod stock_routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use chrono::Utc;
use gemini_client::GeminiClient;
use pulse_core::{GenerativeProvider, RateTier};
use response_cache::CacheStore;
use retrieval_orchestrator::{MarketInsights, RetrievalOrchestrator};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::monitoring::{monitor_middleware, RequestMonitor};
use crate::rate_limit::{rate_limit_middleware, RateLimiter, TierGuard};
use crate::request_id::{current_request_id, request_id_middleware};
use crate::security_headers::{security_headers_middleware, SecurityHeaders};
use crate::speed_limit::{speed_limit_middleware, SpeedLimiter};

use analysis_routes::analysis_routes;
use content_routes::content_routes;
use health_routes::health_routes;
use metrics_routes::metrics_routes;
use news_routes::news_routes;
use stock_routes::stock_routes;

const LIMITER_CLEANUP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub insights: MarketInsights,
    pub limiter: Arc<RateLimiter>,
    pub speed: Arc<SpeedLimiter>,
    pub monitor: Arc<RequestMonitor>,
    pub config: Arc<ServerConfig>,
    pub started: Instant,
}

impl AppState {
    pub fn new(insights: MarketInsights, config: ServerConfig) -> Self {
        Self {
            insights,
            limiter: Arc::new(RateLimiter::new(config.rate_limits)),
            speed: Arc::new(SpeedLimiter::new(config.slow_down)),
            monitor: Arc::new(RequestMonitor::new(config.monitor)),
            config: Arc::new(config),
            started: Instant::now(),
        }
    }
}

/// Envelope for every JSON success body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            timestamp: Utc::now().to_rfc3339(),
            request_id: current_request_id(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Handler error carrying the status it should be reported with.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(message: impl std::fmt::Display) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!("{}", message))
    }

    pub fn not_found(message: impl std::fmt::Display) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, anyhow::anyhow!("{}", message))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed ({}): {:#}", self.status, self.error);
        } else {
            tracing::warn!("Request rejected ({}): {}", self.status, self.error);
        }

        let body = serde_json::json!({
            "success": false,
            "error": self.error.to_string(),
            "timestamp": Utc::now().to_rfc3339(),
            "requestId": current_request_id(),
        });
        (self.status, Json(body)).into_response()
    }
}

/// Identity a request is counted against, resolved once per request.
#[derive(Debug, Clone)]
pub struct ClientIdentity(pub String);

/// Who a request is counted against.
///
/// Without trusted proxies this is the peer address; `X-Forwarded-For` is
/// client-controlled and ignored. With `trusted_hops` proxies in front, the
/// entry that many hops from the right is used.
pub fn resolve_identity<B>(request: &axum::http::Request<B>, trusted_hops: usize) -> String {
    if trusted_hops > 0 {
        let hops: Vec<&str> = request
            .headers()
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if !hops.is_empty() {
            return hops[hops.len().saturating_sub(trusted_hops)].to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The identity attached by [`client_identity_middleware`], else the peer
/// address.
pub fn client_identity<B>(request: &axum::http::Request<B>) -> String {
    match request.extensions().get::<ClientIdentity>() {
        Some(ClientIdentity(identity)) => identity.clone(),
        None => resolve_identity(request, 0),
    }
}

async fn client_identity_middleware(
    State(trusted_hops): State<usize>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = resolve_identity(&request, trusted_hops);
    request.extensions_mut().insert(ClientIdentity(identity));
    next.run(request).await
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-response-time"),
            HeaderName::from_static("ratelimit-limit"),
            HeaderName::from_static("ratelimit-remaining"),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(600));

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    if allowed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(allowed))
    }
}

async fn route_not_found(uri: Uri) -> AppError {
    AppError::not_found(format!("Route {} not found", uri.path()))
}

/// Full application router. Layers run outermost first: request id,
/// security headers, CORS, tracing, client identity, monitoring,
/// default-tier rate limit, speed limiter.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(stock_routes())
        .merge(analysis_routes(state.limiter.clone()))
        .merge(news_routes(state.limiter.clone()))
        .merge(content_routes());

    let default_tier = TierGuard::new(state.limiter.clone(), RateTier::Default);
    let security = SecurityHeaders {
        hsts: state.config.is_production(),
    };
    let cors = build_cors_layer(&state.config.cors_origins);

    Router::new()
        .nest("/api/v1", api)
        .merge(health_routes())
        .merge(metrics_routes())
        .fallback(route_not_found)
        .layer(middleware::from_fn_with_state(
            state.speed.clone(),
            speed_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            default_tier,
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.monitor.clone(),
            monitor_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.config.trusted_proxy_hops,
            client_identity_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn_with_state(
            security,
            security_headers_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(json: bool) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    // An embedder or test harness may already have installed one.
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .try_init()
            .ok();
    }
}

fn spawn_limiter_cleanup(limiter: Arc<RateLimiter>, speed: Arc<SpeedLimiter>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIMITER_CLEANUP_PERIOD);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let windows = limiter.cleanup();
            let slow = speed.cleanup();
            if windows + slow > 0 {
                tracing::debug!(
                    "Limiter cleanup: {} rate windows, {} speed windows dropped",
                    windows,
                    slow
                );
            }
        }
    })
}

pub async fn run_server() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    init_tracing(config.json_logs());
    tracing::info!(
        "Starting market pulse API v{} ({})",
        env!("CARGO_PKG_VERSION"),
        config.environment
    );

    let gemini = GeminiClient::new(config.gemini.clone())
        .context("failed to build the Gemini HTTP client")?;
    tracing::info!("Generative provider: gemini ({})", gemini.model());
    let provider: Arc<dyn GenerativeProvider> = Arc::new(gemini);

    let cache = CacheStore::new(config.cache.clone());
    let sweeper = cache.spawn_sweeper();
    let insights = MarketInsights::new(RetrievalOrchestrator::new(provider, cache));

    let state = AppState::new(insights, config);
    let janitor = spawn_limiter_cleanup(state.limiter.clone(), state.speed.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!("Listening on {}", addr);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server failure");

    sweeper.abort();
    janitor.abort();
    tracing::info!("Server stopped");
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use pulse_core::{GroundedText, ProviderError, Schema};
    use response_cache::CacheConfig;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct ScriptedProvider {
        search_text: String,
        format_text: String,
        healthy: bool,
        search_calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(search_text: &str, format_text: &str) -> Arc<Self> {
            Arc::new(Self {
                search_text: search_text.to_string(),
                format_text: format_text.to_string(),
                healthy: true,
                search_calls: AtomicUsize::new(0),
            })
        }

        fn unhealthy() -> Arc<Self> {
            Arc::new(Self {
                search_text: String::new(),
                format_text: String::new(),
                healthy: false,
                search_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerativeProvider for ScriptedProvider {
        async fn search(&self, _prompt: &str) -> Result<GroundedText, ProviderError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(GroundedText {
                text: self.search_text.clone(),
                citations: Vec::new(),
            })
        }

        async fn format(&self, _prompt: &str, _schema: &Schema) -> Result<String, ProviderError> {
            Ok(self.format_text.clone())
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn app(provider: Arc<ScriptedProvider>) -> Router {
        let cache = CacheStore::new(CacheConfig::default());
        let insights = MarketInsights::new(RetrievalOrchestrator::new(provider, cache));
        build_router(AppState::new(insights, ServerConfig::default()))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn analysis_json() -> String {
        json!({
            "patternDetected": "Cluster of director purchases",
            "historicalContext": "Similar clusters preceded positive returns",
            "recommendation": "Monitor for follow-through",
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_invalid_ticker_is_bad_request() {
        let app = app(ScriptedProvider::new("", ""));
        let response = app.oneshot(get("/api/v1/stocks/AAPL123")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("Invalid ticker"));
        assert!(body["requestId"].is_string());
    }

    #[tokio::test]
    async fn test_absent_stock_data_is_not_found() {
        let provider = ScriptedProvider::new("", "");
        let app = app(provider.clone());
        let response = app.oneshot(get("/api/v1/stocks/aapl")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(provider.search_calls.load(Ordering::SeqCst), 1);

        let body = json_body(response).await;
        assert_eq!(body["error"], "Stock data not found for ticker AAPL");
    }

    #[tokio::test]
    async fn test_analysis_falls_back_when_provider_has_nothing() {
        let app = app(ScriptedProvider::new("", ""));
        let response = app
            .oneshot(post(
                "/api/v1/analysis/ai",
                json!({"ticker": "NVDA", "name": "NVIDIA", "analysisType": "Patent Analysis"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert!(body["data"]["patternDetected"]
            .as_str()
            .unwrap()
            .contains("could not be completed"));
    }

    #[tokio::test]
    async fn test_unknown_analysis_type_is_bad_request() {
        let app = app(ScriptedProvider::new("", ""));
        let response = app
            .oneshot(post(
                "/api/v1/analysis/ai",
                json!({"ticker": "NVDA", "name": "NVIDIA", "analysisType": "Astrology"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ai_tier_rejects_after_ten_calls_with_one_upstream_fetch() {
        let provider = ScriptedProvider::new("Directors bought shares last week.", &analysis_json());
        let app = app(provider.clone());
        let body = json!({"ticker": "AAPL", "name": "Apple", "analysisType": "Insider Trading"});

        let mut statuses = Vec::new();
        let mut last = None;
        for _ in 0..15 {
            let response = app
                .clone()
                .oneshot(post("/api/v1/analysis/ai", body.clone()))
                .await
                .unwrap();
            statuses.push(response.status());
            last = Some(response);
        }

        assert!(statuses[..10].iter().all(|s| *s == StatusCode::OK));
        assert!(statuses[10..]
            .iter()
            .all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(provider.search_calls.load(Ordering::SeqCst), 1);

        let response = last.unwrap();
        assert!(response.headers().contains_key("retry-after"));
        let body = json_body(response).await;
        assert_eq!(body["reason"], "rate_limit_ai");
        assert!(body["retryAfter"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_common_headers_and_request_id_propagation() {
        let app = app(ScriptedProvider::new("", ""));
        let request = Request::builder()
            .uri("/health/live")
            .header("x-request-id", "trace-123")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["x-request-id"], "trace-123");
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["cache-control"], "no-store");
        assert!(headers.contains_key("x-response-time"));
        assert!(headers.contains_key("ratelimit-remaining"));
    }

    #[tokio::test]
    async fn test_detailed_health_reports_degraded_provider() {
        let app = app(ScriptedProvider::unhealthy());
        let response = app.oneshot(get("/health/detailed")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = json_body(response).await;
        assert_eq!(body["data"]["status"], "degraded");
        assert_eq!(body["data"]["services"]["provider"]["stats"]["provider"], "scripted");
        assert!(body["data"]["services"]["cache"]["stats"]["hits"].is_number());
    }

    #[tokio::test]
    async fn test_metrics_count_requests_and_reset() {
        let app = app(ScriptedProvider::new("", ""));
        app.clone().oneshot(get("/health/live")).await.unwrap();
        app.clone().oneshot(get("/no/such/route")).await.unwrap();

        let response = app.clone().oneshot(get("/metrics/json")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["data"]["totalRequests"], 2);
        assert_eq!(body["data"]["totalErrors"], 1);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/metrics/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(app.oneshot(get("/metrics/json")).await.unwrap()).await;
        // Only the reset call itself has been recorded since
        assert_eq!(body["data"]["totalRequests"], 1);
    }

    #[test]
    fn test_init_tracing_tolerates_existing_subscriber() {
        init_tracing(false);
        init_tracing(true);
        tracing::info!("still logging after a second install");
    }

    #[test]
    fn test_identity_ignores_forwarded_for_without_trusted_proxies() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "198.51.100.2, 10.0.0.1")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(resolve_identity(&request, 0), "192.0.2.1");
        assert_eq!(client_identity(&request), "192.0.2.1");

        let bare = Request::builder().body(()).unwrap();
        assert_eq!(client_identity(&bare), "unknown");
    }

    #[test]
    fn test_identity_counts_trusted_hops_from_the_right() {
        let request = Request::builder()
            .header("x-forwarded-for", "6.6.6.6, 198.51.100.2, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(resolve_identity(&request, 1), "10.0.0.1");
        assert_eq!(resolve_identity(&request, 2), "198.51.100.2");
        assert_eq!(resolve_identity(&request, 5), "6.6.6.6");
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_does_not_escape_ai_limit() {
        let app = app(ScriptedProvider::new("", ""));
        let peer = SocketAddr::from(([198, 51, 100, 9], 40000));
        let body = json!({"ticker": "AAPL", "name": "Apple", "analysisType": "Insider Trading"});

        let mut admitted = 0;
        for i in 0..30 {
            let mut request = Request::builder()
                .method("POST")
                .uri("/api/v1/analysis/ai")
                .header("content-type", "application/json")
                .header("x-forwarded-for", format!("10.0.0.{}", i))
                .body(Body::from(body.to_string()))
                .unwrap();
            request.extensions_mut().insert(ConnectInfo(peer));

            let response = app.clone().oneshot(request).await.unwrap();
            if response.status() == StatusCode::OK {
                admitted += 1;
            } else {
                assert!(i >= 10, "call {} rejected early", i + 1);
                assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            }
        }
        assert_eq!(admitted, 10);
    }
}
