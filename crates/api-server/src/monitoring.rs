//! Rolling request metrics and threshold-based anomaly detection.
//!
//! Anomalies are advisory: they are logged, never enforced. Blocking is the
//! rate limiter's job.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use pulse_core::MetricSample;
use serde::Serialize;
use tokio::time::Instant;

use crate::client_identity;

const TOP_CLIENTS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Counters roll over after this long.
    pub epoch: Duration,
    /// Requests per epoch above which a client is flagged.
    pub identity_ceiling: u64,
    /// Error fraction above which an endpoint is flagged.
    pub error_ratio: f64,
    /// Requests an endpoint must exceed before its error ratio counts.
    pub min_samples: u64,
    pub slow_request: Duration,
    /// Samples kept for the rolling average.
    pub capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            epoch: Duration::from_secs(3600),
            identity_ceiling: 100,
            error_ratio: 0.5,
            min_samples: 10,
            slow_request: Duration::from_secs(5),
            capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct EndpointCounters {
    requests: u64,
    errors: u64,
    total_ms: u64,
}

struct MonitorState {
    samples: VecDeque<MetricSample>,
    sample_ms_sum: u64,
    total_requests: u64,
    total_errors: u64,
    endpoints: HashMap<String, EndpointCounters>,
    identities: HashMap<String, u64>,
    epoch_start: Instant,
    last_reset: DateTime<Utc>,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            sample_ms_sum: 0,
            total_requests: 0,
            total_errors: 0,
            endpoints: HashMap::new(),
            identities: HashMap::new(),
            epoch_start: Instant::now(),
            last_reset: Utc::now(),
        }
    }

    fn roll_epoch(&mut self, now: Instant, epoch: Duration) {
        if now.duration_since(self.epoch_start) < epoch {
            return;
        }
        tracing::info!(
            "Monitoring epoch rolled over: {} requests, {} errors, {} clients",
            self.total_requests,
            self.total_errors,
            self.identities.len()
        );
        self.total_requests = 0;
        self.total_errors = 0;
        self.endpoints.clear();
        self.identities.clear();
        self.epoch_start = now;
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointMetrics {
    pub requests: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub average_response_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCount {
    pub identity: String,
    pub requests: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    /// Mean over the rolling sample window.
    pub average_response_ms: f64,
    pub sample_count: usize,
    pub endpoints: BTreeMap<String, EndpointMetrics>,
    pub top_clients: Vec<ClientCount>,
    pub last_reset: DateTime<Utc>,
}

pub struct RequestMonitor {
    state: Mutex<MonitorState>,
    config: MonitorConfig,
    started: Instant,
}

impl RequestMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            state: Mutex::new(MonitorState::new()),
            config,
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, sample: MetricSample) {
        let mut state = self.lock();
        state.roll_epoch(Instant::now(), self.config.epoch);

        let is_error = sample.is_error();
        state.total_requests += 1;
        if is_error {
            state.total_errors += 1;
        }

        let endpoint = state.endpoints.entry(sample.endpoint.clone()).or_default();
        endpoint.requests += 1;
        endpoint.total_ms += sample.duration_ms;
        if is_error {
            endpoint.errors += 1;
        }
        *state
            .identities
            .entry(sample.client_identity.clone())
            .or_insert(0) += 1;

        state.sample_ms_sum += sample.duration_ms;
        state.samples.push_back(sample);
        while state.samples.len() > self.config.capacity.max(1) {
            if let Some(dropped) = state.samples.pop_front() {
                state.sample_ms_sum -= dropped.duration_ms;
            }
        }
    }

    /// Threshold findings for one client and one endpoint, as log-ready text.
    pub fn detect_anomalies(&self, identity: &str, endpoint: &str) -> Vec<String> {
        let state = self.lock();
        let mut anomalies = Vec::new();

        if let Some(&count) = state.identities.get(identity) {
            if count > self.config.identity_ceiling {
                anomalies.push(format!(
                    "High request volume from {}: {} requests this epoch",
                    identity, count
                ));
            }
        }

        if let Some(counters) = state.endpoints.get(endpoint) {
            if counters.requests > self.config.min_samples {
                let ratio = counters.errors as f64 / counters.requests as f64;
                if ratio > self.config.error_ratio {
                    anomalies.push(format!(
                        "High error rate on {}: {:.1}% of {} requests",
                        endpoint,
                        ratio * 100.0,
                        counters.requests
                    ));
                }
            }
        }

        anomalies
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let state = self.lock();

        let endpoints = state
            .endpoints
            .iter()
            .map(|(name, c)| {
                (
                    name.clone(),
                    EndpointMetrics {
                        requests: c.requests,
                        errors: c.errors,
                        error_rate: ratio(c.errors, c.requests),
                        average_response_ms: ratio(c.total_ms, c.requests),
                    },
                )
            })
            .collect();

        let mut top_clients: Vec<ClientCount> = state
            .identities
            .iter()
            .map(|(identity, &requests)| ClientCount {
                identity: identity.clone(),
                requests,
            })
            .collect();
        top_clients.sort_by(|a, b| {
            b.requests
                .cmp(&a.requests)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        top_clients.truncate(TOP_CLIENTS);

        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            total_requests: state.total_requests,
            total_errors: state.total_errors,
            error_rate: ratio(state.total_errors, state.total_requests),
            average_response_ms: ratio(state.sample_ms_sum, state.samples.len() as u64),
            sample_count: state.samples.len(),
            endpoints,
            top_clients,
            last_reset: state.last_reset,
        }
    }

    /// Operator reset: clears counters and samples.
    pub fn reset(&self) {
        *self.lock() = MonitorState::new();
        tracing::info!("Request metrics reset");
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Records every response and logs anomalies and slow requests.
pub async fn monitor_middleware(
    State(monitor): State<Arc<RequestMonitor>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let endpoint = format!("{} {}", request.method(), path);
    let identity = client_identity(&request);

    let mut response = next.run(request).await;

    let elapsed = started.elapsed();
    let duration_ms = elapsed.as_millis() as u64;
    let status = response.status().as_u16();
    if let Ok(value) = HeaderValue::from_str(&format!("{}ms", duration_ms)) {
        response.headers_mut().insert("x-response-time", value);
    }

    monitor.record(MetricSample::new(endpoint.as_str(), status, duration_ms, identity.as_str()));
    for anomaly in monitor.detect_anomalies(&identity, &endpoint) {
        tracing::warn!(client = %identity, "Anomaly detected: {}", anomaly);
    }
    if elapsed > monitor.config().slow_request {
        tracing::warn!("Slow request: {} took {}ms (status {})", endpoint, duration_ms, status);
    }

    response
}
