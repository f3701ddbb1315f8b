use crate::error::{AuthFailure, Result, ServiceError};
use axum::{
    extract::{MatchedPath, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ServiceError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        describe_counter!(
            "expense_tracker_requests_total",
            "Total number of HTTP requests received"
        );
        describe_histogram!(
            "expense_tracker_request_duration_seconds",
            "HTTP request latencies in seconds"
        );
        describe_counter!(
            "expense_tracker_auth_attempts_total",
            "Total number of bearer token verifications"
        );
        describe_counter!(
            "expense_tracker_auth_failures_total",
            "Bearer token verifications that failed, by reason"
        );
        describe_counter!(
            "expense_tracker_rate_limit_decisions_total",
            "Rate limit decisions, by outcome"
        );
        describe_counter!(
            "expense_tracker_rate_limit_store_failures_total",
            "Rate limit checks that failed inside the window store"
        );
        describe_gauge!(
            "expense_tracker_rate_limit_tracked_identities",
            "Identities currently holding a rate limit window"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record one request's status and latency
pub async fn track_requests(request: Request, next: Next) -> Response {
    let path = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => sanitize_path(request.uri().path()),
    };
    let timer = Timer::new(request.method().to_string(), path);

    let response = next.run(request).await;
    timer.record(response.status().as_u16());
    response
}

/// Record a request metric
pub fn record_request(method: &str, path: &str, status: u16, duration: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!("expense_tracker_requests_total", &labels).increment(1);
    histogram!("expense_tracker_request_duration_seconds", &labels).record(duration);
}

/// Record a token verification
pub fn record_auth_attempt(failure: Option<AuthFailure>) {
    counter!("expense_tracker_auth_attempts_total").increment(1);

    if let Some(failure) = failure {
        let labels = [("reason", failure.kind().to_string())];
        counter!("expense_tracker_auth_failures_total", &labels).increment(1);
    }
}

/// Record a rate limit decision
pub fn record_rate_limit_decision(allowed: bool) {
    let outcome = if allowed { "allowed" } else { "rejected" };
    let labels = [("outcome", outcome.to_string())];
    counter!("expense_tracker_rate_limit_decisions_total", &labels).increment(1);
}

/// Record a window store failure
pub fn record_store_failure() {
    counter!("expense_tracker_rate_limit_store_failures_total").increment(1);
}

/// Record the number of tracked identities
pub fn record_window_store_size(tracked: usize) {
    gauge!("expense_tracker_rate_limit_tracked_identities").set(tracked as f64);
}

/// Sanitize an unmatched path to avoid cardinality explosion.
/// Replaces segments that look like identifiers with a placeholder.
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| if is_likely_id(seg) { ":id" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a path segment is likely an ID (numeric, UUID, etc.)
fn is_likely_id(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }

    if segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    // UUID-like: hex digits and hyphens
    if segment.len() >= 32 && segment.contains('-') {
        return segment.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    }

    // Long alphanumeric mixing letters and digits
    if segment.len() > 10 && segment.chars().all(|c| c.is_alphanumeric()) {
        let has_numbers = segment.chars().any(|c| c.is_numeric());
        let has_letters = segment.chars().any(|c| c.is_alphabetic());
        return has_numbers && has_letters;
    }

    false
}

/// Timer for measuring request duration
pub struct Timer {
    start: Instant,
    method: String,
    path: String,
}

impl Timer {
    /// Start a new timer for a request
    pub fn new(method: String, path: String) -> Self {
        Self {
            start: Instant::now(),
            method,
            path,
        }
    }

    /// Record the elapsed time with the given status code
    pub fn record(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();
        record_request(&self.method, &self.path, status, duration);
    }
}
