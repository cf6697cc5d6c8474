//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle used to render the /metrics endpoint.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "clipnote_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "clipnote_http_request_duration_seconds";

    // Queue metrics
    pub const JOBS_ENQUEUED_TOTAL: &str = "clipnote_jobs_enqueued_total";
    pub const DIRECT_FALLBACKS_TOTAL: &str = "clipnote_direct_fallbacks_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "clipnote_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a job accepted onto the queue.
pub fn record_job_enqueued(priority: &str) {
    counter!(names::JOBS_ENQUEUED_TOTAL, "priority" => priority.to_string()).increment(1);
}

/// Record a direct-processing fallback.
pub fn record_direct_fallback() {
    counter!(names::DIRECT_FALLBACKS_TOTAL).increment(1);
}

/// Record an IP rate-limit hit.
pub fn record_rate_limit_hit(path: &str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "path" => sanitize_path(path)).increment(1);
}

/// Collapse path parameters so metrics cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let looks_like_id = segment.len() >= 16
                || segment.chars().all(|c| c.is_ascii_digit()) && !segment.is_empty();
            if looks_like_id {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// HTTP metrics middleware.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_ids() {
        assert_eq!(
            sanitize_path("/api/clips/0b8af6d2-9cf8-4c1e-9d3a-9a1b2c3d4e5f/status"),
            "/api/clips/:id/status"
        );
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
