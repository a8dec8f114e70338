//! Prometheus metrics: recorder setup, HTTP middleware and the scrape handler.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Error raised when the recorder cannot be installed.
#[derive(Debug, thiserror::Error)]
pub enum MetricsInitError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Prometheus recorder already initialized")]
    AlreadyInitialized,
}

/// Installs the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<(), MetricsInitError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 15.0])?
        .install_recorder()?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsInitError::AlreadyInitialized)?;

    describe_tracker_metrics();
    Ok(())
}

fn describe_tracker_metrics() {
    describe_counter!(
        "location_ingestions_total",
        "Device ingestion runs by outcome (stored, reported or an error kind)"
    );
    describe_counter!("provider_logins_total", "GPS portal logins by result");
    describe_counter!(
        "geofence_links_total",
        "Area/event association rows written, by trigger"
    );
    describe_counter!(
        "poll_cycle_devices_skipped_total",
        "Devices skipped by a poll cycle, by reason"
    );
    describe_gauge!("poll_cycle_devices", "Pollable devices listed by the last cycle");
    describe_histogram!(
        "database_query_duration_seconds",
        "Database query latency by query name"
    );
}

/// Records `http_requests_total` and `http_request_duration_seconds`.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = method_to_str(req.method());
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();

    counter!(
        "http_requests_total",
        "method" => method,
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

fn method_to_str(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::HEAD => "HEAD",
        _ => "OTHER",
    }
}

/// Handler for `/metrics` in Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}
