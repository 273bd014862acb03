use anyhow::Result;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::future::ready;

// Creates a new Axum Router for the /metrics endpoint.
// This endpoint will expose metrics in the Prometheus format.
pub fn metrics_router() -> Result<Router> {
    let recorder_handle = setup_metrics_recorder()?;
    Ok(Router::new().route("/metrics", get(move || ready(recorder_handle.render()))))
}

// Sets up the Prometheus recorder with buckets for HTTP request durations.
// Installs the recorder globally, so it must run before any session starts.
fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .install_recorder()?;
    Ok(handle)
}
