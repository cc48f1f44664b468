//! Metrics collection and exposition.
//!
//! # Metrics
//! - `transform_requests_total` (counter): requests by outcome
//! - `transform_duration_seconds` (histogram): handler latency by outcome
//!
//! Outcomes: `ok`, `missing_src`, `too_large`, `syntax_error`, `unsupported`,
//! `internal_error`. Without an installed recorder these calls are no-ops.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one handled request.
pub fn record_transform(outcome: &'static str, start_time: Instant) {
    metrics::counter!("transform_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("transform_duration_seconds", "outcome" => outcome)
        .record(start_time.elapsed().as_secs_f64());
}
