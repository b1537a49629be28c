//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method and status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_rate_limited_total` (counter): requests rejected by the limiter
//! - `proxy_cache_events_total` (counter): hit, miss, store and error events
//! - `proxy_cache_entries` (gauge): entries held by the in-process store
//! - `proxy_upstream_errors_total` (counter): fetch, timeout and body failures
//! - `proxy_rewrites_total` (counter): rewritten bodies by content kind
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - The Prometheus exporter is optional and serves its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    describe_metrics();
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("proxy_requests_total", "Total number of proxy requests");
    describe_histogram!(
        "proxy_request_duration_seconds",
        "Duration of proxy requests in seconds"
    );
    describe_counter!(
        "proxy_rate_limited_total",
        "Requests rejected by the per-client rate limiter"
    );
    describe_counter!("proxy_cache_events_total", "Response cache events");
    describe_gauge!("proxy_cache_entries", "Entries in the in-process response cache");
    describe_counter!("proxy_upstream_errors_total", "Failed upstream fetches");
    describe_counter!("proxy_rewrites_total", "Response bodies rewritten");
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("proxy_rate_limited_total").increment(1);
}

pub fn record_cache_event(event: &'static str) {
    counter!("proxy_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("proxy_cache_entries").set(entries as f64);
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_rewrite(kind: &'static str) {
    counter!("proxy_rewrites_total", "kind" => kind).increment(1);
}
