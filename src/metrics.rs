//! Prometheus metrics for the sync engine.
//!
//! Diagnostic surface only: cache effectiveness, provider fetch outcomes,
//! publish volume, consumer failures, processing latency. Correctness never
//! depends on these counters.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Beatsync metrics
const PREFIX: &str = "beatsync";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Cache Metrics
    pub static ref CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_cache_lookups_total"), "Cache lookups by data kind and outcome"),
        &["kind", "outcome"]
    ).expect("Failed to create cache_lookups_total metric");

    // Provider Metrics
    pub static ref PROVIDER_FETCHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_provider_fetches_total"), "Provider fetch attempts by data kind and outcome"),
        &["kind", "outcome"]
    ).expect("Failed to create provider_fetches_total metric");

    // Publish Metrics
    pub static ref STATES_PUBLISHED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_states_published_total"), "Music states published by data source"),
        &["source"]
    ).expect("Failed to create states_published_total metric");

    pub static ref BEATS_FIRED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_beats_fired_total"),
        "Beat events fired on time"
    ).expect("Failed to create beats_fired_total metric");

    pub static ref BEATS_SKIPPED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_beats_skipped_total"),
        "Beats skipped because their deadline had passed"
    ).expect("Failed to create beats_skipped_total metric");

    // Consumer Metrics
    pub static ref CONSUMER_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_consumer_errors_total"), "Failed consumer deliveries"),
        &["consumer"]
    ).expect("Failed to create consumer_errors_total metric");

    pub static ref ACTIVE_CONSUMERS: Gauge = Gauge::new(
        format!("{PREFIX}_active_consumers"),
        "Number of subscribed consumers"
    ).expect("Failed to create active_consumers metric");

    // Pipeline Metrics
    pub static ref PROCESSING_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_processing_duration_seconds"),
            "Time from track signal to published state"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0])
    ).expect("Failed to create processing_duration_seconds metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(CACHE_LOOKUPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROVIDER_FETCHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(STATES_PUBLISHED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BEATS_FIRED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BEATS_SKIPPED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CONSUMER_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ACTIVE_CONSUMERS.clone()));
    let _ = REGISTRY.register(Box::new(PROCESSING_DURATION_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record a cache lookup
pub fn record_cache_lookup(kind: &str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

/// Record a provider fetch attempt outcome
pub fn record_provider_fetch(kind: &str, outcome: &str) {
    PROVIDER_FETCHES_TOTAL
        .with_label_values(&[kind, outcome])
        .inc();
}

/// Record a published music state
pub fn record_state_published(source: &str) {
    STATES_PUBLISHED_TOTAL.with_label_values(&[source]).inc();
}

/// Record a beat fired on time
pub fn record_beat_fired() {
    BEATS_FIRED_TOTAL.inc();
}

/// Record a beat skipped for being late
pub fn record_beat_skipped() {
    BEATS_SKIPPED_TOTAL.inc();
}

/// Record a failed consumer delivery
pub fn record_consumer_error(consumer: &str) {
    CONSUMER_ERRORS_TOTAL.with_label_values(&[consumer]).inc();
}

/// Update subscribed consumers count
pub fn set_active_consumers(count: usize) {
    ACTIVE_CONSUMERS.set(count as f64);
}

/// Record end-to-end pipeline processing time
pub fn observe_processing_time(duration: Duration) {
    PROCESSING_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serve the /metrics endpoint on a dedicated port until shutdown.
pub async fn serve_metrics(port: u16) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Metrics available at port {}!", port);
    axum::serve(listener, app).await?;
    Ok(())
}
