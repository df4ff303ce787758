//! Prometheus metrics for the social feed service.
//!
//! Exposes atomic-unit outcome counters, side-effect failure counters and an
//! HTTP handler for the `/metrics` endpoint.

use actix_web::HttpResponse;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static::lazy_static! {
    /// Atomic units by operation and outcome (committed/aborted/retried)
    static ref ATOMIC_UNITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "social_feed_atomic_units_total",
        "Atomic units by operation and outcome",
        &["operation", "outcome"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref ATOMIC_UNIT_DURATION: HistogramVec = register_histogram_vec!(
        "social_feed_atomic_unit_duration_seconds",
        "Wall time of atomic units including retries",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Non-transactional side effects that failed after or around a commit
    static ref SIDE_EFFECT_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "social_feed_side_effect_failures_total",
        "Failed non-transactional side effects by kind",
        &["kind"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

pub fn record_unit_committed(operation: &str, elapsed_secs: f64) {
    ATOMIC_UNITS_TOTAL
        .with_label_values(&[operation, "committed"])
        .inc();
    ATOMIC_UNIT_DURATION
        .with_label_values(&[operation])
        .observe(elapsed_secs);
}

pub fn record_unit_aborted(operation: &str, elapsed_secs: f64) {
    ATOMIC_UNITS_TOTAL
        .with_label_values(&[operation, "aborted"])
        .inc();
    ATOMIC_UNIT_DURATION
        .with_label_values(&[operation])
        .observe(elapsed_secs);
}

pub fn record_unit_retried(operation: &str) {
    ATOMIC_UNITS_TOTAL
        .with_label_values(&[operation, "retried"])
        .inc();
}

/// `kind` is one of `orphaned_media`, `staged_file`, `welcome_mail`.
pub fn record_side_effect_failure(kind: &str) {
    SIDE_EFFECT_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
