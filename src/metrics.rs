//! Prometheus metrics for extraction runs

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};

lazy_static! {
    /// Counter: pages fetched per entity
    pub static ref PAGES_FETCHED: CounterVec = register_counter_vec!(
        "cardsync_pages_fetched_total",
        "Pages fetched from the source API",
        &["phase"]
    )
    .expect("Failed to create pages_fetched metric");

    /// Counter: records delivered to the sink per phase
    pub static ref RECORDS_PUSHED: CounterVec = register_counter_vec!(
        "cardsync_records_pushed_total",
        "Records pushed to the sink",
        &["phase"]
    )
    .expect("Failed to create records_pushed metric");

    /// Counter: records dropped by the normalizer per phase
    pub static ref NORMALIZATION_ERRORS: CounterVec = register_counter_vec!(
        "cardsync_normalization_errors_total",
        "Records that failed normalization",
        &["phase"]
    )
    .expect("Failed to create normalization_errors metric");

    /// Counter: rate-limited responses per entity
    pub static ref RATE_LIMITED: CounterVec = register_counter_vec!(
        "cardsync_rate_limited_total",
        "Rate-limited responses from the source API",
        &["phase"]
    )
    .expect("Failed to create rate_limited metric");

    /// Counter: terminal outcomes (done/delay/error)
    pub static ref RUN_OUTCOMES: CounterVec = register_counter_vec!(
        "cardsync_run_outcomes_total",
        "Terminal outcomes by kind",
        &["outcome"]
    )
    .expect("Failed to create run_outcomes metric");
}

pub fn record_page_fetched(phase: &str) {
    PAGES_FETCHED.with_label_values(&[phase]).inc();
}

pub fn record_pushed(phase: &str, count: usize) {
    RECORDS_PUSHED
        .with_label_values(&[phase])
        .inc_by(count as f64);
}

pub fn record_normalization_error(phase: &str) {
    NORMALIZATION_ERRORS.with_label_values(&[phase]).inc();
}

pub fn record_rate_limited(phase: &str) {
    RATE_LIMITED.with_label_values(&[phase]).inc();
}

pub fn record_outcome(outcome: &str) {
    RUN_OUTCOMES.with_label_values(&[outcome]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
