//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DealDesk metrics
pub const METRICS_PREFIX: &str = "dealdesk";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s - default question budget
    10.00,  // 10s
];

/// Buckets for the number of retrieval candidates per question
pub const CANDIDATE_BUCKETS: &[f64] = &[0.0, 1.0, 2.0, 3.0, 5.0, 10.0, 20.0];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Grounding metrics
    describe_counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Questions processed, by terminal outcome"
    );

    describe_histogram!(
        format!("{}_decision_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Fetch-to-render latency per question in seconds"
    );

    describe_histogram!(
        format!("{}_retrieval_candidates", METRICS_PREFIX),
        Unit::Count,
        "Candidates returned by retrieval per question"
    );

    describe_counter!(
        format!("{}_tone_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Drafts replaced by the internal fallback notice"
    );

    // Audit metrics
    describe_counter!(
        format!("{}_audit_write_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Audit appends rejected by the audit sink"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record one processed question
pub fn record_decision(outcome: &str, duration_secs: f64, candidate_count: usize) {
    counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_decision_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);

    histogram!(format!("{}_retrieval_candidates", METRICS_PREFIX)).record(candidate_count as f64);
}

/// Helper to record a degraded render
pub fn record_tone_fallback(reason: &str) {
    counter!(
        format!("{}_tone_fallbacks_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn record_audit_failure() {
    counter!(format!("{}_audit_write_failures_total", METRICS_PREFIX)).increment(1);
}
