//! Metrics and observability utilities
//!
//! Prometheus metrics for the HTTP layer and every stage of the chat pipeline,
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all MenuChat metrics
pub const METRICS_PREFIX: &str = "menuchat";

/// Histogram buckets for LLM-bound latency (in seconds)
pub const LLM_LATENCY_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
    30.00,  // 30s
];

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

    // Pipeline metrics
    describe_counter!(
        format!("{}_pipeline_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Chat pipeline invocations by outcome"
    );

    describe_histogram!(
        format!("{}_pipeline_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Latency of each chat pipeline stage in seconds"
    );

    describe_counter!(
        format!("{}_query_rewrites_total", METRICS_PREFIX),
        Unit::Count,
        "Query rewrite attempts by outcome"
    );

    describe_counter!(
        format!("{}_answer_parses_total", METRICS_PREFIX),
        Unit::Count,
        "Model answers by the parse strategy that accepted them"
    );

    describe_counter!(
        format!("{}_suggestions_enriched_total", METRICS_PREFIX),
        Unit::Count,
        "Suggestions that received an image URL from retrieved documents"
    );

    // LLM metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM API requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM generation latency in seconds"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
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

/// Record the end state of one pipeline invocation
pub fn record_pipeline_run(outcome: &str) {
    counter!(
        format!("{}_pipeline_runs_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record how long a pipeline stage took
pub fn record_stage(stage: &str, duration_secs: f64) {
    histogram!(
        format!("{}_pipeline_stage_duration_seconds", METRICS_PREFIX),
        "stage" => stage.to_string()
    )
    .record(duration_secs);
}

/// Record a query rewrite outcome: rewritten, skipped or fallback
pub fn record_rewrite(outcome: &str) {
    counter!(
        format!("{}_query_rewrites_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record which parse strategy accepted a model answer
pub fn record_parse(strategy: &str) {
    counter!(
        format!("{}_answer_parses_total", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .increment(1);
}

/// Record suggestions enriched from document metadata
pub fn record_enrichment(enriched: usize) {
    counter!(format!("{}_suggestions_enriched_total", METRICS_PREFIX))
        .increment(enriched as u64);
}

/// Helper to record LLM metrics
pub fn record_llm(duration_secs: f64, provider: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "provider" => provider.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}
