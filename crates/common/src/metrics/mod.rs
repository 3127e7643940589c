//! Metrics and observability utilities
//!
//! Prometheus metrics for the invoice pipeline with standardized naming.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Metrics prefix for all InvoiceFlow metrics
pub const METRICS_PREFIX: &str = "invoiceflow";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Buckets for OCR and model calls (much slower)
pub const STAGE_BUCKETS: &[f64] = &[
    0.100, // 100ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 1min
];

/// Install the Prometheus exporter on `0.0.0.0:port`. Port 0 disables it.
pub fn install_exporter(port: u16) -> crate::Result<()> {
    if port == 0 {
        return Ok(());
    }

    let config_error = |e: metrics_exporter_prometheus::BuildError| crate::AppError::Configuration {
        message: format!("Failed to install metrics exporter: {}", e),
    };

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )
        .map_err(config_error)?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_message_duration_seconds", METRICS_PREFIX)),
            STAGE_BUCKETS,
        )
        .map_err(config_error)?
        .install()
        .map_err(config_error)?;

    tracing::info!(port, "Metrics exporter listening");
    Ok(())
}

/// Register all metric descriptions
pub fn register_metrics() {
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

    describe_counter!(
        format!("{}_invoices_uploaded_total", METRICS_PREFIX),
        Unit::Count,
        "Invoices accepted by the public API"
    );

    describe_counter!(
        format!("{}_status_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Invoice status transitions, by target status"
    );

    describe_counter!(
        format!("{}_messages_published_total", METRICS_PREFIX),
        Unit::Count,
        "Messages published, by topic"
    );

    describe_counter!(
        format!("{}_messages_handled_total", METRICS_PREFIX),
        Unit::Count,
        "Messages consumed, by topic and outcome"
    );

    describe_counter!(
        format!("{}_messages_dropped_total", METRICS_PREFIX),
        Unit::Count,
        "Messages dropped as undecodable"
    );

    describe_histogram!(
        format!("{}_message_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time spent handling one message"
    );

    describe_counter!(
        format!("{}_degraded_results_total", METRICS_PREFIX),
        Unit::Count,
        "Placeholder or fallback results produced instead of real ones"
    );
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

pub fn record_invoice_uploaded(mime_type: &str) {
    counter!(
        format!("{}_invoices_uploaded_total", METRICS_PREFIX),
        "mime_type" => mime_type.to_string()
    )
    .increment(1);
}

pub fn record_transition(to: &str) {
    counter!(
        format!("{}_status_transitions_total", METRICS_PREFIX),
        "to" => to.to_string()
    )
    .increment(1);
}

pub fn record_message_published(topic: &str) {
    counter!(
        format!("{}_messages_published_total", METRICS_PREFIX),
        "topic" => topic.to_string()
    )
    .increment(1);
}

pub fn record_message_handled(topic: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_messages_handled_total", METRICS_PREFIX),
        "topic" => topic.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_message_duration_seconds", METRICS_PREFIX),
        "topic" => topic.to_string()
    )
    .record(duration_secs);
}

pub fn record_message_dropped(consumer: &str) {
    counter!(
        format!("{}_messages_dropped_total", METRICS_PREFIX),
        "consumer" => consumer.to_string()
    )
    .increment(1);
}

/// A stage produced a placeholder (OCR) or fallback (analysis) result
pub fn record_degraded(stage: &str, reason: &str) {
    counter!(
        format!("{}_degraded_results_total", METRICS_PREFIX),
        "stage" => stage.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, STAGE_BUCKETS] {
            assert!(buckets.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every helper is a no-op
        let metrics = RequestMetrics::start("POST", "/v1/invoices");
        metrics.finish(201);
        record_transition("PROCESSING");
        record_message_handled("invoice_data", true, 0.01);
        record_degraded("ocr", "empty_text");
    }

    #[test]
    fn test_exporter_disabled_on_port_zero() {
        assert!(install_exporter(0).is_ok());
    }
}
