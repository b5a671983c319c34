//! Prometheus metrics for monitoring the inference relay.
//!
//! This module provides a centralized metrics registry for inbound requests,
//! per-provider attempts and saved artifacts.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, GaugeVec, HistogramVec,
    IntCounterVec,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of inbound requests by method, endpoint and status
    pub request_count: IntCounterVec,

    /// Inbound request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Provider attempts by provider, operation and outcome
    pub provider_attempts: IntCounterVec,

    /// Provider response latency histogram in seconds
    pub provider_latency: HistogramVec,

    /// Images written to the artifact directory
    pub artifacts_written: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// This should be called once at application startup. Subsequent calls
/// return the same instance.
///
/// ```no_run
/// use inference_relay::core::metrics::init_metrics;
///
/// let metrics = init_metrics();
/// metrics.request_count.with_label_values(&["GET", "/health", "200"]).inc();
/// ```
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "inference_relay_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "inference_relay_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "inference_relay_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let provider_attempts = register_int_counter_vec!(
            "inference_relay_provider_attempts_total",
            "Provider attempts by outcome",
            &["provider", "operation", "outcome"]
        )
        .expect("Failed to register provider_attempts metric");

        let provider_latency = register_histogram_vec!(
            "inference_relay_provider_latency_seconds",
            "Provider response latency in seconds",
            &["provider", "operation"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register provider_latency metric");

        let artifacts_written = register_int_counter_vec!(
            "inference_relay_artifacts_written_total",
            "Images persisted to the artifact directory",
            &["operation"]
        )
        .expect("Failed to register artifacts_written metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            provider_attempts,
            provider_latency,
            artifacts_written,
        }
    })
}

/// Get the global metrics instance, registering it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}
