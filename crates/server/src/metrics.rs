// crates/server/src/metrics.rs
//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Descriptions for the counters recorded by the hub and the stream routes
//! - Rendering for the `/metrics` endpoint

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    // Install the recorder globally
    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    // Store the handle for later rendering
    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

/// Describe all application metrics for Prometheus.
fn describe_metrics() {
    describe_counter!(
        "status_updates_appended_total",
        "Status updates stored and published"
    );
    describe_counter!(
        "status_subscriber_dropped_total",
        "Updates dropped because a subscriber channel was full"
    );
    describe_counter!(
        "status_stream_sessions_opened_total",
        "Stream sessions opened"
    );
    describe_counter!(
        "status_jobs_created_total",
        "Jobs created (repeat creates of an existing id are not counted)"
    );
    describe_gauge!(
        "status_stream_sessions_active",
        "Event streams currently connected"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Record a newly created job.
pub fn record_job_created() {
    counter!("status_jobs_created_total").increment(1);
}

/// Track connected event streams. Call with `1.0` on open and `-1.0` on close.
pub fn record_stream_active(delta: f64) {
    gauge!("status_stream_sessions_active").increment(delta);
}
