//! Prometheus Metrics Module
//!
//! Exposes gateway metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Upstream**: subscribe/cancel calls issued to the Broker Session
//! - **Registry**: active stream keys and registered sinks
//! - **Delivery**: messages dispatched and sinks dropped
//! - **Broker**: session events and failed broker calls
//!
//! # Integration
//!
//! Metrics are rendered at `/metrics` on the HTTP port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::subscription::StreamChannel;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed (another global recorder is
/// already set).
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "broker_gateway_upstream_subscribes_total",
        "Upstream streaming subscriptions opened"
    );
    describe_counter!(
        "broker_gateway_upstream_cancels_total",
        "Upstream streaming subscriptions cancelled"
    );
    describe_counter!(
        "broker_gateway_upstream_subscribe_failures_total",
        "Upstream streaming subscriptions rejected by the broker"
    );

    describe_gauge!(
        "broker_gateway_stream_keys",
        "Resource keys holding an upstream subscription"
    );
    describe_gauge!(
        "broker_gateway_stream_sinks",
        "Sinks registered across all resource keys"
    );

    describe_counter!(
        "broker_gateway_messages_dispatched_total",
        "Stream messages delivered to sinks"
    );
    describe_counter!(
        "broker_gateway_sinks_dropped_total",
        "Sinks removed after a failed delivery"
    );
    describe_counter!(
        "broker_gateway_lane_overflows_total",
        "Stream updates discarded because a key's dispatch lane was full"
    );

    describe_counter!(
        "broker_gateway_broker_events_total",
        "Events received from the Broker Session"
    );
    describe_counter!(
        "broker_gateway_broker_call_errors_total",
        "Failed broker calls from HTTP handlers"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

#[allow(clippy::cast_precision_loss)]
const fn as_gauge(value: usize) -> f64 {
    value as f64
}

/// Record an upstream subscription being opened.
pub fn record_upstream_subscribe(channel: StreamChannel) {
    counter!(
        "broker_gateway_upstream_subscribes_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record an upstream subscription being cancelled.
pub fn record_upstream_cancel(channel: StreamChannel) {
    counter!(
        "broker_gateway_upstream_cancels_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a rejected upstream subscription.
pub fn record_upstream_subscribe_failure(channel: StreamChannel) {
    counter!(
        "broker_gateway_upstream_subscribe_failures_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Update the active key gauge.
pub fn set_active_stream_keys(count: usize) {
    gauge!("broker_gateway_stream_keys").set(as_gauge(count));
}

/// Update the registered sink gauge.
pub fn set_registered_sinks(count: usize) {
    gauge!("broker_gateway_stream_sinks").set(as_gauge(count));
}

/// Record messages delivered by one dispatch.
pub fn record_dispatched(channel: StreamChannel, delivered: usize) {
    counter!(
        "broker_gateway_messages_dispatched_total",
        "channel" => channel.as_str()
    )
    .increment(delivered as u64);
}

/// Record sinks dropped by one dispatch.
pub fn record_sinks_dropped(channel: StreamChannel, dropped: usize) {
    counter!(
        "broker_gateway_sinks_dropped_total",
        "channel" => channel.as_str()
    )
    .increment(dropped as u64);
}

/// Record an update discarded at a full dispatch lane.
pub fn record_lane_overflow(channel: StreamChannel) {
    counter!(
        "broker_gateway_lane_overflows_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a Broker Session event.
pub fn record_broker_event(kind: &'static str) {
    counter!("broker_gateway_broker_events_total", "kind" => kind).increment(1);
}

/// Record a failed broker call.
pub fn record_broker_call_error(operation: &'static str, status: u16) {
    counter!(
        "broker_gateway_broker_call_errors_total",
        "operation" => operation,
        "status" => status.to_string()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
