//! Prometheus metrics for canvas-server.
//!
//! Provides metrics collection and a Prometheus-compatible `/metrics` endpoint.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// Metric names as constants for consistency
const WS_CONNECTIONS_ACTIVE: &str = "excalicode_ws_connections_active";
const WS_MESSAGES_TOTAL: &str = "excalicode_ws_messages_total";
const ROOMS_ACTIVE: &str = "excalicode_rooms_active";
const ROOM_MEMBERS: &str = "excalicode_room_members";
const STORE_WRITES_TOTAL: &str = "excalicode_store_writes_total";
const VALIDATION_FAILURES_TOTAL: &str = "excalicode_validation_failures_total";
const CODE_EXECUTIONS_TOTAL: &str = "excalicode_code_executions_total";
const CODE_EXECUTION_DURATION: &str = "excalicode_code_execution_duration_seconds";

/// Initialize metrics and return the Prometheus handle.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed
/// (e.g., if another recorder is already installed).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Increment active WebSocket connections.
pub fn inc_ws_connections() {
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement active WebSocket connections.
pub fn dec_ws_connections() {
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a relay message.
///
/// # Arguments
///
/// * `direction` - "inbound" or "outbound"
/// * `msg_type` - Message type tag (e.g., "join", "element_added")
pub fn record_ws_message(direction: &str, msg_type: &str) {
    counter!(
        WS_MESSAGES_TOTAL,
        "direction" => direction.to_string(),
        "type" => msg_type.to_string()
    )
    .increment(1);
}

/// Update room occupancy across the whole registry.
///
/// Both gauges are unlabelled: one series each, however many canvases exist.
#[allow(clippy::cast_precision_loss)]
pub fn set_room_occupancy(rooms: usize, members: usize) {
    gauge!(ROOMS_ACTIVE).set(rooms as f64);
    gauge!(ROOM_MEMBERS).set(members as f64);
}

/// Record an element store write.
///
/// # Arguments
///
/// * `operation` - "replace", "append", "patch" or "remove"
/// * `success` - Whether the write succeeded
pub fn record_store_write(operation: &'static str, success: bool) {
    counter!(
        STORE_WRITES_TOTAL,
        "operation" => operation,
        "success" => success.to_string()
    )
    .increment(1);
}

/// Record an input validation failure.
///
/// # Arguments
///
/// * `validation_type` - Type of validation that failed (file_id, element_id, message_size, etc.)
pub fn record_validation_failure(validation_type: &str) {
    counter!(
        VALIDATION_FAILURES_TOTAL,
        "type" => validation_type.to_string()
    )
    .increment(1);
}

/// Record a code execution request.
///
/// # Arguments
///
/// * `language` - Requested language identifier
/// * `outcome` - "success", "rejected" or "upstream_error"
/// * `duration_secs` - Time spent waiting on the gateway
pub fn record_code_execution(language: &str, outcome: &'static str, duration_secs: f64) {
    counter!(
        CODE_EXECUTIONS_TOTAL,
        "language" => language.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(CODE_EXECUTION_DURATION, "outcome" => outcome).record(duration_secs);
}
