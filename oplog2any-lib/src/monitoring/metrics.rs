//! Prometheus metrics for oplog tailing
//!
//! Counters and gauges covering event throughput, handler failures,
//! checkpoint progress, dispatcher occupancy and cursor health.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram_vec, Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, Registry,
};
use tracing::debug;

lazy_static! {
    /// Global metrics registry for all tailer metrics
    pub static ref REGISTRY: Registry = Registry::new();

    // =============================================================================
    // Event Metrics
    // =============================================================================

    /// Total number of oplog entries routed to the handler
    pub static ref EVENTS_PROCESSED_TOTAL: Counter = register_counter!(
        "oplog2any_events_processed_total",
        "Total number of oplog entries routed to the handler"
    ).expect("metric can be created");

    /// Routed entries by operation and namespace
    pub static ref EVENTS_BY_OPERATION: CounterVec = register_counter_vec!(
        "oplog2any_events_by_operation_total",
        "Number of routed oplog entries by operation and namespace",
        &["operation", "namespace"]
    ).expect("metric can be created");

    /// Handler invocations that returned an error
    pub static ref HANDLER_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "oplog2any_handler_errors_total",
        "Number of failed handler invocations",
        &["operation", "handler"]
    ).expect("metric can be created");

    /// Handler invocation duration
    pub static ref HANDLER_DURATION: HistogramVec = register_histogram_vec!(
        "oplog2any_handler_duration_seconds",
        "Time taken by the handler to process one event",
        &["operation", "handler"]
    ).expect("metric can be created");

    // =============================================================================
    // Checkpoint Metrics
    // =============================================================================

    /// Checkpoint writes by outcome
    pub static ref CHECKPOINT_WRITES_TOTAL: CounterVec = register_counter_vec!(
        "oplog2any_checkpoint_writes_total",
        "Number of checkpoint writes by result",
        &["result"]
    ).expect("metric can be created");

    /// Seconds component of the last checkpoint position handed to the store
    pub static ref CHECKPOINT_POSITION_SECONDS: Gauge = register_gauge!(
        "oplog2any_checkpoint_position_seconds",
        "Seconds component of the latest checkpoint position"
    ).expect("metric can be created");

    // =============================================================================
    // Dispatcher and Cursor Metrics
    // =============================================================================

    /// Currently admitted checkpoint and routing tasks
    pub static ref IN_FLIGHT_TASKS: Gauge = register_gauge!(
        "oplog2any_in_flight_tasks",
        "Number of admitted checkpoint and routing tasks"
    ).expect("metric can be created");

    /// Idle windows that elapsed without a new entry
    pub static ref CURSOR_TIMEOUTS_TOTAL: Counter = register_counter!(
        "oplog2any_cursor_timeouts_total",
        "Number of cursor idle timeouts"
    ).expect("metric can be created");

    /// Cursors rebuilt after the source closed them
    pub static ref CURSOR_REOPENS_TOTAL: Counter = register_counter!(
        "oplog2any_cursor_reopens_total",
        "Number of cursors rebuilt after being closed by the source"
    ).expect("metric can be created");

    // =============================================================================
    // Error and Application Metrics
    // =============================================================================

    /// Total number of errors encountered
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "oplog2any_errors_total",
        "Total number of errors by type",
        &["error_type", "component"]
    ).expect("metric can be created");

    /// Application uptime
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "oplog2any_uptime_seconds",
        "Application uptime in seconds"
    ).expect("metric can be created");

    /// Build information
    pub static ref BUILD_INFO: GaugeVec = register_gauge_vec!(
        "oplog2any_build_info",
        "Build information",
        &["version"]
    ).expect("metric can be created");
}

/// Initialize all metrics with the global registry
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    REGISTRY
        .register(Box::new(EVENTS_PROCESSED_TOTAL.clone()))
        .map_err(|e| format!("Failed to register EVENTS_PROCESSED_TOTAL: {}", e))?;

    REGISTRY
        .register(Box::new(EVENTS_BY_OPERATION.clone()))
        .map_err(|e| format!("Failed to register EVENTS_BY_OPERATION: {}", e))?;

    REGISTRY
        .register(Box::new(HANDLER_ERRORS_TOTAL.clone()))
        .map_err(|e| format!("Failed to register HANDLER_ERRORS_TOTAL: {}", e))?;

    REGISTRY
        .register(Box::new(HANDLER_DURATION.clone()))
        .map_err(|e| format!("Failed to register HANDLER_DURATION: {}", e))?;

    REGISTRY
        .register(Box::new(CHECKPOINT_WRITES_TOTAL.clone()))
        .map_err(|e| format!("Failed to register CHECKPOINT_WRITES_TOTAL: {}", e))?;

    REGISTRY
        .register(Box::new(CHECKPOINT_POSITION_SECONDS.clone()))
        .map_err(|e| format!("Failed to register CHECKPOINT_POSITION_SECONDS: {}", e))?;

    REGISTRY
        .register(Box::new(IN_FLIGHT_TASKS.clone()))
        .map_err(|e| format!("Failed to register IN_FLIGHT_TASKS: {}", e))?;

    REGISTRY
        .register(Box::new(CURSOR_TIMEOUTS_TOTAL.clone()))
        .map_err(|e| format!("Failed to register CURSOR_TIMEOUTS_TOTAL: {}", e))?;

    REGISTRY
        .register(Box::new(CURSOR_REOPENS_TOTAL.clone()))
        .map_err(|e| format!("Failed to register CURSOR_REOPENS_TOTAL: {}", e))?;

    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .map_err(|e| format!("Failed to register ERRORS_TOTAL: {}", e))?;

    REGISTRY
        .register(Box::new(UPTIME_SECONDS.clone()))
        .map_err(|e| format!("Failed to register UPTIME_SECONDS: {}", e))?;

    REGISTRY
        .register(Box::new(BUILD_INFO.clone()))
        .map_err(|e| format!("Failed to register BUILD_INFO: {}", e))?;

    debug!("All metrics registered successfully");
    Ok(())
}

/// Gather all metrics from the global registry
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let metric_families = REGISTRY.gather();
    let encoder = prometheus::TextEncoder::new();
    let mut output = Vec::new();
    encoder.encode(&metric_families, &mut output)?;
    Ok(String::from_utf8(output)?)
}
