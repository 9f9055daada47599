//! Metrics Abstraction Layer
//!
//! The tailer records metrics through [`MetricsCollectorTrait`]. With the
//! `metrics` feature the collector feeds the Prometheus statics in
//! [`crate::monitoring::metrics`]; without it every call is a no-op and the
//! API stays the same.
use crate::types::{ChangeEvent, OplogTimestamp};
use crate::CdcResult;
use std::time::Duration;

/// Abstract metrics collector trait.
///
/// All implementations are safe to call from many tasks at once.
pub trait MetricsCollectorTrait: Send + Sync {
    /// Create a new metrics collector instance
    fn new() -> Self
    where
        Self: Sized;

    /// Record an event handed to the handler
    fn record_event(&self, event: &ChangeEvent);

    /// Record a failed handler invocation
    fn record_handler_error(&self, operation: &str, handler: &str);

    /// Record how long one handler invocation took
    fn record_handler_duration(&self, duration: Duration, operation: &str, handler: &str);

    /// Record the outcome of a checkpoint write for `position`
    fn record_checkpoint_write(&self, position: OplogTimestamp, success: bool);

    /// Update the number of admitted tasks
    fn update_in_flight(&self, count: usize);

    /// Record an idle window that elapsed without a new entry
    fn record_cursor_timeout(&self);

    /// Record a cursor rebuilt after the source closed it
    fn record_cursor_reopen(&self);

    /// Record an error
    fn record_error(&self, error_type: &str, component: &str);

    /// Update uptime
    fn update_uptime(&self);

    /// Get metrics in Prometheus text format
    fn get_metrics(&self) -> CdcResult<String>;

    /// Initialize build information
    fn init_build_info(&self, version: &str);
}

/// Times one handler invocation
pub trait ProcessingTimerTrait {
    /// Start a new processing timer
    fn start(operation: &str, handler: &str) -> Self
    where
        Self: Sized;

    /// Finish timing and record the duration on `collector`
    fn finish(self, collector: &dyn MetricsCollectorTrait);
}

// =============================================================================
// Real metrics implementations (when metrics feature is enabled)
// =============================================================================

#[cfg(feature = "metrics")]
pub use real_metrics::*;

#[cfg(feature = "metrics")]
mod real_metrics {
    use super::*;
    use crate::monitoring::metrics::*;
    use std::time::Instant;
    use tracing::warn;

    /// Prometheus-backed metrics collector
    #[derive(Debug)]
    pub struct MetricsCollector {
        start_time: Instant,
    }

    impl MetricsCollectorTrait for MetricsCollector {
        fn new() -> Self {
            Self {
                start_time: Instant::now(),
            }
        }

        fn record_event(&self, event: &ChangeEvent) {
            EVENTS_PROCESSED_TOTAL.inc();
            EVENTS_BY_OPERATION
                .with_label_values(&[event.operation.name(), event.namespace.as_str()])
                .inc();
        }

        fn record_handler_error(&self, operation: &str, handler: &str) {
            HANDLER_ERRORS_TOTAL
                .with_label_values(&[operation, handler])
                .inc();
        }

        fn record_handler_duration(&self, duration: Duration, operation: &str, handler: &str) {
            HANDLER_DURATION
                .with_label_values(&[operation, handler])
                .observe(duration.as_secs_f64());
        }

        fn record_checkpoint_write(&self, position: OplogTimestamp, success: bool) {
            let result = if success { "success" } else { "failure" };
            CHECKPOINT_WRITES_TOTAL.with_label_values(&[result]).inc();
            if success {
                CHECKPOINT_POSITION_SECONDS.set(position.seconds() as f64);
            }
        }

        fn update_in_flight(&self, count: usize) {
            IN_FLIGHT_TASKS.set(count as f64);
        }

        fn record_cursor_timeout(&self) {
            CURSOR_TIMEOUTS_TOTAL.inc();
        }

        fn record_cursor_reopen(&self) {
            CURSOR_REOPENS_TOTAL.inc();
        }

        fn record_error(&self, error_type: &str, component: &str) {
            ERRORS_TOTAL
                .with_label_values(&[error_type, component])
                .inc();
            warn!(
                "Error recorded: type={}, component={}",
                error_type, component
            );
        }

        fn update_uptime(&self) {
            UPTIME_SECONDS.set(self.start_time.elapsed().as_secs() as f64);
        }

        fn get_metrics(&self) -> CdcResult<String> {
            self.update_uptime();
            super::gather_metrics()
        }

        fn init_build_info(&self, version: &str) {
            BUILD_INFO.with_label_values(&[version]).set(1.0);
        }
    }

    /// Processing timer recording into the handler duration histogram
    pub struct ProcessingTimer {
        start_time: Instant,
        operation: String,
        handler: String,
    }

    impl ProcessingTimerTrait for ProcessingTimer {
        fn start(operation: &str, handler: &str) -> Self {
            Self {
                start_time: Instant::now(),
                operation: operation.to_string(),
                handler: handler.to_string(),
            }
        }

        fn finish(self, collector: &dyn MetricsCollectorTrait) {
            collector.record_handler_duration(
                self.start_time.elapsed(),
                &self.operation,
                &self.handler,
            );
        }
    }
}

// =============================================================================
// No-op metrics implementations (when metrics feature is disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub use noop_metrics::*;

#[cfg(not(feature = "metrics"))]
mod noop_metrics {
    use super::*;

    /// No-op metrics collector that does nothing
    #[derive(Debug)]
    pub struct MetricsCollector;

    impl MetricsCollectorTrait for MetricsCollector {
        fn new() -> Self {
            Self
        }

        fn record_event(&self, _event: &ChangeEvent) {}

        fn record_handler_error(&self, _operation: &str, _handler: &str) {}

        fn record_handler_duration(&self, _duration: Duration, _operation: &str, _handler: &str) {}

        fn record_checkpoint_write(&self, _position: OplogTimestamp, _success: bool) {}

        fn update_in_flight(&self, _count: usize) {}

        fn record_cursor_timeout(&self) {}

        fn record_cursor_reopen(&self) {}

        fn record_error(&self, _error_type: &str, _component: &str) {}

        fn update_uptime(&self) {}

        fn get_metrics(&self) -> CdcResult<String> {
            Ok("# Metrics not available - metrics feature disabled\n".to_string())
        }

        fn init_build_info(&self, _version: &str) {}
    }

    /// No-op processing timer that does nothing
    pub struct ProcessingTimer;

    impl ProcessingTimerTrait for ProcessingTimer {
        fn start(_operation: &str, _handler: &str) -> Self {
            Self
        }

        fn finish(self, _collector: &dyn MetricsCollectorTrait) {}
    }
}

// =============================================================================
// Convenience functions for metrics initialization
// =============================================================================

/// Initialize the global metrics registry (only when metrics feature is enabled)
#[cfg(feature = "metrics")]
pub fn init_metrics() -> CdcResult<()> {
    crate::monitoring::metrics::init_metrics().map_err(|e| crate::CdcError::generic(e.to_string()))
}

/// No-op metrics initialization when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn init_metrics() -> CdcResult<()> {
    tracing::debug!("Metrics feature disabled - skipping metrics initialization");
    Ok(())
}

/// Gather all metrics from the global registry (only when metrics feature is enabled)
#[cfg(feature = "metrics")]
pub fn gather_metrics() -> CdcResult<String> {
    crate::monitoring::metrics::gather_metrics()
        .map_err(|e| crate::CdcError::generic(e.to_string()))
}

/// Return a message indicating metrics are disabled
#[cfg(not(feature = "metrics"))]
pub fn gather_metrics() -> CdcResult<String> {
    Ok("# Metrics not available - metrics feature disabled\n".to_string())
}
