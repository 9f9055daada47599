//! Monitoring and Metrics Module
//!
//! Metrics collection, the Prometheus exposition server and the abstraction
//! layer that lets the tailer record metrics whether or not the `metrics`
//! feature is enabled.

// Metrics abstraction layer - always available
pub mod metrics_abstraction;

// Prometheus statics - only available when metrics feature is enabled
#[cfg(feature = "metrics")]
pub mod metrics;

// Metrics HTTP server - only available when metrics feature is enabled
#[cfg(feature = "metrics")]
pub mod metrics_server;

pub use metrics_abstraction::{
    gather_metrics, init_metrics, MetricsCollector, MetricsCollectorTrait, ProcessingTimer,
    ProcessingTimerTrait,
};

#[cfg(feature = "metrics")]
pub use metrics_server::{
    create_metrics_server, create_metrics_server_with_config, MetricsServer, MetricsServerConfig,
};
