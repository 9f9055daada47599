pub mod common;

/// Handler that only logs events
pub mod logging;

/// Elasticsearch forwarding handler
#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

/// Handler factory and trait definitions
pub mod handler_factory;

pub use logging::LoggingHandler;

#[cfg(feature = "elasticsearch")]
pub use elasticsearch::{ElasticsearchForwarder, ForwardedDocument};

// Re-export factory and trait
pub use handler_factory::{HandlerFactory, OplogHandler};
