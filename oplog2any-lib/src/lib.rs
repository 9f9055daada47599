//! # MongoDB Oplog Tailing Library
//!
//! Resumable tailing of the MongoDB operation log (`local.oplog.rs`). Every
//! entry whose namespace matches a filter is classified and handed to an
//! [`OplogHandler`], while the read position is checkpointed so a restart
//! resumes after the last processed entry.
//!
//! ## Features
//!
//! - Tailable-await cursor that is rebuilt from the checkpoint when the server closes it
//! - One checkpoint record per (namespace filter, label) pair, in MongoDB or a JSON file
//! - Bounded concurrent dispatch of checkpoint and routing tasks
//! - Pluggable handlers: logging and Elasticsearch forwarding
//! - Cooperative shutdown that drains in-flight work
//! - Optional Prometheus metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use oplog2any_lib::{load_app_config_from_env, run_tailer_app};
//! use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tracing_subscriber::registry()
//!         .with(EnvFilter::new("oplog2any=debug,mongodb=info"))
//!         .with(fmt::layer().compact())
//!         .init();
//!
//!     let app_config = load_app_config_from_env(env!("CARGO_PKG_VERSION"))?;
//!     run_tailer_app(app_config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Custom handlers
//!
//! Implement [`OplogHandler`] and build the tailer from parts with
//! [`OplogTailer::new`] or [`TailerApp::with_components`].

// Core modules
pub mod app;
pub mod config;
pub mod env;
pub mod error;
pub mod types;

// Reading and checkpointing
pub mod checkpoint;
pub mod retry;
pub mod source;

// Dispatch and delivery
pub mod dispatcher;
pub mod handlers;
pub mod router;
pub mod tailer;

// MongoDB driver integration
#[cfg(feature = "mongodb")]
pub mod mongo;

// Monitoring and metrics
pub mod monitoring;

// Public API exports
#[cfg(feature = "mongodb")]
pub use app::{create_checkpoint_backend, run_tailer_app};
pub use app::{TailerApp, TailerAppConfig};
pub use checkpoint::{CheckpointBackend, CheckpointStore, FileCheckpointBackend};
pub use config::{Config, ConfigBuilder, DEFAULT_POOL_CAPACITY};
pub use dispatcher::{BoundedDispatcher, DispatchSlot, ReleaseHook};
pub use env::{load_app_config_from_env, load_config_from_env};
pub use error::CdcError;
pub use retry::RetryConfig;
pub use router::{classify, route, EventRouter};
pub use source::{CursorEvent, CursorOptions, OplogCursor, OplogSelector, OplogSource};
pub use tailer::OplogTailer;
pub use types::{
    ChangeEvent, CheckpointKey, CheckpointRecord, OperationKind, OplogTimestamp, RawLogEntry,
    SinkType,
};
pub use tokio_util::sync::CancellationToken;

pub type CdcResult<T> = Result<T, CdcError>;

// Re-export handlers
pub use crate::handlers::{HandlerFactory, LoggingHandler, OplogHandler};

#[cfg(feature = "elasticsearch")]
pub use crate::handlers::{ElasticsearchForwarder, ForwardedDocument};

#[cfg(feature = "mongodb")]
pub use crate::mongo::{MongoCheckpointBackend, MongoOplogCursor, MongoOplogSource};

// Conditionally export metrics server functionality
#[cfg(feature = "metrics")]
pub use crate::monitoring::{
    create_metrics_server, create_metrics_server_with_config, MetricsServer, MetricsServerConfig,
};

// Always export metrics abstraction layer
pub use crate::monitoring::{
    gather_metrics, init_metrics, MetricsCollector, MetricsCollectorTrait, ProcessingTimer,
    ProcessingTimerTrait,
};
