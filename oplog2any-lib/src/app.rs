//! Tailer Application Runner
//!
//! Wires the MongoDB source, the checkpoint backend and the handler selected
//! by the configuration into an [`OplogTailer`], installs signal handling and
//! runs it until it stops.

use crate::checkpoint::CheckpointBackend;
use crate::config::Config;
use crate::handlers::OplogHandler;
use crate::monitoring::{MetricsCollector, MetricsCollectorTrait};
use crate::source::OplogSource;
use crate::tailer::OplogTailer;
use crate::CdcResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Configuration for the tailer application
#[derive(Debug, Clone)]
pub struct TailerAppConfig {
    /// Tailer configuration
    pub tailer_config: Config,
    /// Metrics server port (if metrics feature is enabled)
    pub metrics_port: Option<u16>,
    /// Application version for metrics
    pub version: String,
}

impl TailerAppConfig {
    pub fn new(tailer_config: Config) -> Self {
        Self {
            tailer_config,
            metrics_port: None,
            version: "unknown".to_string(),
        }
    }

    /// Set the metrics server port
    pub fn with_metrics_port(&mut self, port: u16) {
        self.metrics_port = Some(port);
    }

    /// Set the application version
    pub fn with_version(&mut self, version: &str) {
        self.version = version.to_string();
    }
}

/// High-level tailer application
pub struct TailerApp {
    tailer: OplogTailer,
    metrics: Arc<MetricsCollector>,
    config: TailerAppConfig,
}

impl TailerApp {
    /// Connect to MongoDB and build the tailer described by `config`.
    ///
    /// # Errors
    ///
    /// Fails when the source cannot be reached, the handler cannot be
    /// created, or the checkpoint cannot be loaded (including duplicate
    /// checkpoint records).
    #[cfg(feature = "mongodb")]
    pub async fn new(config: TailerAppConfig) -> CdcResult<Self> {
        tracing::info!("Connecting to MongoDB source");
        let client = crate::mongo::connect(&config.tailer_config).await?;

        let source: Arc<dyn OplogSource> = Arc::new(crate::mongo::MongoOplogSource::new(
            client.clone(),
            &config.tailer_config,
        ));
        let checkpoints = create_checkpoint_backend(&config.tailer_config, &client)?;
        let handler = crate::handlers::HandlerFactory::create(&config.tailer_config)?;

        Self::with_components(config, source, checkpoints, handler).await
    }

    /// Build the application from already constructed parts
    pub async fn with_components(
        config: TailerAppConfig,
        source: Arc<dyn OplogSource>,
        checkpoints: Arc<dyn CheckpointBackend>,
        handler: Arc<dyn OplogHandler>,
    ) -> CdcResult<Self> {
        if let Err(e) = crate::monitoring::init_metrics() {
            // Registration fails when a previous app in this process already did it
            tracing::warn!("Metrics registration skipped: {}", e);
        }
        let metrics = Arc::new(MetricsCollector::new());

        tracing::info!(
            "Initializing tailer with {} handler and {} checkpoints",
            handler.name(),
            checkpoints.describe()
        );
        let tailer = OplogTailer::with_metrics(
            config.tailer_config.clone(),
            source,
            checkpoints,
            handler,
            Arc::clone(&metrics),
        )
        .await?;

        Ok(Self {
            tailer,
            metrics,
            config,
        })
    }

    /// Run until a shutdown signal arrives or the tailer fails.
    ///
    /// A signal cancels the tailer token; the tailer then drains its tasks
    /// and this returns `Ok(())`.
    pub async fn run(&self) -> CdcResult<()> {
        self.metrics.init_build_info(&self.config.version);
        let shutdown = self.tailer.shutdown_token();

        #[cfg(feature = "metrics")]
        let metrics_server = self.config.metrics_port.map(|port| {
            tracing::info!("Starting metrics server on port {}", port);
            let server = crate::monitoring::create_metrics_server(port);
            let token = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = server.start(token).await {
                    tracing::error!("Metrics server stopped unexpectedly: {}", e);
                }
            })
        });

        let shutdown_handler = tokio::spawn(setup_shutdown_handler(shutdown.clone()));

        tracing::info!("Starting oplog tailing");
        let result = self.tailer.start().await;

        shutdown_handler.abort();
        // Stops the metrics server as well
        shutdown.cancel();

        #[cfg(feature = "metrics")]
        if let Some(handle) = metrics_server {
            let _ = handle.await;
        }

        match &result {
            Ok(()) => tracing::info!("Oplog tailing stopped gracefully"),
            Err(e) => tracing::error!("Oplog tailing failed: {}", e),
        }
        result
    }

    /// Get metrics in Prometheus text format
    pub fn get_metrics(&self) -> CdcResult<String> {
        self.metrics.get_metrics()
    }

    pub fn tailer(&self) -> &OplogTailer {
        &self.tailer
    }
}

/// Checkpoints go to `config.checkpoint_file` when set, else to MongoDB
#[cfg(feature = "mongodb")]
pub fn create_checkpoint_backend(
    config: &Config,
    client: &mongodb::Client,
) -> CdcResult<Arc<dyn CheckpointBackend>> {
    match &config.checkpoint_file {
        Some(path) => Ok(Arc::new(crate::checkpoint::FileCheckpointBackend::new(
            path,
        )?)),
        None => Ok(Arc::new(crate::mongo::MongoCheckpointBackend::new(
            client, config,
        ))),
    }
}

/// Create and run the tailer application in one call
///
/// # Example
///
/// ```rust,no_run
/// use oplog2any_lib::{load_app_config_from_env, run_tailer_app};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let app_config = load_app_config_from_env(env!("CARGO_PKG_VERSION"))?;
///     run_tailer_app(app_config).await?;
///     Ok(())
/// }
/// ```
#[cfg(feature = "mongodb")]
pub async fn run_tailer_app(config: TailerAppConfig) -> CdcResult<()> {
    let app = TailerApp::new(config).await?;
    app.run().await
}

/// Cancel `shutdown_token` on SIGTERM or SIGINT (Ctrl+C elsewhere)
async fn setup_shutdown_handler(shutdown_token: CancellationToken) {
    use tokio::signal;

    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    }
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Failed to install signal handlers ({}), falling back to Ctrl+C", e);
                if signal::ctrl_c().await.is_err() {
                    return;
                }
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if signal::ctrl_c().await.is_err() {
            tracing::warn!("Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }

    shutdown_token.cancel();
}
