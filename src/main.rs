use oplog2any_lib::{load_app_config_from_env, run_tailer_app};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tails the MongoDB oplog and forwards change events to the configured handler
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    tracing::info!("Starting MongoDB oplog tailer");

    let app_config = load_app_config_from_env(env!("CARGO_PKG_VERSION"))?;

    // Returns after a shutdown signal once in-flight events are drained
    run_tailer_app(app_config).await?;

    tracing::info!("Oplog tailer stopped");
    Ok(())
}

/// Initialize logging
///
/// The log level can be controlled via the `RUST_LOG` environment variable.
///
/// # Default Log Level
///
/// If `RUST_LOG` is not set, defaults to:
/// - `oplog2any=debug` - Debug level for the tailer (matches the library too)
/// - `mongodb=info` - Info level for the MongoDB driver
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("oplog2any=debug,mongodb=info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Logging initialized with level filtering");
}
