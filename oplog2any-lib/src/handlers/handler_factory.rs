use crate::config::Config;
use crate::error::Result;
use crate::types::{ChangeEvent, SinkType};
use async_trait::async_trait;
use std::sync::Arc;

use super::LoggingHandler;

#[cfg(feature = "elasticsearch")]
use super::ElasticsearchForwarder;

#[cfg(not(feature = "elasticsearch"))]
use crate::error::CdcError;

/// Consumer of change events, one method per operation kind.
///
/// Methods are called concurrently from many routing tasks and in no
/// particular order, so implementations must be safe to share. An error is
/// logged by the router and does not stop the tailer.
#[async_trait]
pub trait OplogHandler: Send + Sync {
    async fn on_insert(&self, event: &ChangeEvent) -> Result<()>;

    async fn on_update(&self, event: &ChangeEvent) -> Result<()>;

    async fn on_delete(&self, event: &ChangeEvent) -> Result<()>;

    /// Database commands (`op = "c"`)
    async fn on_cmd(&self, event: &ChangeEvent) -> Result<()>;

    async fn on_noop(&self, event: &ChangeEvent) -> Result<()>;

    /// Any unrecognized operation code; the raw code is kept in
    /// [`ChangeEvent::operation`]
    async fn on_unknown(&self, event: &ChangeEvent) -> Result<()>;

    /// Name used in log lines
    fn name(&self) -> &str;
}

/// Factory for creating handlers
pub struct HandlerFactory;

impl HandlerFactory {
    /// Create the handler selected by `config.sink_type`
    pub fn create(config: &Config) -> Result<Arc<dyn OplogHandler>> {
        match config.sink_type {
            SinkType::Log => Ok(Arc::new(LoggingHandler::new())),

            #[cfg(feature = "elasticsearch")]
            SinkType::Elasticsearch => Ok(Arc::new(ElasticsearchForwarder::new(
                &config.sink_url,
                &config.environment,
            )?)),

            #[cfg(not(feature = "elasticsearch"))]
            SinkType::Elasticsearch => Err(CdcError::unsupported(format!(
                "Sink type {} is not enabled",
                config.sink_type
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(sink_type: SinkType) -> Config {
        Config::builder()
            .source_url("mongodb://localhost:27017")
            .sink_type(sink_type)
            .build()
            .unwrap()
    }

    #[test]
    fn test_handler_factory_create() {
        let handler = HandlerFactory::create(&config(SinkType::Log)).unwrap();
        assert_eq!(handler.name(), "log");

        #[cfg(feature = "elasticsearch")]
        {
            let handler = HandlerFactory::create(&config(SinkType::Elasticsearch)).unwrap();
            assert_eq!(handler.name(), "elasticsearch");
        }

        #[cfg(not(feature = "elasticsearch"))]
        assert!(HandlerFactory::create(&config(SinkType::Elasticsearch)).is_err());
    }
}
