use super::common::action_label;
use super::handler_factory::OplogHandler;
use crate::error::Result;
use crate::types::ChangeEvent;
use async_trait::async_trait;
use tracing::{info, warn};

/// Handler that writes one log line per event
#[derive(Debug, Default, Clone)]
pub struct LoggingHandler;

impl LoggingHandler {
    pub fn new() -> Self {
        Self
    }

    fn log(&self, event: &ChangeEvent) {
        info!(
            ts = %event.timestamp,
            ns = %event.namespace,
            id = %event.id,
            "{}: {}",
            action_label(&event.operation),
            event.data
        );
    }
}

#[async_trait]
impl OplogHandler for LoggingHandler {
    async fn on_insert(&self, event: &ChangeEvent) -> Result<()> {
        self.log(event);
        Ok(())
    }

    async fn on_update(&self, event: &ChangeEvent) -> Result<()> {
        self.log(event);
        Ok(())
    }

    async fn on_delete(&self, event: &ChangeEvent) -> Result<()> {
        self.log(event);
        Ok(())
    }

    async fn on_cmd(&self, event: &ChangeEvent) -> Result<()> {
        self.log(event);
        Ok(())
    }

    async fn on_noop(&self, event: &ChangeEvent) -> Result<()> {
        self.log(event);
        Ok(())
    }

    async fn on_unknown(&self, event: &ChangeEvent) -> Result<()> {
        warn!(
            ts = %event.timestamp,
            ns = %event.namespace,
            "{}",
            action_label(&event.operation)
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
