//! Event classification and routing
//!
//! Turns a [`RawLogEntry`] into a [`ChangeEvent`] and invokes exactly one
//! [`OplogHandler`] method for it, chosen by the operation code.

use crate::error::Result;
use crate::handlers::OplogHandler;
use crate::monitoring::{
    MetricsCollector, MetricsCollectorTrait, ProcessingTimer, ProcessingTimerTrait,
};
use crate::types::{ChangeEvent, OperationKind, RawLogEntry};
use std::sync::Arc;
use tracing::{debug, error};

/// Build the change event for `entry`.
///
/// The timestamp is reduced to its seconds component; the query object
/// renders as `{}` when the entry has none.
pub fn classify(entry: &RawLogEntry) -> ChangeEvent {
    ChangeEvent {
        timestamp: entry.timestamp.seconds().to_string(),
        namespace: entry.namespace.clone(),
        id: render_document(entry.query_object.as_ref()),
        data: render_document(Some(&entry.object)),
        operation: entry.operation_kind(),
    }
}

fn render_document(document: Option<&serde_json::Value>) -> String {
    match document {
        Some(serde_json::Value::Null) | None => "{}".to_string(),
        Some(document) => document.to_string(),
    }
}

/// Invoke the handler method matching the event's operation
pub async fn route(event: &ChangeEvent, handler: &dyn OplogHandler) -> Result<()> {
    match &event.operation {
        OperationKind::Insert => handler.on_insert(event).await,
        OperationKind::Update => handler.on_update(event).await,
        OperationKind::Delete => handler.on_delete(event).await,
        OperationKind::Command => handler.on_cmd(event).await,
        OperationKind::Noop => handler.on_noop(event).await,
        OperationKind::Unknown(_) => handler.on_unknown(event).await,
    }
}

/// Routes entries to a shared handler and records the outcome
pub struct EventRouter {
    handler: Arc<dyn OplogHandler>,
    metrics: Arc<MetricsCollector>,
}

impl EventRouter {
    pub fn new(handler: Arc<dyn OplogHandler>, metrics: Arc<MetricsCollector>) -> Self {
        Self { handler, metrics }
    }

    pub fn handler(&self) -> &Arc<dyn OplogHandler> {
        &self.handler
    }

    /// Classify and route one entry.
    ///
    /// Handler errors are logged and counted, never propagated.
    pub async fn handle_entry(&self, entry: RawLogEntry) {
        let event = classify(&entry);
        let operation = event.operation.name();
        debug!(
            ts = %entry.timestamp,
            ns = %event.namespace,
            op = %event.op_code(),
            "Routing oplog entry"
        );

        self.metrics.record_event(&event);
        let timer = ProcessingTimer::start(operation, self.handler.name());
        let result = route(&event, self.handler.as_ref()).await;
        timer.finish(self.metrics.as_ref());

        if let Err(e) = result {
            self.metrics
                .record_handler_error(operation, self.handler.name());
            error!(
                ts = %entry.timestamp,
                ns = %event.namespace,
                op = %event.op_code(),
                "Handler {} failed: {}",
                self.handler.name(),
                e
            );
        }
    }
}
