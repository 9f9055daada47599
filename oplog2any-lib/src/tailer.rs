//! Oplog tailer
//!
//! Reads matching oplog entries through a tailable cursor starting after the
//! stored checkpoint and, for every entry, spawns two tasks through the
//! bounded dispatcher: one advancing the checkpoint and one routing the
//! entry to the handler.
//!
//! ## Cursor lifecycle
//!
//! - an entry is dispatched and reading continues
//! - an idle timeout is not an error; the tailer keeps waiting
//! - a cursor closed by the source is rebuilt from the current checkpoint
//!   position, with the reconnect poll timeout as its idle window
//! - any other cursor error closes the cursor and ends the run with that error
//!
//! Whatever ends the run, in-flight tasks are drained before
//! [`OplogTailer::start`] returns.

use crate::checkpoint::{CheckpointBackend, CheckpointStore};
use crate::config::Config;
use crate::dispatcher::{BoundedDispatcher, DispatchSlot, ReleaseHook};
use crate::error::Result;
use crate::handlers::OplogHandler;
use crate::monitoring::{MetricsCollector, MetricsCollectorTrait};
use crate::retry::{open_cursor_with_retry, RetryConfig};
use crate::router::EventRouter;
use crate::source::{CursorEvent, CursorOptions, OplogCursor, OplogSelector, OplogSource};
use crate::types::RawLogEntry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Tails the operation log for one (namespace filter, label) pair
pub struct OplogTailer {
    config: Config,
    source: Arc<dyn OplogSource>,
    checkpoint: Arc<CheckpointStore>,
    router: Arc<EventRouter>,
    dispatcher: BoundedDispatcher,
    metrics: Arc<MetricsCollector>,
    retry: RetryConfig,
    shutdown: CancellationToken,
}

impl OplogTailer {
    /// Create a tailer, loading (or creating) its checkpoint.
    ///
    /// # Errors
    ///
    /// Fails when the checkpoint cannot be loaded, including when more than
    /// one checkpoint record exists for the configured filter and label.
    pub async fn new(
        config: Config,
        source: Arc<dyn OplogSource>,
        checkpoints: Arc<dyn CheckpointBackend>,
        handler: Arc<dyn OplogHandler>,
    ) -> Result<Self> {
        Self::with_metrics(
            config,
            source,
            checkpoints,
            handler,
            Arc::new(MetricsCollector::new()),
        )
        .await
    }

    /// Like [`new`](Self::new), recording into an existing metrics collector
    pub async fn with_metrics(
        config: Config,
        source: Arc<dyn OplogSource>,
        checkpoints: Arc<dyn CheckpointBackend>,
        handler: Arc<dyn OplogHandler>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let checkpoint =
            CheckpointStore::load_or_create(checkpoints, config.checkpoint_key()).await?;

        Ok(Self {
            dispatcher: BoundedDispatcher::new(config.pool_capacity)
                .with_release_hook(in_flight_gauge(&metrics)),
            retry: RetryConfig::from(&config),
            router: Arc::new(EventRouter::new(handler, Arc::clone(&metrics))),
            checkpoint: Arc::new(checkpoint),
            shutdown: CancellationToken::new(),
            config,
            source,
            metrics,
        })
    }

    /// Token that stops the tailer when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request a cooperative stop
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    pub fn dispatcher(&self) -> &BoundedDispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tail until stopped or a fatal cursor error occurs.
    ///
    /// Returns `Ok(())` after a requested stop and the cursor error otherwise.
    /// In both cases every dispatched task has finished when this returns.
    pub async fn start(&self) -> Result<()> {
        info!(
            "Starting oplog tailer on {} for {} from {}",
            self.source.describe(),
            self.checkpoint.key(),
            self.checkpoint.position()
        );

        self.dispatcher.reopen();
        let result = self.read_loop().await;

        debug!("Draining {} in-flight task(s)", self.dispatcher.in_flight());
        self.dispatcher.drain().await;
        self.metrics.update_in_flight(self.dispatcher.in_flight());

        if let Err(e) = self.checkpoint.persist().await {
            warn!(
                "Failed to persist final checkpoint {} at {}: {}",
                self.checkpoint.key(),
                self.checkpoint.position(),
                e
            );
        }

        match &result {
            Ok(()) => info!(
                "Oplog tailer stopped at checkpoint {}",
                self.checkpoint.position()
            ),
            Err(e) => {
                self.metrics.record_error("cursor", "tailer");
                error!(
                    "Oplog tailer for {} stopped with error: {}",
                    self.checkpoint.key(),
                    e
                );
            }
        }

        result
    }

    async fn read_loop(&self) -> Result<()> {
        let initial = CursorOptions::with_idle_timeout(self.config.idle_timeout);
        let Some(mut cursor) = self.open_cursor(initial).await? else {
            return Ok(());
        };

        loop {
            let polled = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                polled = cursor.next() => Some(polled),
            };

            let Some(polled) = polled else {
                info!("Stop requested, closing oplog cursor");
                self.close_cursor(cursor.as_mut()).await;
                return Ok(());
            };

            match polled {
                Ok(CursorEvent::Entry(entry)) => {
                    if !self.dispatch(entry).await? {
                        info!("Stop requested while waiting for a dispatch slot");
                        self.close_cursor(cursor.as_mut()).await;
                        return Ok(());
                    }
                }
                Ok(CursorEvent::Timeout) => {
                    self.metrics.record_cursor_timeout();
                    debug!("No new oplog entries within the idle window, still waiting");
                }
                Ok(CursorEvent::Closed) => {
                    self.metrics.record_cursor_reopen();
                    warn!(
                        "Oplog cursor closed by the source, reopening from {}",
                        self.checkpoint.position()
                    );
                    let reopen =
                        CursorOptions::with_idle_timeout(Some(self.config.reconnect_poll_timeout));
                    match self.open_cursor(reopen).await? {
                        Some(reopened) => cursor = reopened,
                        None => return Ok(()),
                    }
                }
                Err(e) => {
                    error!("Oplog cursor failed for {}: {}", self.checkpoint.key(), e);
                    self.close_cursor(cursor.as_mut()).await;
                    return Err(e);
                }
            }
        }
    }

    /// Open a cursor after the current checkpoint; `None` when stopped meanwhile
    async fn open_cursor(&self, options: CursorOptions) -> Result<Option<Box<dyn OplogCursor>>> {
        let selector =
            OplogSelector::new(self.checkpoint.position(), &self.config.namespace_filter);
        info!(
            "Opening oplog cursor on {} where {}",
            self.source.describe(),
            selector
        );

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Ok(None),
            cursor = open_cursor_with_retry(
                self.source.as_ref(),
                &selector,
                options,
                &self.retry,
            ) => cursor.map(Some),
        }
    }

    async fn close_cursor(&self, cursor: &mut dyn OplogCursor) {
        if let Err(e) = cursor.close().await {
            warn!("Failed to close oplog cursor: {}", e);
        }
    }

    /// Spawn the checkpoint and routing tasks of one entry.
    ///
    /// Returns `false` when a stop was requested before the entry was
    /// admitted. Once its checkpoint task is running, the routing task of the
    /// same entry is always launched.
    async fn dispatch(&self, entry: RawLogEntry) -> Result<bool> {
        let Some(slot) = self.admit_or_stop().await? else {
            return Ok(false);
        };

        let timestamp = entry.timestamp;
        let checkpoint = Arc::clone(&self.checkpoint);
        let metrics = Arc::clone(&self.metrics);
        self.dispatcher.spawn(slot, async move {
            match checkpoint.advance(timestamp).await {
                Ok(()) => metrics.record_checkpoint_write(timestamp, true),
                Err(e) => {
                    metrics.record_checkpoint_write(timestamp, false);
                    warn!(
                        "Failed to write checkpoint {} at {}: {}",
                        checkpoint.key(),
                        timestamp,
                        e
                    );
                }
            }
        });

        let slot = self.dispatcher.admit().await?;
        let router = Arc::clone(&self.router);
        self.dispatcher.spawn(slot, async move {
            router.handle_entry(entry).await;
        });

        self.metrics.update_in_flight(self.dispatcher.in_flight());
        Ok(true)
    }

    async fn admit_or_stop(&self) -> Result<Option<DispatchSlot>> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Ok(None),
            slot = self.dispatcher.admit() => slot.map(Some),
        }
    }
}

fn in_flight_gauge(metrics: &Arc<MetricsCollector>) -> ReleaseHook {
    let metrics = Arc::clone(metrics);
    Arc::new(move |in_flight| metrics.update_in_flight(in_flight))
}

impl std::fmt::Debug for OplogTailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OplogTailer")
            .field("source", &self.source.describe())
            .field("checkpoint", &self.checkpoint)
            .field("capacity", &self.dispatcher.capacity())
            .finish()
    }
}
