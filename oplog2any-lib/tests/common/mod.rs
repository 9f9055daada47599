//! Shared test utilities for oplog2any-lib integration tests.
//!
//! - [`ScriptedSource`]: an in-memory oplog whose cursors follow per-open scripts
//! - [`RecordingHandler`]: records every handler call and tracks concurrency
//! - [`MemoryCheckpointBackend`]: checkpoint records in memory, with write failures on demand
#![allow(dead_code)]

use async_trait::async_trait;
use oplog2any_lib::error::Result;
use oplog2any_lib::{
    CdcError, ChangeEvent, CheckpointBackend, CheckpointKey, CheckpointRecord, Config,
    CursorEvent, CursorOptions, OplogCursor, OplogHandler, OplogSelector, OplogSource,
    OplogTimestamp, RawLogEntry, SinkType,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Entries and configuration
// =============================================================================

pub fn insert(seconds: u32, ordinal: u32, ns: &str) -> RawLogEntry {
    RawLogEntry::new(
        OplogTimestamp::new(seconds, ordinal),
        "i",
        ns,
        json!({ "_id": seconds, "n": ordinal }),
    )
}

pub fn entry(seconds: u32, op: &str, ns: &str) -> RawLogEntry {
    RawLogEntry::new(OplogTimestamp::new(seconds, 0), op, ns, json!({ "_id": seconds }))
}

/// Configuration with a log sink and fast retries
pub fn test_config(filter: &str, label: &str) -> Config {
    Config::builder()
        .source_url("mongodb://localhost:27017")
        .namespace_filter(filter)
        .label(label)
        .sink_type(SinkType::Log)
        .reconnect_poll_timeout(Duration::from_millis(50))
        .max_retry_attempts(3)
        .initial_retry_delay(Duration::from_millis(1))
        .max_retry_delay(Duration::from_millis(10))
        .max_retry_duration(Duration::from_secs(5))
        .retry_jitter(false)
        .build()
        .expect("valid test config")
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// =============================================================================
// Scripted source
// =============================================================================

/// One step of a cursor script
#[derive(Debug, Clone)]
pub enum Step {
    /// Emit every log entry matching the cursor's selector, in order
    Matching,
    /// Emit this entry if it matches the selector
    Entry(RawLogEntry),
    /// Report an idle timeout
    Timeout,
    /// Report that the source closed the cursor
    Closed,
    /// Fail with a cursor error
    Fail(String),
}

/// Record of one `open_cursor` call
#[derive(Debug, Clone)]
pub struct OpenRecord {
    pub after: OplogTimestamp,
    pub filter: String,
    pub idle_timeout: Option<Duration>,
}

/// In-memory oplog. Each open consumes the next script; without one the
/// cursor emits the matching log entries and then waits for more.
pub struct ScriptedSource {
    log: Vec<RawLogEntry>,
    scripts: Mutex<VecDeque<Vec<Step>>>,
    opens: Mutex<Vec<OpenRecord>>,
    failing_opens: AtomicU32,
    closes: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(log: Vec<RawLogEntry>) -> Self {
        Self {
            log,
            scripts: Mutex::new(VecDeque::new()),
            opens: Mutex::new(Vec::new()),
            failing_opens: AtomicU32::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script for the next unscripted open
    pub fn script(self, steps: Vec<Step>) -> Self {
        self.scripts.lock().unwrap().push_back(steps);
        self
    }

    /// Make the next `n` opens fail
    pub fn fail_opens(self, n: u32) -> Self {
        self.failing_opens.store(n, Ordering::SeqCst);
        self
    }

    pub fn opens(&self) -> Vec<OpenRecord> {
        self.opens.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OplogSource for ScriptedSource {
    async fn open_cursor(
        &self,
        selector: &OplogSelector,
        options: CursorOptions,
    ) -> Result<Box<dyn OplogCursor>> {
        self.opens.lock().unwrap().push(OpenRecord {
            after: selector.after(),
            filter: selector.namespace_filter().to_string(),
            idle_timeout: options.idle_timeout,
        });

        let failing = self.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(CdcError::cursor("node is recovering"));
        }

        let steps = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Step::Matching]);

        let mut events = VecDeque::new();
        for step in steps {
            match step {
                Step::Matching => events.extend(
                    self.log
                        .iter()
                        .filter(|e| selector.matches(e))
                        .cloned()
                        .map(|e| Ok(CursorEvent::Entry(e))),
                ),
                Step::Entry(e) if selector.matches(&e) => {
                    events.push_back(Ok(CursorEvent::Entry(e)))
                }
                Step::Entry(_) => {}
                Step::Timeout => events.push_back(Ok(CursorEvent::Timeout)),
                Step::Closed => events.push_back(Ok(CursorEvent::Closed)),
                Step::Fail(msg) => events.push_back(Err(CdcError::cursor(msg))),
            }
        }

        Ok(Box::new(ScriptedCursor {
            events,
            idle_timeout: options.idle_timeout,
            closes: Arc::clone(&self.closes),
        }))
    }

    fn describe(&self) -> String {
        "scripted oplog".to_string()
    }
}

struct ScriptedCursor {
    events: VecDeque<Result<CursorEvent>>,
    idle_timeout: Option<Duration>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl OplogCursor for ScriptedCursor {
    async fn next(&mut self) -> Result<CursorEvent> {
        if let Some(event) = self.events.pop_front() {
            return event;
        }

        // Caught up: behave like an awaiting tailable cursor with no new data
        match self.idle_timeout {
            Some(idle) => {
                tokio::time::sleep(idle).await;
                Ok(CursorEvent::Timeout)
            }
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Recording handler
// =============================================================================

/// Handler that records every call
#[derive(Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<(String, ChangeEvent)>>,
    delay: Option<Duration>,
    failing: AtomicBool,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Return an error from every call (after recording it)
    pub fn failing() -> Self {
        let handler = Self::default();
        handler.failing.store(true, Ordering::SeqCst);
        handler
    }

    /// `(method, event)` pairs in completion order
    pub fn calls(&self) -> Vec<(String, ChangeEvent)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn count_of(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    /// Delivered event timestamps, sorted
    pub fn timestamps(&self) -> Vec<String> {
        let mut ts: Vec<String> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.timestamp.clone())
            .collect();
        ts.sort();
        ts
    }

    /// Calls currently in progress
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    async fn record(&self, method: &str, event: &ChangeEvent) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), event.clone()));
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(CdcError::handler("downstream unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl OplogHandler for RecordingHandler {
    async fn on_insert(&self, event: &ChangeEvent) -> Result<()> {
        self.record("insert", event).await
    }

    async fn on_update(&self, event: &ChangeEvent) -> Result<()> {
        self.record("update", event).await
    }

    async fn on_delete(&self, event: &ChangeEvent) -> Result<()> {
        self.record("delete", event).await
    }

    async fn on_cmd(&self, event: &ChangeEvent) -> Result<()> {
        self.record("cmd", event).await
    }

    async fn on_noop(&self, event: &ChangeEvent) -> Result<()> {
        self.record("noop", event).await
    }

    async fn on_unknown(&self, event: &ChangeEvent) -> Result<()> {
        self.record("unknown", event).await
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// =============================================================================
// In-memory checkpoint backend
// =============================================================================

#[derive(Default)]
pub struct MemoryCheckpointBackend {
    records: Mutex<Vec<CheckpointRecord>>,
    fail_writes: AtomicBool,
    replaces: AtomicUsize,
    write_delay: Option<Duration>,
}

impl MemoryCheckpointBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<CheckpointRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Hold every replace for `delay` before applying it
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<CheckpointRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Stored position for `key`
    pub fn position(&self, key: &CheckpointKey) -> Option<OplogTimestamp> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.matches(key))
            .map(|r| r.start_reading_from_time)
    }

    pub fn replace_calls(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointBackend for MemoryCheckpointBackend {
    async fn count(&self, key: &CheckpointKey) -> Result<u64> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.matches(key))
            .count() as u64)
    }

    async fn find(&self, key: &CheckpointKey) -> Result<Option<CheckpointRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.matches(key))
            .cloned())
    }

    async fn insert(&self, record: &CheckpointRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CdcError::checkpoint("checkpoint store is read-only"));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn replace(&self, record: &CheckpointRecord) -> Result<()> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CdcError::checkpoint("checkpoint store is read-only"));
        }

        let key = record.key();
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.matches(&key)) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(CdcError::checkpoint(format!("no record for {}", key))),
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Shared handle types used by most tests
pub struct Harness {
    pub source: Arc<ScriptedSource>,
    pub checkpoints: Arc<MemoryCheckpointBackend>,
    pub handler: Arc<RecordingHandler>,
}

impl Harness {
    pub fn new(
        source: ScriptedSource,
        checkpoints: MemoryCheckpointBackend,
        handler: RecordingHandler,
    ) -> Self {
        Self {
            source: Arc::new(source),
            checkpoints: Arc::new(checkpoints),
            handler: Arc::new(handler),
        }
    }

    pub async fn tailer(&self, config: Config) -> Result<oplog2any_lib::OplogTailer> {
        oplog2any_lib::OplogTailer::new(
            config,
            self.source.clone(),
            self.checkpoints.clone(),
            self.handler.clone(),
        )
        .await
    }
}
