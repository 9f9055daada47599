//! Checkpoint tracking for resumable oplog tailing
//!
//! A checkpoint records, for one (namespace filter, label) pair, the oplog
//! timestamp after which reading resumes on the next start. There must be at
//! most one record per pair; the store refuses to start otherwise.
//!
//! ## Write model
//!
//! Every processed entry spawns an independent checkpoint task, so advances
//! arrive out of log order. The in-memory position only moves forward (the
//! larger timestamp wins) and each task persists a snapshot of it with
//! replace semantics. Two snapshots may still land in the backend out of
//! order; the next write catches up. The persisted value never drops below
//! the position loaded at startup because every tailed entry is newer.
//!
//! Because checkpoint tasks do not wait for the routing task of the same
//! entry, the checkpoint can move past an entry whose delivery has not
//! finished or failed. After a restart such an entry is not replayed.
//! Delivery is therefore at-least-once only for entries that were not yet
//! checkpointed.

pub mod file;

pub use file::FileCheckpointBackend;

use crate::error::{CdcError, Result};
use crate::types::{CheckpointKey, CheckpointRecord, OplogTimestamp};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Storage for checkpoint records keyed by an exact (filter, label) match
#[async_trait]
pub trait CheckpointBackend: Send + Sync {
    /// Number of records matching both key fields
    async fn count(&self, key: &CheckpointKey) -> Result<u64>;

    /// The first record matching both key fields
    async fn find(&self, key: &CheckpointKey) -> Result<Option<CheckpointRecord>>;

    /// Store a new record
    async fn insert(&self, record: &CheckpointRecord) -> Result<()>;

    /// Overwrite the record with the same key entirely
    async fn replace(&self, record: &CheckpointRecord) -> Result<()>;

    /// Human readable location, used in log lines
    fn describe(&self) -> String;
}

fn wall_clock(timestamp: OplogTimestamp) -> String {
    timestamp
        .to_datetime()
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| "out of range".to_string())
}

/// The checkpoint of a single tailer
pub struct CheckpointStore {
    backend: Arc<dyn CheckpointBackend>,
    key: CheckpointKey,
    record: Mutex<CheckpointRecord>,
    initial_position: OplogTimestamp,
    writes: AtomicU64,
    failed_writes: AtomicU64,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("backend", &self.backend.describe())
            .field("key", &self.key)
            .field("position", &self.position())
            .finish()
    }
}

impl CheckpointStore {
    /// Load the record for `key`, creating it at the current time when missing.
    ///
    /// # Errors
    ///
    /// Returns [`CdcError::CheckpointConflict`] when more than one record
    /// matches the key, and the backend error when it cannot be read or the
    /// new record cannot be stored.
    pub async fn load_or_create(
        backend: Arc<dyn CheckpointBackend>,
        key: CheckpointKey,
    ) -> Result<Self> {
        debug!("Looking up checkpoint {} in {}", key, backend.describe());

        let count = backend.count(&key).await?;
        if count > 1 {
            return Err(CdcError::CheckpointConflict {
                filter_regex: key.filter_regex.clone(),
                label: key.label.clone(),
                count,
            });
        }

        let record = if count == 0 {
            let record = CheckpointRecord::new(&key, OplogTimestamp::now());
            info!(
                "Creating checkpoint {} starting at {} ({}) in {}",
                key,
                record.start_reading_from_time,
                wall_clock(record.start_reading_from_time),
                backend.describe()
            );
            backend.insert(&record).await?;
            record
        } else {
            let record = backend.find(&key).await?.ok_or_else(|| {
                CdcError::checkpoint(format!(
                    "Checkpoint {} was counted but could not be read",
                    key
                ))
            })?;
            info!(
                "Read checkpoint {} at {} ({}) from {}",
                key,
                record.start_reading_from_time,
                wall_clock(record.start_reading_from_time),
                backend.describe()
            );
            record
        };

        Ok(Self {
            backend,
            key,
            initial_position: record.start_reading_from_time,
            record: Mutex::new(record),
            writes: AtomicU64::new(0),
            failed_writes: AtomicU64::new(0),
        })
    }

    pub fn key(&self) -> &CheckpointKey {
        &self.key
    }

    /// Current in-memory position
    pub fn position(&self) -> OplogTimestamp {
        self.lock_record().start_reading_from_time
    }

    /// Position the store was loaded or created with
    pub fn initial_position(&self) -> OplogTimestamp {
        self.initial_position
    }

    /// Snapshot of the in-memory record
    pub fn current(&self) -> CheckpointRecord {
        self.lock_record().clone()
    }

    /// Move the position to `timestamp` (if newer) and persist the record.
    ///
    /// The in-memory position is updated even when the write fails, so the
    /// next successful write stores it.
    pub async fn advance(&self, timestamp: OplogTimestamp) -> Result<()> {
        let snapshot = {
            let mut record = self.lock_record();
            if timestamp > record.start_reading_from_time {
                record.start_reading_from_time = timestamp;
            }
            record.clone()
        };

        self.write(&snapshot).await
    }

    /// Persist the current in-memory record
    pub async fn persist(&self) -> Result<()> {
        let snapshot = self.current();
        self.write(&snapshot).await
    }

    /// Number of successful writes since startup
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of failed writes since startup
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    async fn write(&self, snapshot: &CheckpointRecord) -> Result<()> {
        match self.backend.replace(snapshot).await {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Persisted checkpoint {} at {}",
                    self.key, snapshot.start_reading_from_time
                );
                Ok(())
            }
            Err(e) => {
                self.failed_writes.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn lock_record(&self) -> std::sync::MutexGuard<'_, CheckpointRecord> {
        // A panic while holding the lock cannot leave the record half-written
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
