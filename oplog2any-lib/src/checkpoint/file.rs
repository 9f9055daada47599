//! JSON file checkpoint backend
//!
//! Keeps every checkpoint record of the process in one JSON document:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "last_updated": "2026-01-04T10:30:45Z",
//!   "records": [
//!     { "filterRegex": "shop\\..*", "label": "east", "startReadingFromTime": 7301540419584983041 }
//!   ]
//! }
//! ```
//!
//! Writes go to a temp file that is renamed over the original so a crash
//! never leaves a truncated document behind.

use super::CheckpointBackend;
use crate::error::{CdcError, Result};
use crate::types::{CheckpointKey, CheckpointRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Metadata format version for the checkpoint file
const CHECKPOINT_FILE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointFile {
    version: String,
    last_updated: DateTime<Utc>,
    records: Vec<CheckpointRecord>,
}

impl Default for CheckpointFile {
    fn default() -> Self {
        Self {
            version: CHECKPOINT_FILE_VERSION.to_string(),
            last_updated: Utc::now(),
            records: Vec::new(),
        }
    }
}

/// Checkpoint backend storing records in a local JSON file
#[derive(Debug)]
pub struct FileCheckpointBackend {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl FileCheckpointBackend {
    /// Create a backend for `path`, creating its parent directory if needed
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!("Created directory for checkpoint file: {:?}", parent);
            }
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<CheckpointFile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(CheckpointFile::default()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                CdcError::checkpoint(format!(
                    "Failed to parse checkpoint file {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CheckpointFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, file: &mut CheckpointFile) -> Result<()> {
        file.last_updated = Utc::now();
        let json = serde_json::to_string_pretty(file)?;

        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(".tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!(
            "Wrote {} checkpoint record(s) to {}",
            file.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl CheckpointBackend for FileCheckpointBackend {
    async fn count(&self, key: &CheckpointKey) -> Result<u64> {
        let _guard = self.lock.lock().await;
        let file = self.read_file().await?;
        Ok(file.records.iter().filter(|r| r.matches(key)).count() as u64)
    }

    async fn find(&self, key: &CheckpointKey) -> Result<Option<CheckpointRecord>> {
        let _guard = self.lock.lock().await;
        let file = self.read_file().await?;
        Ok(file.records.into_iter().find(|r| r.matches(key)))
    }

    async fn insert(&self, record: &CheckpointRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.read_file().await?;
        file.records.push(record.clone());
        self.write_file(&mut file).await
    }

    async fn replace(&self, record: &CheckpointRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.read_file().await?;
        let key = record.key();

        let slot = file
            .records
            .iter_mut()
            .find(|r| r.matches(&key))
            .ok_or_else(|| {
                CdcError::checkpoint(format!(
                    "No checkpoint record for {} in {}",
                    key,
                    self.path.display()
                ))
            })?;
        *slot = record.clone();

        self.write_file(&mut file).await
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
