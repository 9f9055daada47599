use thiserror::Error;

/// Comprehensive error types for oplog tailing operations
#[derive(Error, Debug)]
pub enum CdcError {
    /// MongoDB driver errors (connection, cursor, checkpoint collection)
    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// HTTP transport errors raised by forwarding handlers
    #[cfg(feature = "elasticsearch")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// More than one checkpoint document exists for a (filter, label) key.
    /// This is data corruption and has to be fixed by an operator.
    #[error(
        "Found {count} checkpoint records for filter [{filter_regex}] and label [{label}]; \
         there should only be one record per filter and label, please correct and restart"
    )]
    CheckpointConflict {
        filter_regex: String,
        label: String,
        count: u64,
    },

    /// Checkpoint read/write errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Tailable cursor errors
    #[error("Cursor error: {0}")]
    Cursor(String),

    /// Malformed oplog entries
    #[error("Protocol parsing error: {0}")]
    Protocol(String),

    /// Handler (event consumer) errors
    #[error("Handler error: {0}")]
    Handler(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("CDC error: {0}")]
    Generic(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Unsupported operation errors
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl CdcError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        CdcError::Config(msg.into())
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        CdcError::Connection(msg.into())
    }

    /// Create a new checkpoint error
    pub fn checkpoint<S: Into<String>>(msg: S) -> Self {
        CdcError::Checkpoint(msg.into())
    }

    /// Create a new cursor error
    pub fn cursor<S: Into<String>>(msg: S) -> Self {
        CdcError::Cursor(msg.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        CdcError::Protocol(msg.into())
    }

    /// Create a new handler error
    pub fn handler<S: Into<String>>(msg: S) -> Self {
        CdcError::Handler(msg.into())
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        CdcError::Generic(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        CdcError::Timeout(msg.into())
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        CdcError::Unsupported(msg.into())
    }

    /// Whether the error means the checkpoint collection holds duplicate records
    pub fn is_checkpoint_conflict(&self) -> bool {
        matches!(self, CdcError::CheckpointConflict { .. })
    }
}

/// Result type for CDC operations
pub type Result<T> = std::result::Result<T, CdcError>;
