use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkType {
    /// Forward events as JSON documents to an Elasticsearch endpoint
    Elasticsearch,
    /// Only log events
    Log,
}

impl fmt::Display for SinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkType::Elasticsearch => write!(f, "elasticsearch"),
            SinkType::Log => write!(f, "log"),
        }
    }
}

/// Ordered oplog timestamp.
///
/// The high 32 bits hold seconds since the Unix epoch and the low 32 bits an
/// ordinal that orders operations within the same second, which is how the
/// MongoDB oplog encodes its `ts` field.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OplogTimestamp(pub u64);

impl OplogTimestamp {
    /// Build a timestamp from its seconds and ordinal components
    pub fn new(seconds: u32, ordinal: u32) -> Self {
        Self(((seconds as u64) << 32) | ordinal as u64)
    }

    /// Timestamp for the given wall-clock second with a zero ordinal
    pub fn from_unix_seconds(seconds: i64) -> Self {
        let clamped = seconds.clamp(0, u32::MAX as i64) as u32;
        Self::new(clamped, 0)
    }

    /// Current wall-clock time encoded as an oplog timestamp
    pub fn now() -> Self {
        Self::from_unix_seconds(Utc::now().timestamp())
    }

    /// Seconds component (the logical clock with the ordinal stripped)
    #[inline]
    pub fn seconds(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Ordinal component within the second
    #[inline]
    pub fn ordinal(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Wall-clock time of the seconds component
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds() as i64, 0)
    }
}

impl fmt::Display for OplogTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seconds(), self.ordinal())
    }
}

impl From<u64> for OplogTimestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Kind of write recorded by an oplog entry.
///
/// Unrecognized operation codes are kept verbatim in [`OperationKind::Unknown`]
/// so that handlers can report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    Command,
    Noop,
    Unknown(String),
}

impl OperationKind {
    /// Map a raw oplog `op` code to its kind
    pub fn from_code(code: &str) -> Self {
        match code {
            "i" => OperationKind::Insert,
            "u" => OperationKind::Update,
            "d" => OperationKind::Delete,
            "c" => OperationKind::Command,
            "n" => OperationKind::Noop,
            other => OperationKind::Unknown(other.to_string()),
        }
    }

    /// The raw oplog code for this kind
    pub fn code(&self) -> &str {
        match self {
            OperationKind::Insert => "i",
            OperationKind::Update => "u",
            OperationKind::Delete => "d",
            OperationKind::Command => "c",
            OperationKind::Noop => "n",
            OperationKind::Unknown(code) => code,
        }
    }

    /// Stable lowercase name, used for log fields and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Command => "command",
            OperationKind::Noop => "noop",
            OperationKind::Unknown(_) => "unknown",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, OperationKind::Unknown(_))
    }
}

impl From<String> for OperationKind {
    fn from(code: String) -> Self {
        OperationKind::from_code(&code)
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        kind.code().to_string()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One entry read from the operation log. Read-only to the tailer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLogEntry {
    /// `ts`: ordered oplog timestamp
    pub timestamp: OplogTimestamp,
    /// `h`: history id (absent on newer servers, then 0)
    pub history_id: i64,
    /// `v`: oplog format version
    pub version: i32,
    /// `op`: raw operation code
    pub operation: String,
    /// `ns`: database-qualified collection name
    pub namespace: String,
    /// `o`: the operation document
    pub object: serde_json::Value,
    /// `o2`: the query document (updates only)
    pub query_object: Option<serde_json::Value>,
}

impl RawLogEntry {
    /// Create an entry with no history id, version 2 and no query object
    pub fn new<O: Into<String>, N: Into<String>>(
        timestamp: OplogTimestamp,
        operation: O,
        namespace: N,
        object: serde_json::Value,
    ) -> Self {
        Self {
            timestamp,
            history_id: 0,
            version: 2,
            operation: operation.into(),
            namespace: namespace.into(),
            object,
            query_object: None,
        }
    }

    pub fn with_query_object(mut self, query_object: serde_json::Value) -> Self {
        self.query_object = Some(query_object);
        self
    }

    pub fn with_history_id(mut self, history_id: i64) -> Self {
        self.history_id = history_id;
        self
    }

    pub fn operation_kind(&self) -> OperationKind {
        OperationKind::from_code(&self.operation)
    }
}

/// Canonical change event handed to an [`OplogHandler`](crate::OplogHandler).
///
/// Derived 1:1 from a [`RawLogEntry`]; the string fields are descriptive
/// renderings, not a serialization contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Seconds part of the oplog timestamp
    pub timestamp: String,
    pub namespace: String,
    /// Rendered query object
    pub id: String,
    /// Rendered operation document
    pub data: String,
    pub operation: OperationKind,
}

impl ChangeEvent {
    /// Raw operation code, including unrecognized ones
    pub fn op_code(&self) -> &str {
        self.operation.code()
    }
}

/// Key identifying a checkpoint record: the namespace filter and a free-form label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub filter_regex: String,
    pub label: String,
}

impl CheckpointKey {
    pub fn new<F: Into<String>, L: Into<String>>(filter_regex: F, label: L) -> Self {
        Self {
            filter_regex: filter_regex.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter=[{}] label=[{}]", self.filter_regex, self.label)
    }
}

/// Persisted read position for one (filter, label) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub filter_regex: String,
    pub label: String,
    pub start_reading_from_time: OplogTimestamp,
}

impl CheckpointRecord {
    pub fn new(key: &CheckpointKey, start_reading_from_time: OplogTimestamp) -> Self {
        Self {
            filter_regex: key.filter_regex.clone(),
            label: key.label.clone(),
            start_reading_from_time,
        }
    }

    pub fn key(&self) -> CheckpointKey {
        CheckpointKey::new(self.filter_regex.clone(), self.label.clone())
    }

    /// Exact match on both key fields
    pub fn matches(&self, key: &CheckpointKey) -> bool {
        self.filter_regex == key.filter_regex && self.label == key.label
    }
}
