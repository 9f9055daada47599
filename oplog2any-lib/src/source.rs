//! Source log abstraction
//!
//! The tailer only needs two capabilities from the database driver: open a
//! filtered, naturally ordered, tailable cursor over the operation log, and
//! pull entries from it one at a time. [`OplogSource`] and [`OplogCursor`]
//! describe that boundary; the MongoDB driver implements it in
//! [`crate::mongo`].

use crate::error::Result;
use crate::types::{OplogTimestamp, RawLogEntry};
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

/// Selects oplog entries newer than a checkpoint in matching namespaces.
///
/// The namespace filter is evaluated by the source database, so the
/// selector keeps it verbatim and does not validate it. A malformed pattern
/// surfaces as an error when the cursor is opened.
#[derive(Debug, Clone)]
pub struct OplogSelector {
    after: OplogTimestamp,
    namespace_filter: String,
    pattern: OnceLock<Option<Regex>>,
}

impl OplogSelector {
    /// Select entries with `ts > after` whose namespace matches `namespace_filter`
    pub fn new(after: OplogTimestamp, namespace_filter: &str) -> Self {
        Self {
            after,
            namespace_filter: namespace_filter.to_string(),
            pattern: OnceLock::new(),
        }
    }

    /// Exclusive lower bound on entry timestamps
    pub fn after(&self) -> OplogTimestamp {
        self.after
    }

    pub fn namespace_filter(&self) -> &str {
        &self.namespace_filter
    }

    /// Whether `entry` satisfies the selector, for sources that filter in memory.
    ///
    /// Patterns using features the `regex` crate lacks (look-around,
    /// backreferences) match nothing here.
    pub fn matches(&self, entry: &RawLogEntry) -> bool {
        entry.timestamp > self.after
            && self
                .pattern()
                .is_some_and(|pattern| pattern.is_match(&entry.namespace))
    }

    fn pattern(&self) -> Option<&Regex> {
        self.pattern
            .get_or_init(|| match Regex::new(&self.namespace_filter) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(
                        "Namespace filter '{}' cannot be matched in memory: {}",
                        self.namespace_filter, e
                    );
                    None
                }
            })
            .as_ref()
    }
}

impl fmt::Display for OplogSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts > {} and ns =~ /{}/", self.after, self.namespace_filter)
    }
}

/// Per-cursor options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorOptions {
    /// How long [`OplogCursor::next`] waits for a new entry before reporting
    /// [`CursorEvent::Timeout`]; `None` waits indefinitely
    pub idle_timeout: Option<Duration>,
}

impl CursorOptions {
    pub fn with_idle_timeout(idle_timeout: Option<Duration>) -> Self {
        Self { idle_timeout }
    }
}

/// Outcome of polling a tailable cursor
#[derive(Debug, Clone, PartialEq)]
pub enum CursorEvent {
    /// The next matching entry in natural order
    Entry(RawLogEntry),
    /// No new entry arrived within the idle window; the cursor is still usable
    Timeout,
    /// The source closed the cursor without an error; it must be rebuilt
    Closed,
}

/// A tailable cursor over the operation log
#[async_trait]
pub trait OplogCursor: Send {
    /// Wait for the next entry.
    ///
    /// Implementations must be cancel safe: dropping the returned future
    /// must not lose an entry.
    async fn next(&mut self) -> Result<CursorEvent>;

    /// Release the server-side cursor
    async fn close(&mut self) -> Result<()>;
}

/// Opens cursors over an append-only operation log
#[async_trait]
pub trait OplogSource: Send + Sync {
    /// Open a cursor over entries matching `selector`, in natural order
    async fn open_cursor(
        &self,
        selector: &OplogSelector,
        options: CursorOptions,
    ) -> Result<Box<dyn OplogCursor>>;

    /// Human readable location, used in log lines
    fn describe(&self) -> String;
}
