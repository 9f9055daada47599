use crate::error::{CdcError, Result};
use crate::types::{CheckpointKey, SinkType};
use std::time::Duration;

/// Default number of concurrently running checkpoint/routing tasks
pub const DEFAULT_POOL_CAPACITY: usize = 100;

/// Configuration for an oplog tailer
#[derive(Debug, Clone)]
pub struct Config {
    /// Source MongoDB connection string
    pub source_url: String,

    /// Whether to connect to the source over TLS
    pub tls_enabled: bool,

    /// Accept self-signed or otherwise unverifiable server certificates
    pub tls_allow_invalid_certificates: bool,

    /// Regular expression selecting the namespaces to tail, evaluated by the
    /// server's `$regex` and therefore not validated here
    pub namespace_filter: String,

    /// Free-form tag partitioning checkpoints for the same filter
    pub label: String,

    /// Database used to authenticate when the URL does not name one
    pub auth_database: String,

    /// Database holding the operation log
    pub oplog_database: String,

    /// Operation log collection
    pub oplog_collection: String,

    /// Database holding checkpoint records
    pub checkpoint_database: String,

    /// Collection holding checkpoint records
    pub checkpoint_collection: String,

    /// Keep checkpoints in a local JSON file instead of the checkpoint collection
    pub checkpoint_file: Option<String>,

    /// Maximum number of in-flight checkpoint and routing tasks
    pub pool_capacity: usize,

    /// Idle window of the first cursor; `None` waits for new entries forever
    pub idle_timeout: Option<Duration>,

    /// Idle window of cursors rebuilt after the source closed the previous one
    pub reconnect_poll_timeout: Duration,

    /// Connection timeout
    pub connection_timeout: Duration,

    /// Maximum number of attempts when rebuilding a cursor
    pub max_retry_attempts: u32,

    /// Initial retry delay (will be increased exponentially)
    pub initial_retry_delay: Duration,

    /// Maximum retry delay between attempts
    pub max_retry_delay: Duration,

    /// Retry multiplier for exponential backoff
    pub retry_multiplier: f64,

    /// Maximum total time to spend retrying before giving up
    pub max_retry_duration: Duration,

    /// Whether to add jitter to retry delays
    pub retry_jitter: bool,

    /// Handler receiving change events
    pub sink_type: SinkType,

    /// Endpoint the forwarding handler posts events to
    pub sink_url: String,

    /// Environment tag attached to forwarded events
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            tls_enabled: false,
            tls_allow_invalid_certificates: true,
            namespace_filter: String::new(),
            label: String::new(),
            auth_database: "admin".to_string(),
            oplog_database: "local".to_string(),
            oplog_collection: "oplog.rs".to_string(),
            checkpoint_database: "mongotailer".to_string(),
            checkpoint_collection: "oplogtailerinfo".to_string(),
            checkpoint_file: None,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            idle_timeout: None,
            reconnect_poll_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(30),
            max_retry_attempts: 5,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
            retry_multiplier: 2.0,
            max_retry_duration: Duration::from_secs(300),
            retry_jitter: true,
            sink_type: SinkType::Elasticsearch,
            sink_url: "http://localhost:9527/mongo.oplogs".to_string(),
            environment: "unknown".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Key of the checkpoint record this configuration reads and advances
    pub fn checkpoint_key(&self) -> CheckpointKey {
        CheckpointKey::new(self.namespace_filter.clone(), self.label.clone())
    }
}

/// Builder pattern for creating configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new config builder
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the source MongoDB connection string
    pub fn source_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.source_url = url.into();
        self
    }

    /// Enable/disable TLS towards the source
    pub fn tls_enabled(mut self, enabled: bool) -> Self {
        self.config.tls_enabled = enabled;
        self
    }

    pub fn tls_allow_invalid_certificates(mut self, allow: bool) -> Self {
        self.config.tls_allow_invalid_certificates = allow;
        self
    }

    /// Set the namespace filter regex
    pub fn namespace_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.config.namespace_filter = filter.into();
        self
    }

    /// Set the checkpoint label
    pub fn label<S: Into<String>>(mut self, label: S) -> Self {
        self.config.label = label.into();
        self
    }

    pub fn auth_database<S: Into<String>>(mut self, database: S) -> Self {
        self.config.auth_database = database.into();
        self
    }

    /// Set the database and collection of the operation log
    pub fn oplog_namespace<D: Into<String>, C: Into<String>>(
        mut self,
        database: D,
        collection: C,
    ) -> Self {
        self.config.oplog_database = database.into();
        self.config.oplog_collection = collection.into();
        self
    }

    /// Set the database and collection of the checkpoint records
    pub fn checkpoint_namespace<D: Into<String>, C: Into<String>>(
        mut self,
        database: D,
        collection: C,
    ) -> Self {
        self.config.checkpoint_database = database.into();
        self.config.checkpoint_collection = collection.into();
        self
    }

    /// Persist checkpoints to a JSON file at `path`
    pub fn checkpoint_file<S: Into<String>>(mut self, path: S) -> Self {
        self.config.checkpoint_file = Some(path.into());
        self
    }

    /// Set the admission pool capacity
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.config.pool_capacity = capacity;
        self
    }

    /// Set the idle window of the first cursor
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the idle window of rebuilt cursors
    pub fn reconnect_poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.reconnect_poll_timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set maximum number of retry attempts
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.max_retry_attempts = attempts;
        self
    }

    /// Set initial retry delay
    pub fn initial_retry_delay(mut self, delay: Duration) -> Self {
        self.config.initial_retry_delay = delay;
        self
    }

    /// Set maximum retry delay
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.max_retry_delay = delay;
        self
    }

    /// Set retry multiplier for exponential backoff
    pub fn retry_multiplier(mut self, multiplier: f64) -> Self {
        self.config.retry_multiplier = multiplier;
        self
    }

    /// Set maximum total retry duration
    pub fn max_retry_duration(mut self, duration: Duration) -> Self {
        self.config.max_retry_duration = duration;
        self
    }

    /// Enable/disable jitter for retry delays
    pub fn retry_jitter(mut self, enabled: bool) -> Self {
        self.config.retry_jitter = enabled;
        self
    }

    /// Set the handler type
    pub fn sink_type(mut self, sink_type: SinkType) -> Self {
        self.config.sink_type = sink_type;
        self
    }

    /// Set the forwarding endpoint
    pub fn sink_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.sink_url = url.into();
        self
    }

    /// Set the environment tag
    pub fn environment<S: Into<String>>(mut self, environment: S) -> Self {
        self.config.environment = environment.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        self.validate()?;
        Ok(self.config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        let url = &self.config.source_url;
        if url.is_empty() {
            return Err(CdcError::config("Source connection string is required"));
        }

        if !url.starts_with("mongodb://") && !url.starts_with("mongodb+srv://") {
            return Err(CdcError::config(format!(
                "Source connection string must use the mongodb:// or mongodb+srv:// scheme, got '{}'",
                url
            )));
        }

        if self.config.pool_capacity == 0 {
            return Err(CdcError::config("Pool capacity must be greater than 0"));
        }

        if self.config.reconnect_poll_timeout.is_zero() {
            return Err(CdcError::config(
                "Reconnect poll timeout must be greater than 0",
            ));
        }

        if matches!(self.config.idle_timeout, Some(t) if t.is_zero()) {
            return Err(CdcError::config("Idle timeout must be greater than 0"));
        }

        if self.config.retry_multiplier < 1.0 {
            return Err(CdcError::config("Retry multiplier must be at least 1.0"));
        }

        if self.config.sink_type == SinkType::Elasticsearch && self.config.sink_url.is_empty() {
            return Err(CdcError::config(
                "Sink URL is required for the elasticsearch sink",
            ));
        }

        Ok(())
    }
}
