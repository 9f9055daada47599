//! Cursor reopen retry logic with exponential backoff
//!
//! When the source closes a tailable cursor the tailer rebuilds it from the
//! current checkpoint. Opening can fail transiently (primary stepdown, network
//! blip), so attempts are retried with a bounded exponential backoff.

use crate::config::Config;
use crate::error::{CdcError, Result};
use crate::source::{CursorOptions, OplogCursor, OplogSelector, OplogSource};
use backoff::backoff::Backoff;
use backoff::future::retry_notify;
use backoff::{Error as BackoffError, ExponentialBackoff};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Configuration for retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_duration: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RetryConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            initial_delay: config.initial_retry_delay,
            max_delay: config.max_retry_delay,
            multiplier: config.retry_multiplier,
            max_duration: config.max_retry_duration,
            jitter: config.retry_jitter,
        }
    }
}

impl RetryConfig {
    /// Create an exponential backoff policy from retry configuration
    pub fn to_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            randomization_factor: if self.jitter { 0.3 } else { 0.0 },
            multiplier: self.multiplier,
            max_interval: self.max_delay,
            max_elapsed_time: Some(self.max_duration),
            ..Default::default()
        };

        backoff.reset();
        backoff
    }
}

/// Open a cursor on `source`, retrying failed attempts with exponential backoff.
///
/// Gives up with the last error after `max_attempts` attempts (0 means no
/// attempt limit) or once `max_duration` has elapsed.
pub async fn open_cursor_with_retry(
    source: &dyn OplogSource,
    selector: &OplogSelector,
    options: CursorOptions,
    config: &RetryConfig,
) -> Result<Box<dyn OplogCursor>> {
    let start_time = Instant::now();
    let attempts = AtomicU32::new(0);
    let attempts_ref = &attempts;
    let max_attempts = config.max_attempts;

    let operation = move || async move {
        let attempt = attempts_ref.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Opening oplog cursor (attempt {})", attempt);

        match source.open_cursor(selector, options).await {
            Ok(cursor) => Ok(cursor),
            Err(e) if max_attempts > 0 && attempt >= max_attempts => {
                error!("Giving up opening oplog cursor after {} attempts", attempt);
                Err(BackoffError::Permanent(e))
            }
            Err(e) => Err(BackoffError::Transient {
                err: e,
                retry_after: None,
            }),
        }
    };

    let notify = |err: CdcError, delay: Duration| {
        warn!(
            "Failed to open oplog cursor on {}: {}; retrying in {:?}",
            source.describe(),
            err,
            delay
        );
    };

    let result = retry_notify(config.to_backoff(), operation, notify).await;

    let elapsed = start_time.elapsed();
    let attempts = attempts.load(Ordering::Relaxed);
    match &result {
        Ok(_) if attempts > 1 => info!(
            "Oplog cursor opened after {} attempts in {:?}",
            attempts, elapsed
        ),
        Ok(_) => {}
        Err(e) => error!(
            "Opening oplog cursor failed after {:?} with error: {}",
            elapsed, e
        ),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CursorEvent;
    use crate::types::OplogTimestamp;
    use async_trait::async_trait;

    struct EmptyCursor;

    #[async_trait]
    impl OplogCursor for EmptyCursor {
        async fn next(&mut self) -> Result<CursorEvent> {
            Ok(CursorEvent::Closed)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Fails the first `failures` opens
    struct FlakySource {
        failures: u32,
        opens: AtomicU32,
    }

    #[async_trait]
    impl OplogSource for FlakySource {
        async fn open_cursor(
            &self,
            _selector: &OplogSelector,
            _options: CursorOptions,
        ) -> Result<Box<dyn OplogCursor>> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(CdcError::cursor("not primary"))
            } else {
                Ok(Box::new(EmptyCursor))
            }
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            max_duration: Duration::from_secs(5),
            jitter: false,
        }
    }

    #[test]
    fn test_retry_config_from_config() {
        let config = Config::builder()
            .source_url("mongodb://localhost")
            .max_retry_attempts(3)
            .initial_retry_delay(Duration::from_millis(250))
            .retry_jitter(false)
            .build()
            .unwrap();
        let retry = RetryConfig::from(&config);
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(250));

        let backoff = retry.to_backoff();
        assert_eq!(backoff.randomization_factor, 0.0);
        assert_eq!(backoff.current_interval, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_open_succeeds_after_transient_failures() {
        let source = FlakySource {
            failures: 2,
            opens: AtomicU32::new(0),
        };
        let selector = OplogSelector::new(OplogTimestamp(0), "");

        let result =
            open_cursor_with_retry(&source, &selector, CursorOptions::default(), &fast_config(5))
                .await;
        assert!(result.is_ok());
        assert_eq!(source.opens.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_open_gives_up_after_max_attempts() {
        let source = FlakySource {
            failures: u32::MAX,
            opens: AtomicU32::new(0),
        };
        let selector = OplogSelector::new(OplogTimestamp(0), "");

        let result =
            open_cursor_with_retry(&source, &selector, CursorOptions::default(), &fast_config(3))
                .await;
        assert!(matches!(result, Err(CdcError::Cursor(_))));
        assert_eq!(source.opens.load(Ordering::SeqCst), 3);
    }
}
