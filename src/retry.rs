//! Automatic retry of a unit of work
//!
//! A unit of work gets a bounded number of extra attempts (one by default)
//! when it fails transiently, that is before the export workflow could even
//! start: the browser session did not come up, or the WebDriver endpoint was
//! unreachable. Classified workflow outcomes are never errors at this layer
//! and are never retried.
//!
//! # Example
//!
//! ```no_run
//! use scopus_harvester::retry::{IsRetryable, with_retry};
//! use scopus_harvester::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum SessionError {
//!     Unreachable,
//!     Rejected,
//! }
//!
//! impl std::fmt::Display for SessionError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for SessionError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, SessionError::Unreachable)
//!     }
//! }
//!
//! # async fn example() -> Result<(), SessionError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async { Ok::<_, SessionError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{BrowserError, Error};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies errors as transient or permanent
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // A browser that never started is worth a second try; anything
            // that failed mid-flow has already been classified
            Error::Browser(BrowserError::SessionStart(_)) => true,
            Error::Browser(_) => false,
            Error::ExternalTool(msg) => msg.contains("timed out") || msg.contains("busy"),
            Error::Database(_) | Error::Sqlx(_) => false,
            Error::Config { .. } => false,
            Error::Batch(_) | Error::Upload(_) => false,
            Error::NotFound(_) => false,
            Error::ShuttingDown => false,
            Error::Serialization(_) => false,
            Error::ApiServerError(_) => false,
            Error::NotSupported(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// Run `operation`, retrying transient failures up to `config.max_attempts` times
///
/// The first retry waits `initial_delay`; each later one multiplies the wait
/// by `backoff_multiplier`, capped at `max_delay`. Returns the first success
/// or the last error.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    "Operation failed transiently, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                delay = Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .map_or(config.max_delay, |next| next.min(config.max_delay));
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(error = %e, attempts = attempt + 1, "Retries exhausted");
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Spread a delay uniformly over `[delay, 2 * delay]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
