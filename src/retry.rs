//! Fixed-delay retry for per-instance fetches
//!
//! Every failure is retried until the attempt budget is spent. Attempts are
//! separated by the same delay each time; a zero delay (see
//! [`RetryConfig::immediate`]) makes retry-exhaustion tests run instantly.
//!
//! # Example
//!
//! ```no_run
//! use study_export::retry::retry_fixed;
//! use study_export::config::RetryConfig;
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! let result = retry_fixed(&config, "wado fetch", |_attempt| async {
//!     Ok::<_, String>(vec![0xFF, 0xD8])
//! })
//! .await;
//! assert!(result.is_ok());
//! # }
//! ```

use crate::config::RetryConfig;
use std::future::Future;

/// The last failure after all attempts were used
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Number of attempts made
    pub attempts: u32,
    /// Error returned by the final attempt
    pub last_error: E,
}

/// Run `operation` until it succeeds or `config.max_attempts` attempts fail.
///
/// The closure receives the 1-based attempt number. A `max_attempts` of zero
/// is treated as one attempt.
pub async fn retry_fixed<F, Fut, T, E>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(label, attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt < max_attempts => {
                tracing::warn!(
                    label,
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = config.delay.as_millis(),
                    "Operation failed, retrying"
                );
                if !config.delay.is_zero() {
                    tokio::time::sleep(config.delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    label,
                    error = %e,
                    attempts = attempt,
                    "Operation failed after all retry attempts exhausted"
                );
                return Err(Exhausted {
                    attempts: attempt,
                    last_error: e,
                });
            }
        }
    }
}
