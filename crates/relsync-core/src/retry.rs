//! Bounded retry with fixed backoff and cooperative cancellation.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// How often and how patiently a remote operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries, for callers that handle failure themselves.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

/// Why a retried operation gave up.
#[derive(thiserror::Error, Debug)]
pub enum RetryError<E> {
    /// Cancellation was observed before an attempt or during a backoff sleep.
    #[error("operation cancelled")]
    Cancelled,

    /// Every attempt failed; `source` is the last error.
    #[error("failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        source: E,
    },
}

/// Run `op` until it succeeds, attempts run out, or `cancel` fires.
///
/// Cancellation is checked before every attempt and interrupts the backoff
/// sleep; an attempt already in flight is allowed to finish.
///
/// # Errors
///
/// Returns [`RetryError::Cancelled`] if cancelled, otherwise
/// [`RetryError::Exhausted`] carrying the last error.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        attempt += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                error!(what, attempt, "{e}, will not try again");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                warn!(what, attempt, "{e}, retrying in {:?}", policy.backoff);
                if cancel.is_cancelled() {
                    return Err(RetryError::Cancelled);
                }
                tokio::select! {
                    () = cancel.cancelled() => return Err(RetryError::Cancelled),
                    () = tokio::time::sleep(policy.backoff) => {}
                }
            }
        }
    }
}
