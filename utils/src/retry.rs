//! Bounded retry with exponential backoff.
//!
//! Every retried operation in the workspace goes through [`retry`] or
//! [`retry_cancellable`]: RPC attempts against a node, whole sign-and-wait
//! sequences, destination submissions. Attempts re-run the same operation
//! unchanged.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::cancel::{CancelToken, Cancelled};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 16_000;

/// How many times to try, and how long to wait between tries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: initial_backoff.as_millis() as u64,
            max_backoff_ms: max_backoff.as_millis() as u64,
        }
    }

    /// Retry immediately, `max_attempts` times in total.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before attempt `attempt + 1`, doubling from the initial backoff.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

/// Run `op` until it succeeds, fails with an error `should_retry` rejects,
/// or the policy's attempts are used up. `op` receives the 1-based attempt
/// number. The last error is returned.
pub async fn retry<T, E, F, Fut, R>(policy: &RetryPolicy, should_retry: R, op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
    E: Display,
{
    run(policy, None, should_retry, op, |last| last).await
}

/// [`retry`], but a cancelled `cancel` cuts the backoff short and the call
/// fails with [`Cancelled`] instead of trying again.
pub async fn retry_cancellable<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    should_retry: R,
    op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
    E: Display + From<Cancelled>,
{
    run(policy, Some(cancel), should_retry, op, |_| E::from(Cancelled)).await
}

async fn run<T, E, F, Fut, R, C>(
    policy: &RetryPolicy,
    cancel: Option<&CancelToken>,
    mut should_retry: R,
    mut op: F,
    on_cancel: C,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
    C: FnOnce(E) -> E,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && should_retry(&e) => {
                let delay = policy.backoff(attempt);
                tracing::debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                if let Some(cancel) = cancel {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(on_cancel(e)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                } else {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
