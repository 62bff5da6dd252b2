//! Retry logic with linear backoff
//!
//! Each unit of work is driven through a small state machine:
//! `Pending -> Attempting(1) -> ... -> Attempting(n) -> Succeeded | Failed`.
//! Between attempts the task is suspended on an async timer, so a waiting task
//! never blocks the other workers of its pool.
//!
//! # Example
//!
//! ```no_run
//! use upload_batch::retry::RetryPolicy;
//! use upload_batch::TaskError;
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(3);
//! let outcome = policy
//!     .execute(|| async { Ok::<_, TaskError>("https://img.example.com/file/abc.png") })
//!     .await;
//! assert!(outcome.is_ok());
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, TaskError};
use crate::types::AttemptOutcome;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset) should return `true`.
/// Known-bad input (validation failures, rejected payloads) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TaskError {
    fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Transient(_))
    }
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
            Error::Config { .. } | Error::Other(_) => false,
        }
    }
}

/// Lifecycle of one task inside the retry policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Not started yet
    Pending,
    /// Attempt `n` (1-based) is running or about to run
    Attempting(u32),
    /// An attempt succeeded
    Succeeded,
    /// Attempts exhausted, or a non-retryable error was returned
    Failed,
}

impl TaskState {
    /// Move on to the next attempt. Terminal states stay where they are.
    pub fn advance(self) -> Self {
        match self {
            TaskState::Pending => TaskState::Attempting(1),
            TaskState::Attempting(n) => TaskState::Attempting(n + 1),
            terminal => terminal,
        }
    }

    /// Number of the current attempt, 0 outside of [`TaskState::Attempting`]
    pub fn attempt(&self) -> u32 {
        match self {
            TaskState::Attempting(n) => *n,
            _ => 0,
        }
    }

    /// Whether no further attempts will be made
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Bounded retry with linear backoff
///
/// After failed attempt `n` the policy waits `base_delay * n` before attempt `n + 1`,
/// so the default schedule is 1s, 2s, 3s, ...
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
    jitter: bool,
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` attempts with the default 1 second delay unit
    ///
    /// `max_attempts` is raised to 1 if zero is given; callers that want zero to be
    /// an error validate it first (see [`BatchConfig::validate`](crate::config::BatchConfig::validate)).
    pub fn new(max_attempts: u32) -> Self {
        Self::from_config(max_attempts, &RetryConfig::default())
    }

    /// Policy allowing `max_attempts` attempts with delays taken from `config`
    pub fn from_config(max_attempts: u32, config: &RetryConfig) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter: config.jitter,
        }
    }

    /// Replace the delay unit
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Attempts allowed per task, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt `attempt`, before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(attempt);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Run `work` until it succeeds, fails terminally, or runs out of attempts
    pub async fn execute<T, F, Fut>(&self, work: F) -> AttemptOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, TaskError>>,
    {
        let (attempt, outcome) = self.drive(work).await;
        AttemptOutcome { attempt, outcome }
    }

    /// Drive the state machine for any retry-classifiable error type.
    /// Returns the final attempt number alongside the outcome.
    async fn drive<T, E, F, Fut>(&self, mut work: F) -> (u32, std::result::Result<T, E>)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: IsRetryable + std::fmt::Display,
    {
        let mut state = TaskState::Pending;

        loop {
            state = state.advance();
            let attempt = state.attempt();

            match work().await {
                Ok(value) => {
                    state = TaskState::Succeeded;
                    if attempt > 1 {
                        tracing::info!(attempts = attempt, ?state, "Operation succeeded after retry");
                    }
                    return (attempt, Ok(value));
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    let delay = if self.jitter { add_jitter(delay) } else { delay };

                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis(),
                        "Operation failed, retrying"
                    );

                    // Suspends only this task until its next attempt is due
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    state = TaskState::Failed;
                    if e.is_retryable() {
                        tracing::error!(
                            error = %e,
                            attempts = attempt,
                            ?state,
                            "Operation failed after all retry attempts exhausted"
                        );
                    } else {
                        tracing::error!(
                            error = %e,
                            attempts = attempt,
                            ?state,
                            "Operation failed with non-retryable error"
                        );
                    }
                    return (attempt, Err(e));
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Execute an async operation with the linear backoff of `policy`
///
/// Works with any error type that implements [`IsRetryable`], including
/// the crate-level [`Error`].
///
/// # Returns
///
/// Returns the successful result or the last error after all attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    policy.drive(operation).await.1
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
