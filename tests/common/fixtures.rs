//! Task and option fixtures shared by the integration tests

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use upload_batch::{BatchOptions, RetryConfig, Task, TaskError, task};

/// How a fixture task behaves across attempts
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// Succeeds on the first attempt
    Succeed,
    /// Fails with a transient error this many times, then succeeds
    FailThenSucceed(u32),
    /// Always fails with a transient error
    AlwaysFail,
    /// Fails with a terminal error
    Reject,
}

/// A task returning its own index, plus a counter of how often it was invoked
pub fn scripted(index: usize, behavior: Behavior, work: Duration) -> (Task<usize>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let t = task(move || {
        let counter = Arc::clone(&counter);
        async move {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(work).await;
            match behavior {
                Behavior::Succeed => Ok(index),
                Behavior::FailThenSucceed(k) if attempt > k => Ok(index),
                Behavior::FailThenSucceed(_) | Behavior::AlwaysFail => Err(TaskError::transient(
                    format!("task {index} attempt {attempt}: connection reset"),
                )),
                Behavior::Reject => Err(TaskError::terminal(format!("task {index} is invalid"))),
            }
        }
    });
    (t, calls)
}

/// Options with millisecond backoff so retry-heavy tests stay quick
pub fn quick_options<T>(concurrency: usize, max_retries: u32) -> BatchOptions<T> {
    BatchOptions::default()
        .with_concurrency(concurrency)
        .with_max_retries(max_retries)
        .with_retry(RetryConfig {
            base_delay: Duration::from_millis(2),
            ..RetryConfig::default()
        })
}
