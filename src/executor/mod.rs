//! Batch execution -- bounded-concurrency task runner with retry and progress.
//!
//! Split into focused submodules:
//! - [`pool`] - Worker pool and atomic claim cursor
//! - [`collector`] - Index-addressed result slots and summary aggregation
//! - [`progress`] - Progress callback wiring
//!
//! [`BatchExecutor`] is the only piece that knows the whole pipeline. Every run owns
//! its own cursor, slots and counters, so concurrent batches never interfere.

mod collector;
mod pool;
mod progress;


use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::config::{BatchConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::types::{BatchSummary, ProgressEvent, Task, TaskDescriptor, TaskResult};

pub use collector::ResultCollector;
pub use pool::WorkerPool;
pub use progress::{ProgressCallback, ProgressReporter};

/// Options for one batch run
///
/// Defaults: 5 workers, 3 attempts per task, linear 1s/2s/3s backoff, no progress
/// callback, no cancellation.
pub struct BatchOptions<T> {
    /// Requested number of workers; clamped to the number of tasks
    pub concurrency: usize,
    /// Attempts per task, including the first
    pub max_retries: u32,
    /// Backoff between attempts
    pub retry: RetryConfig,
    /// Called once per completed task
    pub on_progress: Option<ProgressCallback<T>>,
    /// Checked before each task starts
    pub cancel_token: Option<CancellationToken>,
}

impl<T> Default for BatchOptions<T> {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

impl<T> Clone for BatchOptions<T> {
    fn clone(&self) -> Self {
        Self {
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            retry: self.retry.clone(),
            on_progress: self.on_progress.clone(),
            cancel_token: self.cancel_token.clone(),
        }
    }
}

impl<T> std::fmt::Debug for BatchOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOptions")
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry", &self.retry)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancel_token", &self.cancel_token)
            .finish()
    }
}

impl<T> BatchOptions<T> {
    /// Options taken from configuration, without callback or cancellation
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            max_retries: config.max_retries,
            retry: config.retry.clone(),
            on_progress: None,
            cancel_token: None,
        }
    }

    /// Set the requested number of workers
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the attempts allowed per task
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff between attempts
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Attach a progress handler
    ///
    /// The handler runs on a worker while the batch's result lock is held: keep it
    /// short and never block in it.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: for<'a> Fn(ProgressEvent<'a, T>) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Stop starting new tasks once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.concurrency < 1 {
            return Err(Error::config(
                format!("concurrency must be at least 1, got {}", self.concurrency),
                "concurrency",
            ));
        }
        if self.max_retries < 1 {
            return Err(Error::config(
                "max_retries must be at least 1 (it counts the first attempt)",
                "max_retries",
            ));
        }
        Ok(())
    }
}

/// Slots and completion counter, mutated together under one lock
struct BatchState<T> {
    collector: ResultCollector<T>,
    progress: ProgressReporter<T>,
}

/// Runs batches of independent tasks with bounded concurrency and retry
#[derive(Debug)]
pub struct BatchExecutor<T> {
    options: BatchOptions<T>,
}

impl<T> BatchExecutor<T>
where
    T: Send + 'static,
{
    /// Executor for the given options
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `concurrency` or `max_retries` is below 1.
    pub fn new(options: BatchOptions<T>) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(self.options.max_retries, &self.options.retry)
    }

    /// Run every task to a terminal outcome and summarize
    ///
    /// Individual task failures are recorded in the summary; they never fail the call.
    pub async fn run(&self, tasks: Vec<Task<T>>) -> Result<BatchSummary<T>> {
        let total = tasks.len();
        if total == 0 {
            tracing::debug!("Empty batch, nothing to run");
            return Ok(BatchSummary::empty());
        }

        let concurrency = self.options.concurrency.min(total);
        tracing::debug!(
            total,
            requested_concurrency = self.options.concurrency,
            concurrency,
            max_retries = self.options.max_retries,
            "Starting batch"
        );

        let descriptors: Vec<TaskDescriptor<T>> = tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| TaskDescriptor::new(index, task))
            .collect();

        let state = Arc::new(Mutex::new(BatchState {
            collector: ResultCollector::new(total),
            progress: ProgressReporter::new(total, self.options.on_progress.clone()),
        }));
        let sink = Arc::clone(&state);

        let workers = WorkerPool::new(concurrency, self.retry_policy())
            .with_cancellation(self.options.cancel_token.clone())
            .run(descriptors, move |result: TaskResult<T>| {
                let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
                let BatchState {
                    collector,
                    progress,
                } = &mut *guard;
                let recorded = collector.record(result);
                progress.report(recorded);
            })
            .await?;

        let state = Arc::try_unwrap(state)
            .map_err(|_| Error::Other("result slots still shared after workers finished".into()))?
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let summary = state.collector.finalize();

        tracing::info!(
            total = summary.total,
            workers,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Batch completed"
        );

        Ok(summary)
    }
}

/// Run `tasks` with `options` and return the summary
///
/// # Errors
///
/// Fails only on invalid options, before any task starts.
///
/// # Example
///
/// ```no_run
/// use upload_batch::{BatchOptions, TaskError, run_batch, task};
///
/// # async fn example() -> upload_batch::Result<()> {
/// let tasks = (0..10)
///     .map(|i| task(move || async move { Ok::<_, TaskError>(i * 2) }))
///     .collect();
///
/// let summary = run_batch(
///     tasks,
///     BatchOptions::default()
///         .with_concurrency(3)
///         .on_progress(|event| println!("{}% done", event.percent)),
/// )
/// .await?;
///
/// println!("{} of {} succeeded", summary.succeeded, summary.total);
/// # Ok(())
/// # }
/// ```
pub async fn run_batch<T>(tasks: Vec<Task<T>>, options: BatchOptions<T>) -> Result<BatchSummary<T>>
where
    T: Send + 'static,
{
    BatchExecutor::new(options)?.run(tasks).await
}

/// Run a single task with default retry settings and return its result
pub async fn run_one<T>(task: Task<T>) -> Result<TaskResult<T>>
where
    T: Send + 'static,
{
    let summary = run_batch(vec![task], BatchOptions::default().with_concurrency(1)).await?;
    summary
        .results
        .into_iter()
        .next()
        .ok_or_else(|| Error::Other("single-task batch produced no result".into()))
}
