//! Fixed-size worker pool with an atomic claim cursor.
//!
//! Workers share no partitioning: each one claims the next unprocessed index as soon as
//! it finishes its previous task, which balances load when task durations vary.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, TaskError};
use crate::retry::RetryPolicy;
use crate::types::{TaskDescriptor, TaskResult};

/// Shared cursor handing out each index in `[0, total)` exactly once
#[derive(Debug)]
pub(crate) struct ClaimCursor {
    next: AtomicUsize,
    total: usize,
}

impl ClaimCursor {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            total,
        }
    }

    /// Claim the next unprocessed index, or `None` once all are taken
    pub(crate) fn claim(&self) -> Option<usize> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.total).then_some(index)
    }
}

/// A fixed number of concurrent workers executing tasks through a [`RetryPolicy`]
#[derive(Clone, Debug)]
pub struct WorkerPool {
    concurrency: usize,
    retry_policy: RetryPolicy,
    cancel_token: Option<CancellationToken>,
}

impl WorkerPool {
    /// Pool running up to `concurrency` workers
    pub fn new(concurrency: usize, retry_policy: RetryPolicy) -> Self {
        Self {
            concurrency,
            retry_policy,
            cancel_token: None,
        }
    }

    /// Stop starting new tasks once `token` is cancelled
    ///
    /// The token is checked before each claimed task starts. Tasks claimed after
    /// cancellation are recorded as [`TaskError::Cancelled`](crate::TaskError::Cancelled)
    /// without running, so every index still produces a result. Work already in
    /// flight runs to completion.
    #[must_use]
    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel_token = token;
        self
    }

    /// Run every task and hand each result to `on_result`
    ///
    /// Returns the number of workers started, `min(concurrency, tasks.len())`, once
    /// all tasks have produced a result. `on_result` is called synchronously from
    /// whichever worker completed the task, so it must not block and must not rely on
    /// being called from a particular task or thread.
    ///
    /// A task whose work panics fails with [`TaskError::Terminal`]; the other tasks
    /// keep running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pool was built with zero concurrency; no
    /// worker is started in that case.
    ///
    /// # Panics
    ///
    /// A panic raised by `on_result` is resumed on the caller after the remaining
    /// workers are aborted.
    pub async fn run<T, F>(&self, tasks: Vec<TaskDescriptor<T>>, on_result: F) -> Result<usize>
    where
        T: Send + 'static,
        F: Fn(TaskResult<T>) + Send + Sync + 'static,
    {
        if self.concurrency < 1 {
            return Err(Error::config(
                "concurrency must be at least 1",
                "concurrency",
            ));
        }

        let total = tasks.len();
        if total == 0 {
            return Ok(0);
        }

        let workers = self.concurrency.min(total);
        let tasks: Arc<[TaskDescriptor<T>]> = tasks.into();
        let cursor = Arc::new(ClaimCursor::new(total));
        let on_result = Arc::new(on_result);

        tracing::debug!(total, workers, "Starting worker pool");

        let mut join_set = JoinSet::new();
        for worker_id in 0..workers {
            let tasks = Arc::clone(&tasks);
            let cursor = Arc::clone(&cursor);
            let on_result = Arc::clone(&on_result);
            let retry_policy = self.retry_policy.clone();
            let cancel_token = self.cancel_token.clone();

            join_set.spawn(async move {
                let mut processed = 0usize;
                while let Some(index) = cursor.claim() {
                    let descriptor = &tasks[index];

                    let result = if cancel_token.as_ref().is_some_and(|t| t.is_cancelled()) {
                        tracing::debug!(worker_id, index, "Batch cancelled, skipping task");
                        TaskResult::cancelled(index)
                    } else {
                        retry_policy
                            .execute(|| attempt(descriptor))
                            .await
                            .into_task_result(index)
                    };

                    on_result(result);
                    processed += 1;
                }
                tracing::trace!(worker_id, processed, "Worker finished");
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    join_set.abort_all();
                    std::panic::resume_unwind(e.into_panic());
                }
                return Err(Error::Other(format!("worker task aborted: {}", e)));
            }
        }

        Ok(workers)
    }
}

/// One attempt of a task, with a panic in its work turned into a terminal failure
async fn attempt<T>(descriptor: &TaskDescriptor<T>) -> std::result::Result<T, TaskError> {
    match AssertUnwindSafe(async { descriptor.invoke().await })
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(index = descriptor.index(), panic = %message, "Task panicked");
            Err(TaskError::Terminal(format!("task panicked: {}", message)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
