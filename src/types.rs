//! Core types for upload-batch

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::error::TaskError;

/// Future produced by one invocation of a unit of work
pub type WorkFuture<T> = BoxFuture<'static, std::result::Result<T, TaskError>>;

/// A unit of work: callable repeatedly, once per attempt
pub type Work<T> = Arc<dyn Fn() -> WorkFuture<T> + Send + Sync>;

/// A unit of work as submitted by the caller
///
/// Build one with [`task`]. The closure is invoked once per attempt, so it must
/// produce a fresh future every time it is called.
pub struct Task<T> {
    work: Work<T>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            work: Arc::clone(&self.work),
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

/// Wrap an async closure as a [`Task`]
///
/// ```
/// use upload_batch::{TaskError, task};
///
/// let t = task(|| async { Ok::<_, TaskError>("https://img.example.com/file/abc.png") });
/// # let _ = t;
/// ```
pub fn task<T, F, Fut>(work: F) -> Task<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, TaskError>> + Send + 'static,
{
    Task {
        work: Arc::new(move || work().boxed()),
    }
}

/// A task bound to its submission index
///
/// Created once per submitted unit at batch start and never modified afterwards.
pub struct TaskDescriptor<T> {
    index: usize,
    work: Work<T>,
}

impl<T> TaskDescriptor<T> {
    /// Bind `task` to position `index` of the batch
    pub fn new(index: usize, task: Task<T>) -> Self {
        Self {
            index,
            work: task.work,
        }
    }

    /// Zero-based submission index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Start one attempt of the work
    pub fn invoke(&self) -> WorkFuture<T> {
        (self.work)()
    }
}

impl<T> std::fmt::Debug for TaskDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// What a single run through the retry policy produced
///
/// `attempt` is the number of the attempt that produced `outcome` (1-based), which is
/// also the total number of attempts made.
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptOutcome<T> {
    /// Attempt number that produced the outcome
    pub attempt: u32,
    /// The value of the successful attempt, or the last error
    pub outcome: std::result::Result<T, TaskError>,
}

impl<T> AttemptOutcome<T> {
    /// Whether the work eventually succeeded
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Payload of the successful attempt
    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// Error of the last failed attempt
    pub fn error(&self) -> Option<&TaskError> {
        self.outcome.as_ref().err()
    }

    /// Convert into the record stored for submission slot `index`
    pub fn into_task_result(self, index: usize) -> TaskResult<T> {
        let attempts = self.attempt;
        match self.outcome {
            Ok(value) => TaskResult::succeeded(index, value, attempts),
            Err(error) => TaskResult::failed(index, error, attempts),
        }
    }
}

/// Terminal record of one task, stored in submission order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult<T> {
    /// Submission index
    pub index: usize,
    /// Whether the task succeeded
    pub success: bool,
    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    /// Last error on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Attempts made (0 when the task never started)
    pub attempts: u32,
}

impl<T> TaskResult<T> {
    /// A successful result
    pub fn succeeded(index: usize, value: T, attempts: u32) -> Self {
        Self {
            index,
            success: true,
            value: Some(value),
            error: None,
            attempts,
        }
    }

    /// A failed result carrying the last error
    pub fn failed(index: usize, error: TaskError, attempts: u32) -> Self {
        Self {
            index,
            success: false,
            value: None,
            error: Some(error),
            attempts,
        }
    }

    /// A task that was never started because the batch was cancelled
    pub fn cancelled(index: usize) -> Self {
        Self::failed(index, TaskError::Cancelled, 0)
    }
}

/// Progress notification for one completed task
///
/// Emitted in completion order, so `index` values arrive out of order while
/// `completed` counts up by one on every event.
#[derive(Debug, Serialize)]
pub struct ProgressEvent<'a, T> {
    /// Tasks completed so far, including this one
    pub completed: usize,
    /// Tasks in the batch
    pub total: usize,
    /// `completed / total` as a rounded percentage (0-100)
    pub percent: u8,
    /// Submission index of the task that just completed
    pub index: usize,
    /// The result that was just recorded
    pub result: &'a TaskResult<T>,
}

/// Round `completed / total` to a whole percentage, halves rounding up
pub(crate) fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let scaled = (completed as u128 * 200 + total as u128) / (total as u128 * 2);
    scaled.min(100) as u8
}

/// Final state of a batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary<T> {
    /// One result per submitted task, in submission order
    pub results: Vec<TaskResult<T>>,
    /// Count of successful results
    pub succeeded: usize,
    /// Count of failed results
    pub failed: usize,
    /// Tasks submitted
    pub total: usize,
}

impl<T> BatchSummary<T> {
    /// Summary of a batch with no tasks
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            succeeded: 0,
            failed: 0,
            total: 0,
        }
    }

    /// Aggregate counts over results already in submission order
    pub fn from_results(results: Vec<TaskResult<T>>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let total = results.len();
        Self {
            results,
            succeeded,
            failed: total - succeeded,
            total,
        }
    }

    /// Whether every task succeeded (true for an empty batch)
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Submission indices of failed tasks, ascending
    ///
    /// Callers resubmit the payloads at these positions to retry only the failures.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.index)
            .collect()
    }

    /// Payloads of successful tasks, in submission order
    pub fn successes(&self) -> impl Iterator<Item = &T> {
        self.results.iter().filter_map(|r| r.value.as_ref())
    }
}
