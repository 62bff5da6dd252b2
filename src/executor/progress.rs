//! Progress reporting: one callback per completed task.

use std::sync::Arc;

use crate::types::{ProgressEvent, TaskResult, percent};

/// Handler invoked once per completed task
///
/// Runs synchronously on the completing worker while the batch's result lock is
/// held, so it must return quickly and must not block or await anything.
pub type ProgressCallback<T> = Arc<dyn Fn(ProgressEvent<'_, T>) + Send + Sync>;

/// Tracks completions and forwards them to an optional callback
///
/// Without a callback nothing is counted at all.
pub struct ProgressReporter<T> {
    callback: Option<ProgressCallback<T>>,
    completed: usize,
    total: usize,
}

impl<T> ProgressReporter<T> {
    /// Reporter for a batch of `total` tasks
    pub fn new(total: usize, callback: Option<ProgressCallback<T>>) -> Self {
        Self {
            callback,
            completed: 0,
            total,
        }
    }

    /// Tasks reported so far (always 0 without a callback)
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Count `result` as completed and notify the callback
    ///
    /// Must be called right after the result is recorded, under the same lock.
    pub fn report(&mut self, result: &TaskResult<T>) {
        let Some(callback) = &self.callback else {
            return;
        };

        self.completed += 1;
        callback(ProgressEvent {
            completed: self.completed,
            total: self.total,
            percent: percent(self.completed, self.total),
            index: result.index,
            result,
        });
    }
}

impl<T> std::fmt::Debug for ProgressReporter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.callback.is_some())
            .field("completed", &self.completed)
            .field("total", &self.total)
            .finish()
    }
}
