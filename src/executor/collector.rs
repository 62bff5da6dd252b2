//! Index-addressed result slots, each written exactly once.

use crate::types::{BatchSummary, TaskResult};

/// Fixed-size slot array holding one [`TaskResult`] per submitted task
///
/// Slots are addressed by submission index, so completion order never affects
/// the order of the final summary.
#[derive(Debug)]
pub struct ResultCollector<T> {
    slots: Vec<Option<TaskResult<T>>>,
    filled: usize,
}

impl<T> ResultCollector<T> {
    /// Collector with `total` empty slots
    pub fn new(total: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(total).collect(),
            filled: 0,
        }
    }

    /// Number of slots
    pub fn total(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots written so far
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Whether every slot has been written
    pub fn is_full(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Result stored at `index`, if written
    pub fn get(&self, index: usize) -> Option<&TaskResult<T>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Store `result` in the slot at `result.index` and return the stored record
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range or the slot was already written. Either
    /// means an index was claimed twice, which is a bug in the worker pool rather
    /// than a runtime condition.
    pub fn record(&mut self, result: TaskResult<T>) -> &TaskResult<T> {
        let index = result.index;
        let total = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .unwrap_or_else(|| panic!("result index {index} out of range for batch of {total}"));
        assert!(slot.is_none(), "result slot {index} written twice");

        self.filled += 1;
        slot.insert(result)
    }

    /// Aggregate the filled slots into the batch summary
    ///
    /// # Panics
    ///
    /// Panics if any slot is still empty.
    pub fn finalize(self) -> BatchSummary<T> {
        assert!(
            self.is_full(),
            "finalize called with {} of {} results recorded",
            self.filled,
            self.slots.len()
        );
        BatchSummary::from_results(self.slots.into_iter().flatten().collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;

    #[test]
    fn out_of_order_records_finalize_in_index_order() {
        let mut collector = ResultCollector::new(3);
        assert_eq!(collector.total(), 3);

        collector.record(TaskResult::succeeded(2, "c", 1));
        collector.record(TaskResult::failed(0, TaskError::transient("timeout"), 3));
        assert_eq!(collector.filled(), 2);
        assert!(!collector.is_full());
        assert!(collector.get(1).is_none());

        let stored = collector.record(TaskResult::succeeded(1, "b", 2));
        assert_eq!(stored.value, Some("b"));
        assert!(collector.is_full());

        let summary = collector.finalize();
        let indices: Vec<usize> = summary.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 3);
    }

    #[test]
    #[should_panic(expected = "written twice")]
    fn double_write_is_an_invariant_violation() {
        let mut collector = ResultCollector::new(2);
        collector.record(TaskResult::succeeded(1, (), 1));
        collector.record(TaskResult::succeeded(1, (), 1));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_index_panics() {
        let mut collector = ResultCollector::new(1);
        collector.record(TaskResult::succeeded(1, (), 1));
    }

    #[test]
    #[should_panic(expected = "finalize called with 1 of 2")]
    fn finalize_requires_every_slot() {
        let mut collector = ResultCollector::new(2);
        collector.record(TaskResult::succeeded(0, (), 1));
        let _ = collector.finalize();
    }

    #[test]
    fn empty_collector_finalizes_to_empty_summary() {
        let collector = ResultCollector::<()>::new(0);
        assert!(collector.is_full());
        assert_eq!(collector.finalize(), BatchSummary::empty());
    }
}
