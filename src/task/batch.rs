use crate::{
    arena::linear::ArenaSpan,
    foundation::core::{PhaseId, TechniqueId},
    task::{
        Task,
        aggregator::{Aggregator, BatchRecord},
    },
};

/// Thread-local accumulator of tasks for one phase.
///
/// A batch buffers up to the aggregator's `batch_capacity` tasks and flushes itself into the
/// aggregator when full. It must be flushed explicitly before it is dropped.
///
/// ```
/// use frameplan::{Aggregator, AggregatorConfig, PhaseId, Scheduler, SchedulerConfig, TechniqueId};
///
/// let scheduler = Scheduler::<u32>::new(SchedulerConfig::default()).unwrap();
/// let aggregator = Aggregator::new(&scheduler, AggregatorConfig::default()).unwrap();
///
/// let mut batch = aggregator.make_batch(PhaseId(0));
/// batch.add(10, TechniqueId(0), 7);
/// batch.flush();
/// assert_eq!(aggregator.len(), 1);
/// ```
pub struct TaskBatch<'a, P> {
    aggregator: &'a Aggregator<P>,
    phase: PhaseId,
    buffer: Option<Vec<Task<P>>>,
}

impl<'a, P> TaskBatch<'a, P> {
    pub(crate) fn new(aggregator: &'a Aggregator<P>, phase: PhaseId) -> Self {
        Self {
            aggregator,
            phase,
            buffer: None,
        }
    }

    /// Phase every task of this batch is submitted to.
    pub fn phase(&self) -> PhaseId {
        self.phase
    }

    /// Tasks added since the last flush.
    pub fn len(&self) -> usize {
        self.buffer.as_ref().map_or(0, Vec::len)
    }

    /// Return `true` when nothing is waiting to be flushed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a task, flushing first if the current buffer is full.
    ///
    /// Never blocks and never fails; arena exhaustion is reported by the next `consolidate`.
    pub fn add(&mut self, priority: u32, technique: TechniqueId, data: P) {
        let cap = self.aggregator.batch_capacity();
        if self.buffer.as_ref().is_some_and(|b| b.len() >= cap) {
            self.flush();
        }
        let aggregator = self.aggregator;
        self.buffer
            .get_or_insert_with(|| aggregator.allocate_batch_buffer())
            .push(Task::new(priority, technique, data));
    }

    /// Hand buffered tasks to the aggregator. A no-op for an empty batch.
    ///
    /// The flushed buffer now belongs to the aggregator; the next `add` starts a new one.
    pub fn flush(&mut self) {
        if let Some(tasks) = self.buffer.take()
            && !tasks.is_empty()
        {
            self.aggregator.push(BatchRecord {
                phase: self.phase,
                tasks,
            });
        }
    }

    /// Charge `bytes` of payload to the scheduler's per-cycle arena budget.
    ///
    /// The arena only does accounting: the returned span names a region of the budget and has
    /// no storage behind it. Payload data itself lives in the task's `P`. Reserving lets callers
    /// whose payloads own heap data (decoded meshes, string tables) count that data against the
    /// cycle, so oversized cycles go through the same overflow recovery as oversized plans.
    pub fn reserve(&self, bytes: usize, align: usize) -> ArenaSpan {
        self.aggregator.reserve(bytes, align)
    }
}

impl<P> Drop for TaskBatch<'_, P> {
    fn drop(&mut self) {
        if self.buffer.is_some() && !std::thread::panicking() {
            panic!(
                "task batch for phase {} dropped with {} unflushed tasks; call flush() first",
                self.phase.0,
                self.len()
            );
        }
    }
}

impl<P> std::fmt::Debug for TaskBatch<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskBatch")
            .field("phase", &self.phase)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/task/batch.rs"]
mod tests;
