use std::mem::size_of;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::{
    arena::{
        linear::{ArenaSpan, LinearArena},
        shared::SharedArena,
    },
    foundation::{
        core::{CACHE_LINE_SIZE, CacheAligned, PhaseId},
        error::{FrameplanError, FrameplanResult},
    },
    schedule::plan::Scheduler,
    task::{Task, batch::TaskBatch},
};

/// What the aggregator does when a flush lands beyond its capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Flag overflow and rewind the slot counter to zero. The whole cycle is discarded by the
    /// next `consolidate`, including batches recorded before the overflow.
    #[default]
    DropCycle,
    /// Flag overflow and keep every batch recorded below capacity; only out-of-range batches
    /// are dropped and counted. `consolidate` plans the kept batches without a recovery and
    /// reports the drops in its stats.
    Saturate,
}

/// Aggregator sizing and overflow behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregatorConfig {
    /// Maximum number of flushed batches one cycle can hold.
    pub capacity: u32,
    /// Maximum number of tasks a batch buffers before flushing itself.
    pub batch_capacity: u32,
    /// Behaviour on slot exhaustion.
    pub overflow_policy: OverflowPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            batch_capacity: 1024,
            overflow_policy: OverflowPolicy::DropCycle,
        }
    }
}

impl AggregatorConfig {
    /// Check that capacities are non-zero.
    pub fn validate(&self) -> FrameplanResult<()> {
        if self.capacity == 0 {
            return Err(FrameplanError::validation("aggregator capacity must be > 0"));
        }
        if self.batch_capacity == 0 {
            return Err(FrameplanError::validation(
                "aggregator batch_capacity must be > 0",
            ));
        }
        Ok(())
    }
}

pub(crate) struct BatchRecord<P> {
    pub(crate) phase: PhaseId,
    pub(crate) tasks: Vec<Task<P>>,
}

/// Bounded many-producer collection point for flushed [`TaskBatch`]es.
///
/// Each flush reserves a slot with a single `fetch_add` on a cache-aligned counter; the slot is
/// then written only by the thread that won that index. Consolidation and [`Aggregator::reset`]
/// take `&mut self`, so no batch can be alive while they run.
pub struct Aggregator<P> {
    arena: Arc<SharedArena>,
    config: AggregatorConfig,
    count: CacheAligned<AtomicU32>,
    overflow: AtomicBool,
    dropped_batches: AtomicU32,
    dropped_tasks: AtomicU64,
    slots: Box<[Mutex<Option<BatchRecord<P>>>]>,
}

impl<P> Aggregator<P> {
    /// Create an aggregator bound to `scheduler`'s arena.
    pub fn new(scheduler: &Scheduler<P>, config: AggregatorConfig) -> FrameplanResult<Self> {
        config.validate()?;
        let slots = (0..config.capacity).map(|_| Mutex::new(None)).collect();
        Ok(Self {
            arena: Arc::clone(scheduler.shared_arena()),
            config,
            count: CacheAligned::new(AtomicU32::new(0)),
            overflow: AtomicBool::new(false),
            dropped_batches: AtomicU32::new(0),
            dropped_tasks: AtomicU64::new(0),
            slots,
        })
    }

    /// Start an empty batch for `phase`. Does not allocate.
    pub fn make_batch(&self, phase: PhaseId) -> TaskBatch<'_, P> {
        TaskBatch::new(self, phase)
    }

    /// Bind to a different scheduler.
    ///
    /// # Panics
    ///
    /// Panics if batches from the current cycle are still recorded.
    pub fn rebind(&mut self, scheduler: &Scheduler<P>) {
        assert!(
            self.is_empty() && !self.overflowed(),
            "cannot rebind an aggregator holding {} outstanding batches",
            self.len()
        );
        self.arena = Arc::clone(scheduler.shared_arena());
    }

    /// Return `true` if this aggregator allocates from `scheduler`'s arena.
    pub fn is_bound_to(&self, scheduler: &Scheduler<P>) -> bool {
        Arc::ptr_eq(&self.arena, scheduler.shared_arena())
    }

    /// Configuration the aggregator was built with.
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Behaviour on slot exhaustion.
    pub fn policy(&self) -> OverflowPolicy {
        self.config.overflow_policy
    }

    /// Maximum number of batches per cycle.
    pub fn capacity(&self) -> u32 {
        self.config.capacity
    }

    /// Number of recorded batches.
    pub fn len(&self) -> u32 {
        self.count.load(Ordering::Acquire).min(self.config.capacity)
    }

    /// Return `true` when no batch is recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return `true` once a flush has landed beyond capacity in this cycle.
    pub fn overflowed(&self) -> bool {
        self.overflow.load(Ordering::Acquire)
    }

    /// Batches rejected for lack of slots this cycle.
    pub fn dropped_batches(&self) -> u32 {
        self.dropped_batches.load(Ordering::Relaxed)
    }

    /// Tasks inside rejected batches this cycle.
    pub fn dropped_tasks(&self) -> u64 {
        self.dropped_tasks.load(Ordering::Relaxed)
    }

    /// Clear every slot, the counter and the overflow state.
    pub fn reset(&mut self) {
        let touched = if *self.overflow.get_mut() {
            self.slots.len()
        } else {
            (*self.count.get_mut() as usize).min(self.slots.len())
        };
        for slot in &mut self.slots[..touched] {
            *slot.get_mut() = None;
        }
        *self.count.get_mut() = 0;
        *self.overflow.get_mut() = false;
        *self.dropped_batches.get_mut() = 0;
        *self.dropped_tasks.get_mut() = 0;
    }

    pub(crate) fn batch_capacity(&self) -> usize {
        self.config.batch_capacity as usize
    }

    /// Fresh task buffer for a batch, charged to the scheduler arena.
    pub(crate) fn allocate_batch_buffer(&self) -> Vec<Task<P>> {
        let cap = self.batch_capacity();
        let bytes = LinearArena::calc_size(cap.saturating_mul(size_of::<Task<P>>()));
        let _span = self.arena.allocate_or_flag(bytes, CACHE_LINE_SIZE);
        Vec::with_capacity(cap)
    }

    pub(crate) fn reserve(&self, bytes: usize, align: usize) -> ArenaSpan {
        self.arena.allocate_or_flag(bytes, align)
    }

    /// Record a flushed batch. Called from [`TaskBatch::flush`].
    pub(crate) fn push(&self, record: BatchRecord<P>) {
        let idx = self.count.fetch_add(1, Ordering::AcqRel);
        if let Some(slot) = self.slots.get(idx as usize) {
            *slot.lock() = Some(record);
            return;
        }

        self.dropped_batches.fetch_add(1, Ordering::Relaxed);
        self.dropped_tasks
            .fetch_add(record.tasks.len() as u64, Ordering::Relaxed);
        if !self.overflow.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                capacity = self.config.capacity,
                policy = ?self.config.overflow_policy,
                "aggregator out of slots, flagging overflow for this cycle"
            );
        }
        match self.config.overflow_policy {
            OverflowPolicy::DropCycle => self.count.store(0, Ordering::Release),
            OverflowPolicy::Saturate => {
                self.count.fetch_min(self.config.capacity, Ordering::AcqRel);
            }
        }
    }

    /// Recorded batches in slot order.
    pub(crate) fn records(&mut self) -> impl Iterator<Item = &BatchRecord<P>> + '_ {
        let len = self.len() as usize;
        self.slots[..len]
            .iter_mut()
            .filter_map(|s| s.get_mut().as_ref())
    }

    /// Move recorded batches out in slot order, leaving their slots empty.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = BatchRecord<P>> + '_ {
        let len = self.len() as usize;
        self.slots[..len]
            .iter_mut()
            .filter_map(|s| s.get_mut().take())
    }
}

impl<P> std::fmt::Debug for Aggregator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("overflowed", &self.overflowed())
            .field("dropped_batches", &self.dropped_batches())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/task/aggregator.rs"]
mod tests;
