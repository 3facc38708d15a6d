use std::mem::size_of;
use std::sync::Arc;

use rayon::slice::ParallelSliceMut;

use crate::{
    arena::{
        linear::{ArenaSpan, LinearArena},
        shared::SharedArena,
    },
    foundation::{
        core::{CACHE_LINE_SIZE, PhaseId},
        error::{FrameplanError, FrameplanResult},
    },
    phase::table::PhaseTable,
    task::{
        Task,
        aggregator::{Aggregator, OverflowPolicy},
    },
};

/// Scheduler sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Arena budget per cycle in bytes; a non-zero multiple of the cache line size.
    pub arena_bytes: usize,
    /// Sorted phases with at least this many tasks are sorted on the rayon pool.
    pub parallel_sort_threshold: usize,
    /// Upper bound on overflow recoveries inside one `consolidate` call.
    pub max_overflow_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            arena_bytes: 16 * 1024 * 1024,
            parallel_sort_threshold: 16 * 1024,
            max_overflow_retries: 4,
        }
    }
}

impl SchedulerConfig {
    /// Check the arena budget and retry bound.
    pub fn validate(&self) -> FrameplanResult<()> {
        if self.arena_bytes == 0 || !self.arena_bytes.is_multiple_of(CACHE_LINE_SIZE) {
            return Err(FrameplanError::validation(format!(
                "scheduler arena_bytes must be a non-zero multiple of {CACHE_LINE_SIZE}, got {}",
                self.arena_bytes
            )));
        }
        if self.max_overflow_retries == 0 {
            return Err(FrameplanError::validation(
                "scheduler max_overflow_retries must be >= 1",
            ));
        }
        Ok(())
    }
}

/// Summary of the last successful `consolidate`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConsolidateStats {
    /// Tasks placed into the plan.
    pub tasks: usize,
    /// Batches read from the aggregator.
    pub batches: usize,
    /// Overflow recoveries performed before the plan fit.
    pub overflow_recoveries: u32,
    /// Batches the aggregator rejected for lack of slots, summed over every attempt.
    pub dropped_batches: u32,
    /// Tasks inside those rejected batches.
    pub dropped_tasks: u64,
    /// Arena bytes in use once the plan was built.
    pub arena_bytes_used: usize,
}

/// Single-threaded consolidator and executor of one cycle's tasks.
///
/// Owns the cycle arena. Producers submit through an [`Aggregator`] bound to this scheduler;
/// [`Scheduler::consolidate`] turns the recorded batches into one contiguous task vector per
/// phase, and `execute` dispatches them.
pub struct Scheduler<P> {
    config: SchedulerConfig,
    arena: Arc<SharedArena>,
    phase_tasks: Vec<Vec<Task<P>>>,
    stats: ConsolidateStats,
}

impl<P> Scheduler<P> {
    /// Create a scheduler with a fresh arena.
    pub fn new(config: SchedulerConfig) -> FrameplanResult<Self> {
        config.validate()?;
        let arena = LinearArena::new(config.arena_bytes)?;
        Ok(Self {
            config,
            arena: Arc::new(SharedArena::new(arena)),
            phase_tasks: Vec::new(),
            stats: ConsolidateStats::default(),
        })
    }

    /// Configuration the scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The cycle arena.
    pub fn arena(&self) -> &LinearArena {
        self.arena.arena()
    }

    /// Return `true` once an allocation ran the arena dry in this cycle.
    pub fn overflowed(&self) -> bool {
        self.arena.overflowed()
    }

    /// Statistics of the last successful consolidation.
    pub fn stats(&self) -> ConsolidateStats {
        self.stats
    }

    /// Consolidated tasks of `phase`, or `None` if the phase was not part of the last plan.
    pub fn phase_tasks(&self, phase: PhaseId) -> Option<&[Task<P>]> {
        self.phase_tasks.get(phase.index()).map(Vec::as_slice)
    }

    /// Number of phases in the current plan.
    pub fn phase_count(&self) -> usize {
        self.phase_tasks.len()
    }

    /// Tasks across all phases of the current plan.
    pub fn total_tasks(&self) -> usize {
        self.phase_tasks.iter().map(Vec::len).sum()
    }

    /// Charge `bytes` to the arena budget without ever failing at the call site.
    ///
    /// The span is accounting only; it has no storage behind it (see [`ArenaSpan`]).
    ///
    /// On exhaustion the scheduler flags overflow, rewinds the arena and retries once; the next
    /// `consolidate` runs the overflow recovery.
    pub fn allocate(&self, bytes: usize, align: usize) -> ArenaSpan {
        self.arena.allocate_or_flag(bytes, align)
    }

    /// Rewind the arena and drop the current plan, starting a new cycle.
    ///
    /// Task vectors keep their capacity for the next cycle.
    pub fn reset(&mut self) {
        self.arena.reset();
        for tasks in &mut self.phase_tasks {
            tasks.clear();
        }
        self.stats = ConsolidateStats::default();
    }

    /// Tear the scheduler down and hand back its arena.
    ///
    /// Fails if an aggregator is still bound to this scheduler.
    pub fn deinitialize(self) -> FrameplanResult<LinearArena> {
        Arc::try_unwrap(self.arena)
            .map(SharedArena::into_arena)
            .map_err(|shared| {
                FrameplanError::validation(format!(
                    "scheduler arena is still shared with {} aggregator(s)",
                    Arc::strong_count(&shared) - 1
                ))
            })
    }

    pub(crate) fn shared_arena(&self) -> &Arc<SharedArena> {
        &self.arena
    }

    fn reset_plan(&mut self, phases: usize) {
        self.phase_tasks.resize_with(phases, Vec::new);
        for tasks in &mut self.phase_tasks {
            tasks.clear();
        }
    }

    fn phase_block_bytes(n: usize) -> usize {
        LinearArena::calc_size(n.saturating_mul(size_of::<Task<P>>()))
    }

    /// Reserve one line-aligned block per non-empty phase. Returns `false` on exhaustion.
    fn reserve_phase_blocks(&self, counts: &[usize]) -> bool {
        counts.iter().filter(|&&n| n > 0).all(|&n| {
            self.arena
                .arena()
                .allocate(Self::phase_block_bytes(n), CACHE_LINE_SIZE)
                .is_some()
        })
    }

    /// Arena bytes the cycle needs: what producers already charged plus the phase blocks.
    fn arena_demand(&self, counts: &[usize]) -> usize {
        counts
            .iter()
            .filter(|&&n| n > 0)
            .fold(self.arena().used(), |acc, &n| {
                acc.saturating_add(Self::phase_block_bytes(n))
            })
    }
}

impl<P: Send> Scheduler<P> {
    /// Build the execution plan from everything recorded in `aggregator`.
    ///
    /// Tasks are grouped per phase in slot order, preserving submission order inside each phase.
    /// Phases with the `sorted` trait are then stable-sorted by ascending priority. The aggregator
    /// is empty afterwards. Returns the total number of tasks in the plan.
    ///
    /// When the arena ran dry, or the aggregator ran out of slots under
    /// [`OverflowPolicy::DropCycle`], both are reset and `on_overflow` is called with the
    /// aggregator so it can submit a smaller workload. Under [`OverflowPolicy::Saturate`] the
    /// batches that fit are consolidated as-is. Rejected batches are counted in
    /// [`ConsolidateStats`] either way.
    ///
    /// Recovery fails with [`FrameplanError::Overflow`] when the callback leaves the cycle
    /// overflowed, when a retry after arena exhaustion does not lower the arena bytes the cycle
    /// needs, or after `max_overflow_retries` recoveries.
    ///
    /// # Panics
    ///
    /// Panics if `aggregator` is bound to a different scheduler.
    #[tracing::instrument(skip_all, fields(phases = phases.len()))]
    pub fn consolidate<F>(
        &mut self,
        aggregator: &mut Aggregator<P>,
        phases: &PhaseTable,
        mut on_overflow: F,
    ) -> FrameplanResult<usize>
    where
        F: FnMut(&Aggregator<P>),
    {
        assert!(
            aggregator.is_bound_to(self),
            "aggregator is bound to a different scheduler"
        );

        self.reset_plan(phases.len());
        let mut recoveries = 0u32;
        let mut dropped_batches = 0u32;
        let mut dropped_tasks = 0u64;
        let mut failed_demand: Option<usize> = None;

        loop {
            if self.needs_recovery(aggregator) {
                if recoveries >= self.config.max_overflow_retries {
                    aggregator.reset();
                    return Err(FrameplanError::overflow(format!(
                        "cycle still overflows after {recoveries} recoveries"
                    )));
                }
                recoveries += 1;
                tracing::warn!(
                    recovery = recoveries,
                    aggregator_overflow = aggregator.overflowed(),
                    dropped_batches = aggregator.dropped_batches(),
                    arena_overflow = self.overflowed(),
                    "cycle overflowed, running recovery"
                );

                dropped_batches = dropped_batches.saturating_add(aggregator.dropped_batches());
                dropped_tasks = dropped_tasks.saturating_add(aggregator.dropped_tasks());
                aggregator.reset();
                self.reset();
                on_overflow(&*aggregator);

                if self.needs_recovery(aggregator) {
                    aggregator.reset();
                    return Err(FrameplanError::overflow(
                        "overflow recovery did not bring the cycle back under capacity",
                    ));
                }
            }

            let counts = match phase_counts(aggregator, phases) {
                Ok(counts) => counts,
                Err(e) => {
                    aggregator.reset();
                    return Err(e);
                }
            };
            let total: usize = counts.iter().sum();
            let demand = self.arena_demand(&counts);

            if let Some(previous) = failed_demand
                && demand >= previous
            {
                aggregator.reset();
                return Err(FrameplanError::overflow(format!(
                    "overflow recovery did not reduce arena demand ({demand} bytes, previously {previous})"
                )));
            }

            if !self.reserve_phase_blocks(&counts) {
                tracing::warn!(
                    tasks = total,
                    demand,
                    arena_capacity = self.arena().capacity(),
                    "arena too small for consolidated plan"
                );
                self.arena.flag_overflow();
                failed_demand = Some(demand);
                continue;
            }

            if aggregator.overflowed() {
                tracing::warn!(
                    kept_batches = aggregator.len(),
                    dropped_batches = aggregator.dropped_batches(),
                    dropped_tasks = aggregator.dropped_tasks(),
                    "consolidating the batches that fit"
                );
            }
            dropped_batches = dropped_batches.saturating_add(aggregator.dropped_batches());
            dropped_tasks = dropped_tasks.saturating_add(aggregator.dropped_tasks());

            for (tasks, &n) in self.phase_tasks.iter_mut().zip(&counts) {
                tasks.reserve_exact(n);
            }
            let mut batches = 0usize;
            for mut record in aggregator.drain() {
                self.phase_tasks[record.phase.index()].append(&mut record.tasks);
                batches += 1;
            }

            for (id, desc) in phases.iter() {
                let tasks = &mut self.phase_tasks[id.index()];
                if desc.traits.is_sorted() {
                    if tasks.len() >= self.config.parallel_sort_threshold {
                        tasks.par_sort_by_key(|t| t.priority);
                    } else {
                        tasks.sort_by_key(|t| t.priority);
                    }
                }
                tracing::debug!(
                    phase = %desc.name,
                    tasks = tasks.len(),
                    sorted = desc.traits.is_sorted(),
                    "phase consolidated"
                );
            }

            aggregator.reset();
            self.stats = ConsolidateStats {
                tasks: total,
                batches,
                overflow_recoveries: recoveries,
                dropped_batches,
                dropped_tasks,
                arena_bytes_used: self.arena().used(),
            };
            return Ok(total);
        }
    }

    /// Arena exhaustion always needs a rebuilt cycle; slot exhaustion only under `DropCycle`.
    fn needs_recovery(&self, aggregator: &Aggregator<P>) -> bool {
        self.overflowed()
            || (aggregator.overflowed() && aggregator.policy() == OverflowPolicy::DropCycle)
    }
}

fn phase_counts<P>(
    aggregator: &mut Aggregator<P>,
    phases: &PhaseTable,
) -> FrameplanResult<Vec<usize>> {
    let mut counts = vec![0usize; phases.len()];
    for record in aggregator.records() {
        let slot = counts.get_mut(record.phase.index()).ok_or_else(|| {
            FrameplanError::validation(format!(
                "batch submitted to phase {} but the phase table has {} phases",
                record.phase.0,
                phases.len()
            ))
        })?;
        *slot += record.tasks.len();
    }
    Ok(counts)
}

impl<P> std::fmt::Debug for Scheduler<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("arena", self.arena.arena())
            .field("phases", &self.phase_tasks.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/plan.rs"]
mod tests;
