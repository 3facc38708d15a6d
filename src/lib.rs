//! frameplan is a frame task-scheduling substrate: gather, order, execute.
//!
//! Many producer threads submit small tasks (priority, technique id, payload) into thread-local
//! [`TaskBatch`]es. Full or explicitly flushed batches land in a bounded [`Aggregator`] with a
//! single atomic increment. Once every producer is done, the [`Scheduler`] consolidates the
//! batches into one contiguous task vector per phase, stable-sorts phases marked `sorted` by
//! priority, and executes phases in table order by handing runs of same-technique tasks to a
//! [`TechniqueTable`].
//!
//! # Cycle overview
//!
//! 1. **Submit**: `aggregator.make_batch(phase)`, `batch.add(..)`, `batch.flush()` on any thread
//! 2. **Consolidate**: [`Scheduler::consolidate`] (single-threaded, after all batches are gone)
//! 3. **Execute**: [`Scheduler::execute`] / [`Scheduler::execute_all`]
//! 4. **Reset**: [`Scheduler::reset`] rewinds the arena and releases every task of the cycle
//!
//! Capacity violations (aggregator slots or arena bytes) never surface at submission time. They
//! are flagged and resolved inside `consolidate` through a caller-supplied recovery callback.
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic phase order**: execution order of phases is the [`PhaseTable`] order,
//!   independent of submission order.
//! - **Stable priorities**: sorted phases keep submission order among equal priorities.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod arena;
mod foundation;
mod phase;
mod schedule;
mod task;

/// Cycle driver: declarative workloads submitted from a rayon pool.
pub mod pipeline;

pub use arena::linear::{ArenaSpan, LinearArena};
pub use foundation::core::{CACHE_LINE_SIZE, CacheAligned, PhaseId, TechniqueId};
pub use foundation::error::{FrameplanError, FrameplanResult};
pub use phase::table::{PhaseDesc, PhaseTable, PhaseTrait, PhaseTraits};
pub use schedule::execute::ExecuteStats;
pub use schedule::plan::{ConsolidateStats, Scheduler, SchedulerConfig};
pub use schedule::techniques::TechniqueTable;
pub use task::Task;
pub use task::aggregator::{Aggregator, AggregatorConfig, OverflowPolicy};
pub use task::batch::TaskBatch;

pub use pipeline::{
    CycleConfig, CycleStats, PhaseReport, SubmitThreading, TechniqueReport, WorkItem, Workload,
    build_thread_pool, run_cycle, submit_workload,
};
