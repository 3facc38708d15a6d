use std::collections::HashSet;
use std::io::Read;

use rayon::prelude::*;

use crate::{
    foundation::{
        core::TechniqueId,
        error::{FrameplanError, FrameplanResult},
        math::task_hash,
    },
    phase::table::PhaseTable,
    schedule::{
        plan::{Scheduler, SchedulerConfig},
        techniques::TechniqueTable,
    },
    task::{
        Task,
        aggregator::{Aggregator, AggregatorConfig},
    },
};

/// Payload of generated tasks: which producer submitted it, and when.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub struct WorkItem {
    /// Producer index in `0..Workload::producers`.
    pub producer: u32,
    /// Submission index within the producer.
    pub sequence: u32,
}

/// Declarative description of one cycle's submissions.
///
/// Every producer submits `tasks_per_producer` tasks. Phase, priority and technique of each
/// task are derived from `(seed, producer, sequence)`, so the multiset of submitted tasks is
/// identical across runs regardless of thread interleaving.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Workload {
    /// Number of concurrent producers.
    pub producers: u32,
    /// Tasks submitted by each producer.
    pub tasks_per_producer: u32,
    /// Priority values tasks are drawn from.
    pub priorities: Vec<u32>,
    /// Seed for task generation.
    pub seed: u64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            producers: 4,
            tasks_per_producer: 2000,
            priorities: vec![0, 8, 16, 24],
            seed: 0,
        }
    }
}

impl Workload {
    /// Check producer count and priority set.
    pub fn validate(&self) -> FrameplanResult<()> {
        if self.producers == 0 {
            return Err(FrameplanError::validation("workload producers must be >= 1"));
        }
        if self.priorities.is_empty() {
            return Err(FrameplanError::validation(
                "workload priorities must not be empty",
            ));
        }
        Ok(())
    }

    /// Tasks submitted across all producers.
    pub fn total_tasks(&self) -> u64 {
        u64::from(self.producers) * u64::from(self.tasks_per_producer)
    }

    /// The same workload with half as many tasks per producer.
    pub fn halved(&self) -> Self {
        Self {
            tasks_per_producer: self.tasks_per_producer / 2,
            ..self.clone()
        }
    }
}

/// Everything needed to run cycles from a JSON file.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CycleConfig {
    /// Scheduler sizing.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Aggregator sizing and overflow policy.
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    /// Phases in execution order.
    pub phases: PhaseTable,
    /// Technique names; position is the technique id.
    pub techniques: Vec<String>,
    /// Generated submissions.
    #[serde(default)]
    pub workload: Workload,
}

impl CycleConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(s: &str) -> FrameplanResult<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a JSON config from a reader.
    pub fn from_reader(r: impl Read) -> FrameplanResult<Self> {
        let cfg: Self = serde_json::from_reader(r)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate every section.
    pub fn validate(&self) -> FrameplanResult<()> {
        self.scheduler.validate()?;
        self.aggregator.validate()?;
        self.workload.validate()?;

        if self.techniques.is_empty() {
            return Err(FrameplanError::validation(
                "at least one technique must be declared",
            ));
        }
        if u32::try_from(self.techniques.len()).is_err() {
            return Err(FrameplanError::validation("too many techniques"));
        }
        let mut seen = HashSet::with_capacity(self.techniques.len());
        for name in &self.techniques {
            if !seen.insert(name.as_str()) {
                return Err(FrameplanError::validation(format!(
                    "duplicate technique name '{name}'"
                )));
            }
        }
        Ok(())
    }
}

/// Producer thread configuration.
#[derive(Clone, Debug, Default)]
pub struct SubmitThreading {
    /// Worker threads for producers; `None` uses rayon's default.
    pub threads: Option<usize>,
}

impl SubmitThreading {
    /// Build the producer pool described by this configuration.
    pub fn build_pool(&self) -> FrameplanResult<rayon::ThreadPool> {
        build_thread_pool(self.threads)
    }
}

/// Per-phase outcome of a cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PhaseReport {
    /// Phase name.
    pub name: String,
    /// Tasks executed in this phase.
    pub tasks: usize,
    /// Technique invocations in this phase.
    pub runs: usize,
}

/// Per-technique outcome of a cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct TechniqueReport {
    /// Technique name.
    pub name: String,
    /// Tasks handed to the technique.
    pub tasks: usize,
    /// Times the technique was invoked.
    pub calls: usize,
}

/// Outcome of [`run_cycle`].
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CycleStats {
    /// Tasks submitted by the workload that was finally consolidated.
    pub submitted: u64,
    /// Tasks in the consolidated plan.
    pub consolidated: usize,
    /// Overflow recoveries needed before the plan fit.
    pub overflow_recoveries: u32,
    /// Batches rejected by the aggregator across all attempts.
    pub dropped_batches: u32,
    /// Tasks inside rejected batches.
    pub dropped_tasks: u64,
    /// Arena bytes in use after consolidation.
    pub arena_bytes_used: usize,
    /// Phases in execution order.
    pub phases: Vec<PhaseReport>,
    /// Techniques in id order.
    pub techniques: Vec<TechniqueReport>,
}

/// Build the rayon pool producers run on.
pub fn build_thread_pool(threads: Option<usize>) -> FrameplanResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(FrameplanError::validation(
            "submit threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder.build().map_err(|e| {
        FrameplanError::validation(format!("failed to build rayon thread pool: {e}"))
    })
}

/// Submit `workload` into `aggregator` from `pool`, one rayon task per producer.
///
/// Each producer keeps one batch per phase and flushes all of them before finishing. Returns the
/// number of submitted tasks.
pub fn submit_workload(
    aggregator: &Aggregator<WorkItem>,
    phases: &PhaseTable,
    techniques: u32,
    workload: &Workload,
    pool: &rayon::ThreadPool,
) -> u64 {
    let phase_count = phases.len().max(1) as u64;
    let techniques = u64::from(techniques.max(1));
    let priorities = workload.priorities.len().max(1) as u64;

    pool.install(|| {
        (0..workload.producers)
            .into_par_iter()
            .map(|producer| {
                let mut batches: Vec<_> =
                    phases.ids().map(|p| aggregator.make_batch(p)).collect();
                for sequence in 0..workload.tasks_per_producer {
                    let h = task_hash(workload.seed, producer, sequence);
                    let phase = (h % phase_count) as usize;
                    let priority = workload
                        .priorities
                        .get(((h >> 20) % priorities) as usize)
                        .copied()
                        .unwrap_or(0);
                    let technique = TechniqueId(((h >> 40) % techniques) as u32);
                    batches[phase].add(priority, technique, WorkItem { producer, sequence });
                }
                for batch in &mut batches {
                    batch.flush();
                }
                u64::from(workload.tasks_per_producer)
            })
            .sum()
    })
}

/// Run one full cycle: submit, consolidate, execute every phase, reset.
///
/// Whenever the cycle has to be rebuilt the workload is halved and resubmitted until it fits
/// (bounded by the scheduler's `max_overflow_retries`).
#[tracing::instrument(skip_all, fields(producers = config.workload.producers))]
pub fn run_cycle(
    scheduler: &mut Scheduler<WorkItem>,
    aggregator: &mut Aggregator<WorkItem>,
    config: &CycleConfig,
    pool: &rayon::ThreadPool,
) -> FrameplanResult<CycleStats> {
    let technique_count = u32::try_from(config.techniques.len())
        .map_err(|_| FrameplanError::validation("too many techniques"))?;

    let mut workload = config.workload.clone();
    let mut submitted = submit_workload(
        aggregator,
        &config.phases,
        technique_count,
        &workload,
        pool,
    );

    let consolidated = scheduler.consolidate(aggregator, &config.phases, |agg| {
        workload = workload.halved();
        tracing::info!(
            tasks_per_producer = workload.tasks_per_producer,
            "resubmitting reduced workload"
        );
        submitted = submit_workload(agg, &config.phases, technique_count, &workload, pool);
    })?;
    let consolidate_stats = scheduler.stats();

    let mut dispatched = vec![(0usize, 0usize); config.techniques.len()];
    let executed = {
        let mut table = TechniqueTable::new();
        for (name, slot) in config.techniques.iter().zip(dispatched.iter_mut()) {
            table.register(name.clone(), move |tasks: &[Task<WorkItem>]| {
                slot.0 += tasks.len();
                slot.1 += 1;
            });
        }
        scheduler.execute_all(&config.phases, &mut table)?
    };

    let stats = CycleStats {
        submitted,
        consolidated,
        overflow_recoveries: consolidate_stats.overflow_recoveries,
        dropped_batches: consolidate_stats.dropped_batches,
        dropped_tasks: consolidate_stats.dropped_tasks,
        arena_bytes_used: consolidate_stats.arena_bytes_used,
        phases: config
            .phases
            .iter()
            .zip(&executed)
            .map(|((_, desc), ex)| PhaseReport {
                name: desc.name.clone(),
                tasks: ex.tasks,
                runs: ex.runs,
            })
            .collect(),
        techniques: config
            .techniques
            .iter()
            .zip(&dispatched)
            .map(|(name, &(tasks, calls))| TechniqueReport {
                name: name.clone(),
                tasks,
                calls,
            })
            .collect(),
    };

    scheduler.reset();
    Ok(stats)
}

#[cfg(test)]
#[path = "../tests/unit/pipeline/pipeline.rs"]
mod tests;
