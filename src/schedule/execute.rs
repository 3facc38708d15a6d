use crate::{
    foundation::{
        core::PhaseId,
        error::{FrameplanError, FrameplanResult},
    },
    phase::table::PhaseTable,
    schedule::{plan::Scheduler, techniques::TechniqueTable},
};

/// Dispatch counters for one executed phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecuteStats {
    /// Tasks handed to techniques.
    pub tasks: usize,
    /// Technique invocations (one per run of equal technique ids).
    pub runs: usize,
}

impl<P> Scheduler<P> {
    /// Run one consolidated phase.
    ///
    /// Each maximal run of consecutive tasks sharing a technique is passed to that technique in a
    /// single call. Runs are only long when the phase order groups techniques together (for
    /// example a sorted phase whose priorities follow techniques).
    #[tracing::instrument(level = "debug", skip(self, techniques))]
    pub fn execute(
        &self,
        phase: PhaseId,
        techniques: &mut TechniqueTable<'_, P>,
    ) -> FrameplanResult<ExecuteStats> {
        let tasks = self.phase_tasks(phase).ok_or_else(|| {
            FrameplanError::execution(format!(
                "phase {} is not part of the consolidated plan ({} phases)",
                phase.0,
                self.phase_count()
            ))
        })?;

        let mut stats = ExecuteStats::default();
        for run in tasks.chunk_by(|a, b| a.technique == b.technique) {
            techniques.dispatch(run[0].technique, run)?;
            stats.runs += 1;
            stats.tasks += run.len();
        }
        Ok(stats)
    }

    /// Run every phase of `phases` in table order.
    pub fn execute_all(
        &self,
        phases: &PhaseTable,
        techniques: &mut TechniqueTable<'_, P>,
    ) -> FrameplanResult<Vec<ExecuteStats>> {
        if phases.len() != self.phase_count() {
            return Err(FrameplanError::execution(format!(
                "phase table has {} phases but the plan was consolidated for {}",
                phases.len(),
                self.phase_count()
            )));
        }

        let mut out = Vec::with_capacity(phases.len());
        for (id, desc) in phases.iter() {
            let _span = tracing::debug_span!("phase", name = %desc.name).entered();
            out.push(self.execute(id, techniques)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/execute.rs"]
mod tests;
