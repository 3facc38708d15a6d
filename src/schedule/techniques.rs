use crate::{
    foundation::{
        core::TechniqueId,
        error::{FrameplanError, FrameplanResult},
    },
    task::Task,
};

type TechniqueFn<'a, P> = Box<dyn FnMut(&[Task<P>]) + 'a>;

struct TechniqueEntry<'a, P> {
    name: String,
    run: TechniqueFn<'a, P>,
}

/// Handler table indexed by [`TechniqueId`].
///
/// Ids are assigned in registration order. A technique receives a run of consecutive tasks that
/// all carry its id.
pub struct TechniqueTable<'a, P> {
    entries: Vec<TechniqueEntry<'a, P>>,
}

impl<'a, P> TechniqueTable<'a, P> {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a handler and return its id.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        run: impl FnMut(&[Task<P>]) + 'a,
    ) -> TechniqueId {
        let id = TechniqueId(self.entries.len() as u32);
        self.entries.push(TechniqueEntry {
            name: name.into(),
            run: Box::new(run),
        });
        id
    }

    /// Number of registered techniques.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when no technique is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name a technique was registered under.
    pub fn name(&self, id: TechniqueId) -> Option<&str> {
        self.entries.get(id.index()).map(|e| e.name.as_str())
    }

    /// Look up a technique by name.
    pub fn id_of(&self, name: &str) -> Option<TechniqueId> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|i| TechniqueId(i as u32))
    }

    pub(crate) fn dispatch(&mut self, id: TechniqueId, tasks: &[Task<P>]) -> FrameplanResult<()> {
        let registered = self.entries.len();
        let entry = self.entries.get_mut(id.index()).ok_or_else(|| {
            FrameplanError::execution(format!(
                "task references technique {} but only {registered} are registered",
                id.0
            ))
        })?;
        (entry.run)(tasks);
        Ok(())
    }
}

impl<P> Default for TechniqueTable<'_, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for TechniqueTable<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.name.as_str()))
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/techniques.rs"]
mod tests;
