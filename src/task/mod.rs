use crate::foundation::core::TechniqueId;

pub(crate) mod aggregator;
pub(crate) mod batch;

/// Smallest unit of scheduled work.
///
/// The payload `data` is owned by the task and lives until the owning scheduler is reset at the
/// end of the cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task<P> {
    /// Ordering key inside sorted phases; lower runs first.
    pub priority: u32,
    /// Handler that processes this task.
    pub technique: TechniqueId,
    /// Opaque payload handed to the technique.
    pub data: P,
}

impl<P> Task<P> {
    /// Create a task.
    pub fn new(priority: u32, technique: TechniqueId, data: P) -> Self {
        Self {
            priority,
            technique,
            data,
        }
    }
}
