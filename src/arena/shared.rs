use std::sync::atomic::{AtomicBool, Ordering};

use crate::arena::linear::{ArenaSpan, LinearArena};

/// Scheduler-owned arena plus the overflow flag producers raise when it runs dry.
///
/// Aggregators hold a shared handle so their batches can allocate; only the scheduler resets it.
#[derive(Debug)]
pub(crate) struct SharedArena {
    arena: LinearArena,
    overflow: AtomicBool,
}

impl SharedArena {
    pub(crate) fn new(arena: LinearArena) -> Self {
        Self {
            arena,
            overflow: AtomicBool::new(false),
        }
    }

    pub(crate) fn arena(&self) -> &LinearArena {
        &self.arena
    }

    /// Allocate without ever failing at the call site.
    ///
    /// On exhaustion the overflow flag is raised, the arena is rewound and the request is retried
    /// once. If even an empty arena cannot satisfy it a detached span is returned. Either way the
    /// cycle is rebuilt by the next `consolidate`.
    pub(crate) fn allocate_or_flag(&self, bytes: usize, align: usize) -> ArenaSpan {
        if let Some(span) = self.arena.allocate(bytes, align) {
            return span;
        }

        if !self.overflow.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                bytes,
                capacity = self.arena.capacity(),
                "arena exhausted, flagging overflow for this cycle"
            );
        }
        self.arena.reset();
        self.arena
            .allocate(bytes, align)
            .unwrap_or_else(|| ArenaSpan::detached(bytes))
    }

    pub(crate) fn overflowed(&self) -> bool {
        self.overflow.load(Ordering::Acquire)
    }

    pub(crate) fn flag_overflow(&self) {
        self.overflow.store(true, Ordering::Release);
    }

    /// Rewind the arena and clear the overflow flag.
    pub(crate) fn reset(&self) {
        self.arena.reset();
        self.overflow.store(false, Ordering::Release);
    }

    pub(crate) fn into_arena(self) -> LinearArena {
        self.arena
    }
}

#[cfg(test)]
#[path = "../../tests/unit/arena/shared.rs"]
mod tests;
