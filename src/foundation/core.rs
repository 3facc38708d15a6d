use std::ops::{Deref, DerefMut};

/// Cache-line size assumed for padding shared counters and aligning arena blocks.
pub const CACHE_LINE_SIZE: usize = 64;

/// Index of a phase inside a [`PhaseTable`](crate::PhaseTable).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PhaseId(pub u32);

impl PhaseId {
    /// Position of the phase in its table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a technique inside a [`TechniqueTable`](crate::TechniqueTable).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TechniqueId(pub u32);

impl TechniqueId {
    /// Position of the technique in its table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Wrapper that gives `T` its own cache line.
///
/// Used for atomics written by many producer threads so that they do not share a line with
/// neighbouring fields.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct CacheAligned<T>(pub T);

const _: () = assert!(std::mem::align_of::<CacheAligned<u8>>() == CACHE_LINE_SIZE);
const _: () = assert!(std::mem::size_of::<CacheAligned<u8>>() == CACHE_LINE_SIZE);

impl<T> CacheAligned<T> {
    /// Wrap `value`.
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for CacheAligned<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// Round `value` up to the next multiple of `align` (a power of two).
///
/// Returns `None` on overflow.
pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
