use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::foundation::{
    core::{CACHE_LINE_SIZE, CacheAligned, align_up},
    error::{FrameplanError, FrameplanResult},
};

const DETACHED_GENERATION: u64 = u64::MAX;

/// A cycle-scoped reservation inside a [`LinearArena`].
///
/// Spans are budget records, not memory: they give the offset and length charged to the
/// arena, and never hand out storage.
///
/// Spans carry the arena generation they were carved from. Every [`LinearArena::reset`] bumps
/// the generation, so spans from an earlier cycle are detectably stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaSpan {
    offset: usize,
    len: usize,
    generation: u64,
}

impl ArenaSpan {
    pub(crate) fn detached(len: usize) -> Self {
        Self {
            offset: 0,
            len,
            generation: DETACHED_GENERATION,
        }
    }

    /// Byte offset from the arena base.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Reserved length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Return `true` for zero-length spans.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Arena generation (cycle) the span belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Return `true` if the span was handed out after the arena could not satisfy the request.
    ///
    /// Detached spans never alias arena memory; the owning scheduler has flagged overflow and
    /// the cycle will be rebuilt by `consolidate`.
    pub fn is_detached(&self) -> bool {
        self.generation == DETACHED_GENERATION
    }
}

/// Concurrent bump allocator with whole-arena reset.
///
/// Allocation is a CAS loop on a cache-aligned offset, so any number of producer threads can
/// carve spans concurrently. Memory is only ever reclaimed by [`LinearArena::reset`].
#[derive(Debug)]
pub struct LinearArena {
    capacity: usize,
    offset: CacheAligned<AtomicUsize>,
    generation: AtomicU64,
    high_water: AtomicUsize,
}

impl LinearArena {
    /// Create an arena able to hand out `capacity` bytes per cycle.
    ///
    /// `capacity` must be a non-zero multiple of [`CACHE_LINE_SIZE`] so the arena end stays
    /// line-aligned (see [`LinearArena::calc_size`]).
    pub fn new(capacity: usize) -> FrameplanResult<Self> {
        if capacity == 0 {
            return Err(FrameplanError::validation("arena capacity must be > 0"));
        }
        if !capacity.is_multiple_of(CACHE_LINE_SIZE) {
            return Err(FrameplanError::validation(format!(
                "arena capacity {capacity} is not a multiple of the cache line size ({CACHE_LINE_SIZE})"
            )));
        }
        Ok(Self {
            capacity,
            offset: CacheAligned::new(AtomicUsize::new(0)),
            generation: AtomicU64::new(0),
            high_water: AtomicUsize::new(0),
        })
    }

    /// Bytes an arena needs in order to serve `capacity` bytes, rounded up to a cache line.
    ///
    /// Saturates at the largest line-aligned `usize`.
    pub fn calc_size(capacity: usize) -> usize {
        align_up(capacity, CACHE_LINE_SIZE).unwrap_or(usize::MAX & !(CACHE_LINE_SIZE - 1))
    }

    /// Reserve `bytes` aligned to `align` (a power of two; `0` is treated as `1`).
    ///
    /// Returns `None` when the arena is exhausted or `align` is not a power of two.
    pub fn allocate(&self, bytes: usize, align: usize) -> Option<ArenaSpan> {
        let align = align.max(1);
        if !align.is_power_of_two() {
            return None;
        }

        loop {
            let generation = self.generation.load(Ordering::Acquire);
            let (offset, end) = self.bump(bytes, align)?;
            // a reset that lands between the generation read and the bump moved this span into
            // the next generation; carve it again so the tag matches
            if self.generation.load(Ordering::Acquire) == generation {
                self.high_water.fetch_max(end, Ordering::Relaxed);
                return Some(ArenaSpan {
                    offset,
                    len: bytes,
                    generation,
                });
            }
        }
    }

    fn bump(&self, bytes: usize, align: usize) -> Option<(usize, usize)> {
        let mut current = self.offset.load(Ordering::Acquire);
        loop {
            let start = align_up(current, align)?;
            let end = start.checked_add(bytes)?;
            if end > self.capacity {
                return None;
            }
            match self.offset.compare_exchange_weak(
                current,
                end,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some((start, end)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Rewind to empty and start a new generation.
    ///
    /// All previously returned spans become stale.
    pub fn reset(&self) {
        self.offset.store(0, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out in the current generation.
    pub fn used(&self) -> usize {
        self.offset.load(Ordering::Acquire).min(self.capacity)
    }

    /// Bytes still available in the current generation.
    pub fn available(&self) -> usize {
        self.capacity - self.used()
    }

    /// Largest offset ever reached, across generations.
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }

    /// Current generation; starts at 0 and increases on every reset.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Return `true` if `span` was carved from the current generation of this arena.
    pub fn is_live(&self, span: &ArenaSpan) -> bool {
        !span.is_detached() && span.generation == self.generation()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/arena/linear.rs"]
mod tests;
