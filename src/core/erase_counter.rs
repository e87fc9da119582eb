//! Erase counters for generation-checked cell storage.
//!
//! A compacting container reuses the memory of erased cells. To let callers
//! detect that a handle captured before an erasure now refers to a different
//! cell, each cell can carry an erase counter that the container bumps when the
//! slot is reclaimed. Whether the counter exists at all, and whether it is a
//! plain integer or an atomic, is decided at compile time by two orthogonal
//! choices made by the enclosing triangulation data structure:
//!
//! - a [`CellContainerStrategy`] ([`WithEraseCounter`] or [`WithoutEraseCounter`]), and
//! - a [`ConcurrencyTag`] ([`Sequential`] or [`Parallel`]).
//!
//! The resulting counter type is
//! [`EraseCounterOf<T>`](crate::core::traits::tds_types::EraseCounterOf).
//! When the strategy opts out, the counter is the zero-sized [`NoEraseCounter`],
//! which implements neither [`EraseCounter`] nor [`SharedEraseCounter`], so the
//! counter accessors on [`Cell`](crate::core::cell::Cell) do not exist for it.
//!
//! # Examples
//!
//! ```rust
//! use tds3::core::erase_counter::{AtomicEraseCounter, EraseCounter, SharedEraseCounter};
//!
//! let counter = AtomicEraseCounter::default();
//! std::thread::scope(|s| {
//!     for _ in 0..4 {
//!         s.spawn(|| {
//!             counter.fetch_increment();
//!         });
//!     }
//! });
//! assert_eq!(counter.get(), 4);
//! ```

use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    sync::atomic::{AtomicU32, Ordering},
};

// =============================================================================
// COUNTER TRAITS
// =============================================================================

/// Per-cell erase generation.
///
/// The value only ever moves forward for a given storage slot (wrapping at
/// `u32::MAX` like an unsigned counter); consumers compare values for
/// equality, "changed" meaning "stale".
pub trait EraseCounter: Clone + Debug + Default {
    /// Returns the current generation.
    fn get(&self) -> u32;

    /// Overwrites the generation.
    ///
    /// Used by containers to carry the generation of a reclaimed slot over
    /// to the cell that reuses it.
    fn set(&mut self, value: u32);

    /// Advances the generation by one.
    fn increment(&mut self);
}

/// Erase counter that can be advanced through a shared reference.
///
/// Only implemented by [`AtomicEraseCounter`]. `N` concurrent calls to
/// [`fetch_increment`](Self::fetch_increment) advance the counter by exactly
/// `N`.
pub trait SharedEraseCounter: EraseCounter + Send + Sync {
    /// Atomically advances the generation and returns the previous value.
    fn fetch_increment(&self) -> u32;

    /// Atomically overwrites the generation.
    fn store(&self, value: u32);
}

// =============================================================================
// COUNTER IMPLEMENTATIONS
// =============================================================================

/// Plain `u32` erase counter for single-threaded containers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequentialEraseCounter(u32);

impl EraseCounter for SequentialEraseCounter {
    #[inline]
    fn get(&self) -> u32 {
        self.0
    }

    #[inline]
    fn set(&mut self, value: u32) {
        self.0 = value;
    }

    #[inline]
    fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Atomic erase counter for containers shared between threads.
///
/// Reads use `Acquire`, writes use `Release`, and increments use `AcqRel`.
/// Ordering is only guaranteed for this counter, not across the container.
#[derive(Debug, Default)]
pub struct AtomicEraseCounter(AtomicU32);

impl AtomicEraseCounter {
    /// Creates a counter starting at `value`.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }
}

impl Clone for AtomicEraseCounter {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl EraseCounter for AtomicEraseCounter {
    #[inline]
    fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    fn set(&mut self, value: u32) {
        *self.0.get_mut() = value;
    }

    #[inline]
    fn increment(&mut self) {
        let value = self.0.get_mut();
        *value = value.wrapping_add(1);
    }
}

impl SharedEraseCounter for AtomicEraseCounter {
    #[inline]
    fn fetch_increment(&self) -> u32 {
        // fetch_add wraps on overflow
        self.0.fetch_add(1, Ordering::AcqRel)
    }

    #[inline]
    fn store(&self, value: u32) {
        self.0.store(value, Ordering::Release);
    }
}

/// Zero-sized stand-in used when the container strategy needs no counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NoEraseCounter;

// =============================================================================
// CONCURRENCY TAGS
// =============================================================================

/// Compile-time marker selecting sequential or thread-safe bookkeeping.
pub trait ConcurrencyTag: Copy + Debug + Default + Send + Sync + 'static {
    /// `true` for tags whose bookkeeping may be shared between threads.
    const PARALLEL: bool;

    /// The erase counter used by cells under this tag.
    type Counter: EraseCounter;
}

/// Single-threaded bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequential;

/// Thread-safe bookkeeping: erase counters are atomics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parallel;

impl ConcurrencyTag for Sequential {
    const PARALLEL: bool = false;
    type Counter = SequentialEraseCounter;
}

impl ConcurrencyTag for Parallel {
    const PARALLEL: bool = true;
    type Counter = AtomicEraseCounter;
}

// =============================================================================
// CONTAINER STRATEGIES
// =============================================================================

/// Declares whether the container storing the cells needs erase counters.
pub trait CellContainerStrategy: Copy + Debug + Default + Send + Sync + 'static {
    /// Whether cells carry an erase counter.
    const USES_ERASE_COUNTER: bool;

    /// The counter stored in each cell under concurrency tag `C`.
    type Counter<C: ConcurrencyTag>: Clone + Debug + Default;
}

/// Cells carry the concurrency tag's erase counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WithEraseCounter;

/// Cells carry no erase counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WithoutEraseCounter;

impl CellContainerStrategy for WithEraseCounter {
    const USES_ERASE_COUNTER: bool = true;
    type Counter<C: ConcurrencyTag> = C::Counter;
}

impl CellContainerStrategy for WithoutEraseCounter {
    const USES_ERASE_COUNTER: bool = false;
    type Counter<C: ConcurrencyTag> = NoEraseCounter;
}

// =============================================================================
// STAMPED HANDLES
// =============================================================================

/// A handle together with the erase generation observed when it was taken.
///
/// Compare [`generation`](Self::generation) against the slot's current
/// counter (see [`Cell::is_current`](crate::core::cell::Cell::is_current)) before
/// trusting the handle: a mismatch means the slot was reclaimed and possibly
/// reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StampedHandle<H> {
    handle: H,
    generation: u32,
}

impl<H: Copy> StampedHandle<H> {
    /// Pairs `handle` with `generation`.
    #[must_use]
    pub const fn new(handle: H, generation: u32) -> Self {
        Self { handle, generation }
    }

    /// The captured handle.
    #[must_use]
    pub const fn handle(&self) -> H {
        self.handle
    }

    /// The generation captured alongside the handle.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Returns `true` if `current` differs from the captured generation.
    #[must_use]
    pub const fn is_stale(&self, current: u32) -> bool {
        self.generation != current
    }
}

// =============================================================================
// TESTS
// =============================================================================
