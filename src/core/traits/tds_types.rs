//! Type-level interface between cells and their enclosing data structure.
//!
//! A cell needs to know the handle types of the structure that stores it, while
//! the structure needs to know the cell type it stores. This circular dependency
//! is broken in two steps:
//!
//! 1. A cell type is first named against the placeholder
//!    [`NoTds`](crate::core::placeholder::NoTds) (e.g. `Cell` with its default argument).
//! 2. The data structure then rebinds it to itself through [`RebindTds`], yielding
//!    the same cell logic parameterized over the final structure type.
//!
//! # Examples
//!
//! ```rust
//! use tds3::prelude::*;
//! use std::any::TypeId;
//!
//! // The default Tds rebinds the placeholder cell to itself.
//! type Rebound = <Cell as RebindTds>::Rebound<Tds>;
//! assert_eq!(TypeId::of::<Rebound>(), TypeId::of::<Cell<Tds>>());
//! assert_eq!(TypeId::of::<CellHandleOf<Rebound>>(), TypeId::of::<CellKey>());
//! ```

use crate::core::erase_counter::{CellContainerStrategy, ConcurrencyTag};
use slotmap::Key;
use std::{fmt::Debug, hash::Hash};

// =============================================================================
// HANDLES
// =============================================================================

/// Opaque, non-owning, identity-comparable reference into container storage.
///
/// Every handle type has a null value used for "not linked yet".
pub trait Handle: Copy + Eq + Hash + Debug + Default {
    /// The null handle.
    #[must_use]
    fn null() -> Self;

    /// Returns `true` if this is the null handle.
    fn is_null(&self) -> bool;
}

impl<K: Key> Handle for K {
    #[inline]
    fn null() -> Self {
        <K as Key>::null()
    }

    #[inline]
    fn is_null(&self) -> bool {
        <K as Key>::is_null(self)
    }
}

// =============================================================================
// ENCLOSING STRUCTURE INTERFACE
// =============================================================================

/// Associated types a triangulation data structure supplies to its cells.
pub trait TdsTypes: Sized {
    /// Handle to a vertex stored in the structure.
    type VertexHandle: Handle;

    /// Handle to a cell stored in the structure.
    type CellHandle: Handle;

    /// Sequential or parallel bookkeeping.
    type Concurrency: ConcurrencyTag;

    /// Whether the cell container needs erase counters.
    type CellStrategy: CellContainerStrategy;

    /// Scratch payload reserved for algorithms running on the structure.
    type CellData: Clone + Debug + Default + PartialEq;
}

/// Marker for structures that actually store cells.
///
/// Data operations on [`Cell`](crate::core::cell::Cell) are only implemented
/// when its parameter is a `ConcreteTds`; the placeholder is deliberately not one.
pub trait ConcreteTds: TdsTypes {}

/// Erase counter type stored in cells of `T`.
pub type EraseCounterOf<T> = <<T as TdsTypes>::CellStrategy as CellContainerStrategy>::Counter<
    <T as TdsTypes>::Concurrency,
>;

// =============================================================================
// REBIND
// =============================================================================

/// Projection from a cell type over one structure to the same cell type over another.
///
/// For any `T2`, `C::Rebound<T2>` must have the layout and behavior of `C`
/// with its structure parameter replaced by `T2`.
pub trait RebindTds {
    /// The structure this cell type is currently parameterized over.
    type Tds: TdsTypes;

    /// The same cell type, parameterized over `T2`.
    type Rebound<T2: TdsTypes>: RebindTds<Tds = T2>;
}

/// Vertex handle type of a cell type `C`.
pub type VertexHandleOf<C> = <<C as RebindTds>::Tds as TdsTypes>::VertexHandle;

/// Cell handle type of a cell type `C`.
pub type CellHandleOf<C> = <<C as RebindTds>::Tds as TdsTypes>::CellHandle;
