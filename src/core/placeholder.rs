//! The "no structure yet" configuration.
//!
//! [`NoTds`] is the default structure parameter of [`Cell`], so that `Cell` can
//! be named (for instance as the default cell argument of
//! [`Tds`](crate::core::triangulation_data_structure::Tds)) before any concrete
//! structure exists. It only supports type resolution: its handles are
//! zero-sized, `Cell<NoTds>` carries no data, and it is not a
//! [`ConcreteTds`](crate::core::traits::tds_types::ConcreteTds), so every data
//! operation is rejected at compile time.
//!
//! ```rust
//! use tds3::core::cell::Cell;
//! use tds3::core::placeholder::{NoTds, PlaceholderHandle};
//! use tds3::core::traits::tds_types::{CellHandleOf, RebindTds, VertexHandleOf};
//!
//! let cell: Cell = Cell::placeholder();
//! assert_eq!(std::mem::size_of_val(&cell), 0);
//!
//! let _: VertexHandleOf<Cell<NoTds>> = PlaceholderHandle;
//! let _: CellHandleOf<Cell<NoTds>> = PlaceholderHandle;
//! ```
//!
//! Vertex access does not compile on a placeholder cell:
//!
//! ```rust,compile_fail
//! use tds3::core::cell::Cell;
//!
//! let cell: Cell = Cell::placeholder();
//! let _ = cell.vertex(0);
//! ```
//!
//! Neither does neighbor mutation:
//!
//! ```rust,compile_fail
//! use tds3::core::cell::Cell;
//! use tds3::core::placeholder::PlaceholderHandle;
//!
//! let mut cell: Cell = Cell::placeholder();
//! let _ = cell.set_neighbor(0, PlaceholderHandle);
//! ```
//!
//! Nor erase counter access:
//!
//! ```rust,compile_fail
//! use tds3::core::cell::Cell;
//!
//! let mut cell: Cell = Cell::placeholder();
//! cell.increment_erase_counter();
//! ```

use crate::core::erase_counter::{Sequential, WithoutEraseCounter};
use crate::core::traits::tds_types::{Handle, TdsTypes};

#[cfg(doc)]
use crate::core::cell::Cell;

/// Zero-sized handle of the placeholder structure. Every value is the null handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaceholderHandle;

impl Handle for PlaceholderHandle {
    #[inline]
    fn null() -> Self {
        Self
    }

    #[inline]
    fn is_null(&self) -> bool {
        true
    }
}

/// Placeholder enclosing structure used before a real one is supplied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NoTds;

impl TdsTypes for NoTds {
    type VertexHandle = PlaceholderHandle;
    type CellHandle = PlaceholderHandle;
    type Concurrency = Sequential;
    type CellStrategy = WithoutEraseCounter;
    type CellData = ();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::Cell;
    use crate::core::traits::tds_types::{CellHandleOf, RebindTds, VertexHandleOf};
    use std::any::TypeId;

    #[test]
    fn test_placeholder_cell_is_zero_sized() {
        assert_eq!(std::mem::size_of::<Cell<NoTds>>(), 0);
        assert_eq!(std::mem::size_of::<Cell>(), 0);
        let cell = Cell::placeholder();
        assert_eq!(cell, Cell::<NoTds>::default());
    }

    #[test]
    fn test_placeholder_handle_aliases() {
        assert_eq!(
            TypeId::of::<VertexHandleOf<Cell>>(),
            TypeId::of::<PlaceholderHandle>()
        );
        assert_eq!(
            TypeId::of::<CellHandleOf<Cell>>(),
            TypeId::of::<PlaceholderHandle>()
        );
        assert!(PlaceholderHandle::null().is_null());
    }

    #[test]
    fn test_placeholder_rebinds_to_itself() {
        assert_eq!(
            TypeId::of::<<Cell as RebindTds>::Rebound<NoTds>>(),
            TypeId::of::<Cell<NoTds>>()
        );
    }
}
