//! # tds3
//!
//! Combinatorial core of a 3D triangulation data structure, in the style of
//! [CGAL](https://www.cgal.org)'s `Triangulation_data_structure_3`.
//!
//! # Features
//!
//! - A tetrahedral [`Cell`](core::cell::Cell) with four vertex and four neighbor
//!   handles, where `neighbor(i)` lies across the facet opposite `vertex(i)`
//! - Erase counters for generation-checked storage, either plain or atomic,
//!   chosen at compile time (see [`core::erase_counter`])
//! - Two-step binding of cell types to the structure that stores them
//!   ([`RebindTds`](core::traits::tds_types::RebindTds)), with a data-free
//!   placeholder configuration for naming cell types before a structure exists
//! - An extension trait ([`TdsCell`](core::traits::tds_cell::TdsCell)) for cells
//!   that carry extra state, with validity and stream hooks
//! - A reference structure [`Tds`](core::triangulation_data_structure::Tds)
//!   with adjacency maintenance, validation, and serde snapshots
//! - Circumcenter computation delegated to a geometric kernel
//!
//! # Basic Usage
//!
//! ```rust
//! use tds3::prelude::*;
//!
//! let mut tds: Tds = Tds::new();
//! let v: Vec<VertexKey> = (0..5).map(|_| tds.create_vertex()).collect();
//!
//! // Two tetrahedra sharing the facet (v0, v1, v2).
//! let a = tds.create_cell([v[0], v[1], v[2], v[3]]).unwrap();
//! let b = tds.create_cell([v[1], v[0], v[2], v[4]]).unwrap();
//! tds.set_adjacency(a, 3, b, 3).unwrap();
//!
//! let cell = tds.cell(a).unwrap();
//! assert_eq!(cell.neighbor(3), b);
//! assert_eq!(cell.index_of(v[3]), Ok(3));
//! assert!(tds.validate().is_ok());
//!
//! // Deleting a cell invalidates its key, even after the slot is reused.
//! tds.delete_cell(a).unwrap();
//! let c = tds.create_cell([v[0], v[1], v[2], v[3]]).unwrap();
//! assert!(tds.cell(a).is_none());
//! assert_eq!(tds.cell(c).unwrap().get_erase_counter(), 1);
//! ```
//!
//! # Error handling
//!
//! Contract violations are always checked. Index accessors such as
//! [`Cell::vertex`](core::cell::Cell::vertex) panic on an out-of-range index,
//! like slice indexing; setters and lookups return
//! [`CellContractError`](core::cell::CellContractError). Structure-level
//! operations return [`TdsError`](core::triangulation_data_structure::TdsError)
//! and [`Tds::validate`](core::triangulation_data_structure::Tds::validate)
//! reports [`TdsValidationError`](core::triangulation_data_structure::TdsValidationError).
//!
//! # Feature flags
//!
//! - `dense-slotmap` (default): vertices are stored in a `DenseSlotMap`;
//!   without it, in a `SlotMap`.

// Forbid unsafe code throughout the entire crate
#![forbid(unsafe_code)]

/// Cells, their enclosing structure, and the type-level plumbing between them.
pub mod core {
    pub mod cell;
    /// Storage and lookup collections
    pub mod collections;
    pub mod erase_counter;
    pub mod placeholder;
    pub mod triangulation_data_structure;

    /// Traits connecting cells and data structures
    pub mod traits {
        pub mod tds_cell;
        pub mod tds_types;
        pub use tds_cell::*;
        pub use tds_types::*;
    }

    pub use cell::*;
    pub use erase_counter::*;
    pub use placeholder::*;
    pub use traits::*;
    pub use triangulation_data_structure::*;
}

/// Geometric kernels.
pub mod geometry {
    pub mod kernel;
    pub use kernel::*;
}

/// A prelude module that re-exports commonly used types.
pub mod prelude {
    pub use crate::core::{
        cell::*, erase_counter::*, placeholder::*, traits::*, triangulation_data_structure::*,
    };

    // Re-export commonly used collection types from core::collections
    pub use crate::core::collections::{
        CellSecondaryMap, FastHashMap, FastHashSet, VertexSecondaryMap,
    };

    pub use crate::geometry::kernel::*;
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{
        core::{
            cell::Cell,
            erase_counter::{AtomicEraseCounter, Parallel, SequentialEraseCounter},
            placeholder::NoTds,
            triangulation_data_structure::{CellKey, Tds, TdsSnapshot, VertexKey},
        },
        is_normal,
    };

    // =============================================================================
    // TYPE SAFETY TESTS
    // =============================================================================

    #[test]
    fn normal_types() {
        assert!(is_normal::<VertexKey>());
        assert!(is_normal::<CellKey>());
        assert!(is_normal::<Cell<NoTds>>());
        assert!(is_normal::<Cell<Tds>>());
        assert!(is_normal::<Cell<Tds<Cell, Parallel>>>());
        assert!(is_normal::<Tds>());
        assert!(is_normal::<Tds<Cell, Parallel>>());
        assert!(is_normal::<TdsSnapshot>());
        assert!(is_normal::<SequentialEraseCounter>());
        assert!(is_normal::<AtomicEraseCounter>());
    }

    #[test]
    fn test_prelude_exports() {
        use crate::prelude::*;

        let mut map: FastHashMap<u64, usize> = FastHashMap::default();
        map.insert(123, 456);
        assert_eq!(map.get(&123), Some(&456));

        let mut set: FastHashSet<u64> = FastHashSet::default();
        set.insert(789);
        assert!(set.contains(&789));

        let mut tds: Tds = Tds::new();
        let v = tds.create_vertex();
        let mut points: VertexSecondaryMap<[f64; 3]> = VertexSecondaryMap::new();
        points.insert(v, [0.0; 3]);
        assert_eq!(points.len(), 1);

        let _ = FastKernel::new();
        let _: Cell = Cell::placeholder();
    }
}
