//! Extension point for cell types stored in a triangulation data structure.
//!
//! [`Cell`] is the base cell. Algorithms that need more per-cell state define
//! their own cell type wrapping a `Cell`, expose it through
//! [`base`](TdsCell::base) / [`base_mut`](TdsCell::base_mut), and override
//! [`is_valid`](TdsCell::is_valid) and the stream hooks as needed.
//!
//! # Examples
//!
//! ```rust
//! use std::io::{self, Read, Write};
//! use tds3::prelude::*;
//!
//! /// A cell that carries a material id.
//! struct MaterialCell<T: TdsTypes = NoTds> {
//!     base: Cell<T>,
//!     material: u8,
//! }
//!
//! impl<T: TdsTypes> Default for MaterialCell<T> {
//!     fn default() -> Self {
//!         Self { base: Cell::default(), material: 0 }
//!     }
//! }
//!
//! impl<T: TdsTypes> RebindTds for MaterialCell<T> {
//!     type Tds = T;
//!     type Rebound<T2: TdsTypes> = MaterialCell<T2>;
//! }
//!
//! impl<T: ConcreteTds> TdsCell for MaterialCell<T> {
//!     fn base(&self) -> &Cell<T> {
//!         &self.base
//!     }
//!     fn base_mut(&mut self) -> &mut Cell<T> {
//!         &mut self.base
//!     }
//!     fn write_extra<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
//!         w.write_all(&[self.material])
//!     }
//!     fn read_extra<R: Read + ?Sized>(&mut self, r: &mut R) -> io::Result<()> {
//!         let mut byte = [0_u8; 1];
//!         r.read_exact(&mut byte)?;
//!         self.material = byte[0];
//!         Ok(())
//!     }
//! }
//!
//! let mut tds: Tds<MaterialCell> = Tds::new();
//! let v: Vec<VertexKey> = (0..4).map(|_| tds.create_vertex()).collect();
//! let c = tds.create_cell([v[0], v[1], v[2], v[3]]).unwrap();
//! tds.cell_mut(c).unwrap().material = 9;
//!
//! let restored: Tds<MaterialCell> = Tds::from_snapshot(&tds.snapshot().unwrap()).unwrap();
//! let (_, cell) = restored.cells().next().unwrap();
//! assert_eq!(cell.material, 9);
//! ```

use crate::core::cell::Cell;
use crate::core::traits::tds_types::{ConcreteTds, RebindTds};
use std::io::{self, Read, Write};

/// A cell type that can be stored in a triangulation data structure.
pub trait TdsCell: RebindTds + Default {
    /// The underlying base cell.
    fn base(&self) -> &Cell<Self::Tds>;

    /// Mutable access to the underlying base cell.
    fn base_mut(&mut self) -> &mut Cell<Self::Tds>;

    /// Checks cell-local invariants.
    ///
    /// The base implementation has no opinion and returns `true`; wrapping cell
    /// types override it to add their own checks. `verbose` asks for
    /// diagnostics to be logged, `level` selects how thorough to be.
    fn is_valid(&self, _verbose: bool, _level: u32) -> bool {
        true
    }

    /// Writes the non-combinatorial state of this cell.
    ///
    /// Vertex and neighbor links are written by the enclosing structure. The
    /// base cell has no such state and writes nothing, so wrapping types are
    /// free to choose their own encoding.
    ///
    /// # Errors
    ///
    /// Returns any error raised by `w`.
    fn write_extra<W: Write + ?Sized>(&self, _w: &mut W) -> io::Result<()> {
        Ok(())
    }

    /// Reads back what [`write_extra`](Self::write_extra) wrote.
    ///
    /// The base cell reads nothing and leaves `self` unchanged.
    ///
    /// # Errors
    ///
    /// Returns any error raised by `r`, or `InvalidData` for malformed input.
    fn read_extra<R: Read + ?Sized>(&mut self, _r: &mut R) -> io::Result<()> {
        Ok(())
    }
}

impl<T: ConcreteTds> TdsCell for Cell<T> {
    #[inline]
    fn base(&self) -> &Self {
        self
    }

    #[inline]
    fn base_mut(&mut self) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::triangulation_data_structure::Tds;

    #[test]
    fn test_base_cell_hooks_are_no_ops() {
        let cell: Cell<Tds> = Cell::new();
        assert!(cell.is_valid(true, 3));

        let mut bytes = Vec::new();
        cell.write_extra(&mut bytes).unwrap();
        assert!(bytes.is_empty());

        let mut restored: Cell<Tds> = Cell::new();
        restored.read_extra(&mut bytes.as_slice()).unwrap();
        assert_eq!(restored, Cell::new());
        assert_eq!(restored, cell);
    }

    #[test]
    fn test_base_is_identity() {
        let mut cell: Cell<Tds> = Cell::new();
        assert!(std::ptr::eq(cell.base(), &cell));
        let ptr: *const Cell<Tds> = &cell;
        assert!(std::ptr::eq(cell.base_mut(), ptr));
    }
}
