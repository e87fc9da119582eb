//! Data and operations on tetrahedral cells.
//!
//! This module provides the [`Cell`] struct, the combinatorial description of a
//! tetrahedron in a 3D triangulation: four vertex handles, four neighbor
//! handles, an optional erase counter, and an opaque payload reserved for
//! algorithms running on top of the structure.
//!
//! # Key Features
//!
//! - **Positional semantics**: `neighbor(i)` is the cell across the facet
//!   opposite `vertex(i)`, i.e. the facet made of the three other vertices.
//! - **Non-owning handles**: a cell never owns the vertices or cells it refers
//!   to; the enclosing structure does.
//! - **Checked contracts**: out-of-range indices, self-neighbors, and lookups of
//!   absent handles are always reported, never silently accepted.
//! - **Compile-time capabilities**: erase counter methods only exist when the
//!   enclosing structure's strategy asks for a counter, and the shared-reference
//!   variants only exist for the atomic counter.
//!
//! # Examples
//!
//! ```rust
//! use tds3::prelude::*;
//!
//! let mut tds: Tds = Tds::new();
//! let v: Vec<VertexKey> = (0..5).map(|_| tds.create_vertex()).collect();
//!
//! let c = tds.create_cell([v[0], v[1], v[2], v[3]]).unwrap();
//! let d = tds.create_cell([v[0], v[2], v[1], v[4]]).unwrap();
//! tds.set_adjacency(c, 3, d, 3).unwrap();
//!
//! let cell = tds.cell(c).unwrap();
//! assert!(cell.has_neighbor(d));
//! assert_eq!(cell.index_of_neighbor(d), Ok(3));
//! assert_eq!(cell.index_of(v[2]), Ok(2));
//! ```

use crate::core::erase_counter::{EraseCounter, SharedEraseCounter, StampedHandle};
use crate::core::placeholder::NoTds;
use crate::core::traits::tds_types::{ConcreteTds, EraseCounterOf, Handle, RebindTds, TdsTypes};
use crate::geometry::kernel::{CircumcenterError, ConstructCircumcenter3};
use std::fmt::{self, Debug};
use thiserror::Error;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Violations of the preconditions of [`Cell`] operations.
///
/// # Examples
///
/// ```rust
/// use tds3::core::cell::CellContractError;
///
/// let err = CellContractError::IndexOutOfRange { index: 4 };
/// assert_eq!(err.to_string(), "Index 4 out of range: cells have slots 0..=3");
/// ```
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CellContractError {
    /// A vertex or neighbor index outside `0..=3`.
    #[error("Index {index} out of range: cells have slots 0..=3")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
    },
    /// Attempted to make a cell its own neighbor.
    #[error("Neighbor {index} would be the cell itself")]
    SelfNeighbor {
        /// The neighbor slot that was being set.
        index: usize,
    },
    /// The queried vertex is not one of the cell's four vertices.
    #[error("Vertex is not a vertex of this cell")]
    VertexNotFound,
    /// The queried cell is not one of the cell's four neighbors.
    #[error("Cell is not a neighbor of this cell")]
    NeighborNotFound,
    /// A vertex could not be resolved to a point.
    #[error("Vertex {index} is null or has no position")]
    UnresolvedVertex {
        /// The vertex slot that could not be resolved.
        index: usize,
    },
    /// The kernel could not construct the circumcenter.
    #[error(transparent)]
    Circumcenter(#[from] CircumcenterError),
}

/// Number of vertices (and neighbors) of a tetrahedral cell.
pub const CELL_SIZE: usize = 4;

#[inline]
const fn check_index(index: usize) -> Result<(), CellContractError> {
    if index < CELL_SIZE {
        Ok(())
    } else {
        Err(CellContractError::IndexOutOfRange { index })
    }
}

// =============================================================================
// CELL STRUCT DEFINITION
// =============================================================================

/// A tetrahedral cell of a triangulation data structure `T`.
///
/// # Properties
///
/// - `vertices`: the four vertex handles; slot `i` is opposite the facet
///   shared with `neighbors[i]`.
/// - `neighbors`: the four adjacent cells, null until linked.
/// - `handle`: this cell's own handle, assigned by the owning container.
/// - `erase_counter`: present (non zero-sized) only if `T`'s strategy uses
///   erase counters.
/// - `data`: scratch payload for algorithms; never interpreted here.
///
/// The default parameter is the placeholder [`NoTds`], which only supports
/// type resolution (see [`crate::core::placeholder`]).
pub struct Cell<T: TdsTypes = NoTds> {
    vertices: [T::VertexHandle; 4],
    neighbors: [T::CellHandle; 4],
    handle: T::CellHandle,
    erase_counter: EraseCounterOf<T>,
    data: T::CellData,
}

impl<T: TdsTypes> Default for Cell<T> {
    fn default() -> Self {
        Self {
            vertices: [<T::VertexHandle as Handle>::null(); 4],
            neighbors: [<T::CellHandle as Handle>::null(); 4],
            handle: <T::CellHandle as Handle>::null(),
            erase_counter: Default::default(),
            data: Default::default(),
        }
    }
}

impl<T: TdsTypes> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            vertices: self.vertices,
            neighbors: self.neighbors,
            handle: self.handle,
            erase_counter: self.erase_counter.clone(),
            data: self.data.clone(),
        }
    }
}

impl<T: TdsTypes> Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("vertices", &self.vertices)
            .field("neighbors", &self.neighbors)
            .field("handle", &self.handle)
            .field("erase_counter", &self.erase_counter)
            .field("data", &self.data)
            .finish()
    }
}

/// Cells compare equal when their vertices, neighbors, and payload match.
/// The own handle and the erase counter are storage bookkeeping and ignored.
impl<T: TdsTypes> PartialEq for Cell<T> {
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices
            && self.neighbors == other.neighbors
            && self.data == other.data
    }
}

impl<T: TdsTypes> RebindTds for Cell<T> {
    type Tds = T;
    type Rebound<T2: TdsTypes> = Cell<T2>;
}

impl Cell<NoTds> {
    /// Creates the data-free placeholder cell.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::default()
    }
}

// =============================================================================
// CELL IMPLEMENTATION - CORE METHODS
// =============================================================================

impl<T: ConcreteTds> Cell<T> {
    /// Creates a cell whose vertices and neighbors are all null.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cell with the given vertices and null neighbors.
    #[must_use]
    pub fn with_vertices(vertices: [T::VertexHandle; 4]) -> Self {
        Self {
            vertices,
            ..Self::default()
        }
    }

    /// Creates a cell with the given vertices and neighbors.
    ///
    /// A freshly created cell has no handle yet, so no neighbor can be itself.
    #[must_use]
    pub fn with_vertices_and_neighbors(
        vertices: [T::VertexHandle; 4],
        neighbors: [T::CellHandle; 4],
    ) -> Self {
        Self {
            vertices,
            neighbors,
            ..Self::default()
        }
    }

    // -------------------------------------------------------------------------
    // Vertex access
    // -------------------------------------------------------------------------

    /// Returns the vertex in slot `i` (possibly null).
    ///
    /// # Panics
    ///
    /// Panics if `i > 3`.
    #[inline]
    #[must_use]
    pub fn vertex(&self, i: usize) -> T::VertexHandle {
        self.vertices[i]
    }

    /// Returns all four vertex handles.
    #[inline]
    #[must_use]
    pub const fn vertices(&self) -> &[T::VertexHandle; 4] {
        &self.vertices
    }

    /// Returns `true` if `v` is one of the four vertices.
    #[inline]
    #[must_use]
    pub fn has_vertex(&self, v: T::VertexHandle) -> bool {
        self.vertices.contains(&v)
    }

    /// Returns the slot holding `v`, or `None` if `v` is not a vertex of this cell.
    #[inline]
    #[must_use]
    pub fn vertex_index(&self, v: T::VertexHandle) -> Option<usize> {
        self.vertices.iter().position(|&w| w == v)
    }

    /// Returns the slot holding `v`.
    ///
    /// # Errors
    ///
    /// Returns [`CellContractError::VertexNotFound`] if `v` is not a vertex of this cell.
    #[inline]
    pub fn index_of(&self, v: T::VertexHandle) -> Result<usize, CellContractError> {
        self.vertex_index(v).ok_or(CellContractError::VertexNotFound)
    }

    /// Returns the three vertices of the facet opposite `vertex(i)`, in slot order.
    ///
    /// # Errors
    ///
    /// Returns [`CellContractError::IndexOutOfRange`] if `i > 3`.
    pub fn facet_vertices(&self, i: usize) -> Result<[T::VertexHandle; 3], CellContractError> {
        check_index(i)?;
        let mut facet = [<T::VertexHandle as Handle>::null(); 3];
        let mut k = 0;
        for (j, &v) in self.vertices.iter().enumerate() {
            if j != i {
                facet[k] = v;
                k += 1;
            }
        }
        Ok(facet)
    }

    // -------------------------------------------------------------------------
    // Neighbor access
    // -------------------------------------------------------------------------

    /// Returns the neighbor across the facet opposite `vertex(i)` (possibly null).
    ///
    /// # Panics
    ///
    /// Panics if `i > 3`.
    #[inline]
    #[must_use]
    pub fn neighbor(&self, i: usize) -> T::CellHandle {
        self.neighbors[i]
    }

    /// Returns all four neighbor handles.
    #[inline]
    #[must_use]
    pub const fn neighbors(&self) -> &[T::CellHandle; 4] {
        &self.neighbors
    }

    /// Returns `true` if `n` is one of the four neighbors.
    #[inline]
    #[must_use]
    pub fn has_neighbor(&self, n: T::CellHandle) -> bool {
        self.neighbors.contains(&n)
    }

    /// Returns the slot holding neighbor `n`, or `None` if `n` is not a neighbor.
    #[inline]
    #[must_use]
    pub fn neighbor_index(&self, n: T::CellHandle) -> Option<usize> {
        self.neighbors.iter().position(|&m| m == n)
    }

    /// Returns the slot holding neighbor `n`.
    ///
    /// # Errors
    ///
    /// Returns [`CellContractError::NeighborNotFound`] if `n` is not a neighbor.
    #[inline]
    pub fn index_of_neighbor(&self, n: T::CellHandle) -> Result<usize, CellContractError> {
        self.neighbor_index(n).ok_or(CellContractError::NeighborNotFound)
    }

    /// Given that `other` is the neighbor across facet `i`, returns the index of
    /// `other`'s vertex opposite the same facet.
    ///
    /// Returns `None` if `i > 3` or if `other` does not contain exactly the
    /// three facet vertices.
    #[must_use]
    pub fn mirror_index(&self, i: usize, other: &Self) -> Option<usize> {
        let facet = self.facet_vertices(i).ok()?;
        let mut mirror = None;
        for (j, v) in other.vertices.iter().enumerate() {
            if !facet.contains(v) {
                if mirror.is_some() {
                    return None;
                }
                mirror = Some(j);
            }
        }
        mirror
    }

    // -------------------------------------------------------------------------
    // Setting
    // -------------------------------------------------------------------------

    /// Sets the vertex in slot `i`.
    ///
    /// # Errors
    ///
    /// Returns [`CellContractError::IndexOutOfRange`] if `i > 3`.
    #[inline]
    pub fn set_vertex(&mut self, i: usize, v: T::VertexHandle) -> Result<(), CellContractError> {
        check_index(i)?;
        self.vertices[i] = v;
        Ok(())
    }

    /// Replaces all four vertices.
    #[inline]
    pub fn set_vertices(&mut self, vertices: [T::VertexHandle; 4]) {
        self.vertices = vertices;
    }

    /// Resets all four vertices to null.
    #[inline]
    pub fn clear_vertices(&mut self) {
        self.vertices = [<T::VertexHandle as Handle>::null(); 4];
    }

    /// Sets the neighbor in slot `i`.
    ///
    /// # Errors
    ///
    /// Returns [`CellContractError::IndexOutOfRange`] if `i > 3` and
    /// [`CellContractError::SelfNeighbor`] if `n` is this cell's own handle.
    /// The cell is unchanged on error.
    #[inline]
    pub fn set_neighbor(&mut self, i: usize, n: T::CellHandle) -> Result<(), CellContractError> {
        check_index(i)?;
        self.check_not_self(i, n)?;
        self.neighbors[i] = n;
        Ok(())
    }

    /// Replaces all four neighbors.
    ///
    /// # Errors
    ///
    /// Returns [`CellContractError::SelfNeighbor`] for the first slot that would
    /// hold this cell's own handle. No slot is modified on error.
    pub fn set_neighbors(
        &mut self,
        neighbors: [T::CellHandle; 4],
    ) -> Result<(), CellContractError> {
        for (i, &n) in neighbors.iter().enumerate() {
            self.check_not_self(i, n)?;
        }
        self.neighbors = neighbors;
        Ok(())
    }

    /// Resets all four neighbors to null.
    #[inline]
    pub fn clear_neighbors(&mut self) {
        self.neighbors = [<T::CellHandle as Handle>::null(); 4];
    }

    #[inline]
    fn check_not_self(&self, i: usize, n: T::CellHandle) -> Result<(), CellContractError> {
        if !n.is_null() && n == self.handle {
            return Err(CellContractError::SelfNeighbor { index: i });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Identity and payload
    // -------------------------------------------------------------------------

    /// This cell's own handle, or null if it has not been placed in a container.
    #[inline]
    #[must_use]
    pub const fn handle(&self) -> T::CellHandle {
        self.handle
    }

    /// Records this cell's own handle. For use by the owning container.
    ///
    /// Self-neighbor checks compare against this handle. In a versioned
    /// container such as
    /// [`CompactContainer`](crate::core::collections::CompactContainer) the key
    /// depends on the erase counter: changing the counter of a stored cell
    /// re-versions its key and leaves this handle stale until it is recorded
    /// again.
    #[inline]
    pub fn set_handle(&mut self, handle: T::CellHandle) {
        self.handle = handle;
    }

    /// Scratch payload reserved for algorithms running on the structure.
    #[inline]
    #[must_use]
    pub const fn tds_data(&self) -> &T::CellData {
        &self.data
    }

    /// Mutable access to the algorithm payload.
    #[inline]
    pub const fn tds_data_mut(&mut self) -> &mut T::CellData {
        &mut self.data
    }

    // -------------------------------------------------------------------------
    // Geometry forwarding
    // -------------------------------------------------------------------------

    /// Computes the circumcenter of this cell with `kernel`.
    ///
    /// `position` resolves a vertex handle to its point; vertex positions live
    /// outside the combinatorial structure.
    ///
    /// # Errors
    ///
    /// Returns [`CellContractError::UnresolvedVertex`] if a vertex is null or
    /// `position` returns `None` for it, and [`CellContractError::Circumcenter`]
    /// if the kernel rejects the four points.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tds3::prelude::*;
    ///
    /// let mut tds: Tds = Tds::new();
    /// let v: Vec<VertexKey> = (0..4).map(|_| tds.create_vertex()).collect();
    /// let c = tds.create_cell([v[0], v[1], v[2], v[3]]).unwrap();
    ///
    /// let mut points = VertexSecondaryMap::new();
    /// points.insert(v[0], [0.0, 0.0, 0.0]);
    /// points.insert(v[1], [2.0, 0.0, 0.0]);
    /// points.insert(v[2], [0.0, 2.0, 0.0]);
    /// points.insert(v[3], [0.0, 0.0, 2.0]);
    ///
    /// let center = tds
    ///     .cell(c)
    ///     .unwrap()
    ///     .circumcenter(&FastKernel, |vk| points.get(vk).copied())
    ///     .unwrap();
    /// for coord in center {
    ///     assert!((coord - 1.0).abs() < 1e-12);
    /// }
    /// ```
    pub fn circumcenter<K, F>(
        &self,
        kernel: &K,
        mut position: F,
    ) -> Result<K::Point, CellContractError>
    where
        K: ConstructCircumcenter3,
        F: FnMut(T::VertexHandle) -> Option<K::Point>,
    {
        let mut resolve = |index: usize| {
            let v = self.vertices[index];
            if v.is_null() {
                return Err(CellContractError::UnresolvedVertex { index });
            }
            position(v).ok_or(CellContractError::UnresolvedVertex { index })
        };
        let p0 = resolve(0)?;
        let p1 = resolve(1)?;
        let p2 = resolve(2)?;
        let p3 = resolve(3)?;
        Ok(kernel.construct_circumcenter([&p0, &p1, &p2, &p3])?)
    }
}

// =============================================================================
// ERASE COUNTER CAPABILITY
// =============================================================================

impl<T: ConcreteTds> Cell<T>
where
    EraseCounterOf<T>: EraseCounter,
{
    /// Returns the erase generation of this cell's storage slot.
    #[inline]
    #[must_use]
    pub fn get_erase_counter(&self) -> u32 {
        self.erase_counter.get()
    }

    /// Overwrites the erase generation.
    #[inline]
    pub fn set_erase_counter(&mut self, value: u32) {
        self.erase_counter.set(value);
    }

    /// Advances the erase generation by one.
    #[inline]
    pub fn increment_erase_counter(&mut self) {
        self.erase_counter.increment();
    }

    /// Captures this cell's handle together with its current generation.
    #[inline]
    #[must_use]
    pub fn stamp(&self) -> StampedHandle<T::CellHandle> {
        StampedHandle::new(self.handle, self.get_erase_counter())
    }

    /// Returns `true` if `stamp` names this cell and its generation still matches.
    #[inline]
    #[must_use]
    pub fn is_current(&self, stamp: &StampedHandle<T::CellHandle>) -> bool {
        stamp.handle() == self.handle && !stamp.is_stale(self.get_erase_counter())
    }
}

impl<T: ConcreteTds> Cell<T>
where
    EraseCounterOf<T>: SharedEraseCounter,
{
    /// Atomically advances the erase generation through a shared reference,
    /// returning the previous value.
    #[inline]
    pub fn fetch_increment_erase_counter(&self) -> u32 {
        self.erase_counter.fetch_increment()
    }

    /// Atomically overwrites the erase generation through a shared reference.
    #[inline]
    pub fn store_erase_counter(&self, value: u32) {
        self.erase_counter.store(value);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::erase_counter::{
        Parallel, Sequential, WithEraseCounter, WithoutEraseCounter,
    };
    use crate::core::triangulation_data_structure::{CellKey, VertexKey};
    use crate::geometry::kernel::FastKernel;
    use approx::assert_relative_eq;
    use slotmap::SlotMap;
    use std::thread;

    // Minimal enclosing structures used to instantiate cells directly.

    #[derive(Debug)]
    struct PlainTds;

    impl TdsTypes for PlainTds {
        type VertexHandle = VertexKey;
        type CellHandle = CellKey;
        type Concurrency = Sequential;
        type CellStrategy = WithoutEraseCounter;
        type CellData = ();
    }
    impl ConcreteTds for PlainTds {}

    #[derive(Debug)]
    struct CountingTds;

    impl TdsTypes for CountingTds {
        type VertexHandle = VertexKey;
        type CellHandle = CellKey;
        type Concurrency = Sequential;
        type CellStrategy = WithEraseCounter;
        type CellData = u8;
    }
    impl ConcreteTds for CountingTds {}

    #[derive(Debug)]
    struct ParallelTds;

    impl TdsTypes for ParallelTds {
        type VertexHandle = VertexKey;
        type CellHandle = CellKey;
        type Concurrency = Parallel;
        type CellStrategy = WithEraseCounter;
        type CellData = ();
    }
    impl ConcreteTds for ParallelTds {}

    fn vertex_keys(n: usize) -> Vec<VertexKey> {
        let mut map: SlotMap<VertexKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn cell_keys(n: usize) -> Vec<CellKey> {
        let mut map: SlotMap<CellKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    // =============================================================================
    // CONSTRUCTION TESTS
    // =============================================================================

    #[test]
    fn test_new_cell_is_all_null() {
        let cell: Cell<PlainTds> = Cell::new();
        assert!(cell.vertices().iter().all(Handle::is_null));
        assert!(cell.neighbors().iter().all(Handle::is_null));
        assert!(cell.handle().is_null());
    }

    #[test]
    fn test_with_vertices_and_neighbors() {
        let v = vertex_keys(4);
        let n = cell_keys(4);
        let cell: Cell<PlainTds> =
            Cell::with_vertices_and_neighbors([v[0], v[1], v[2], v[3]], [n[0], n[1], n[2], n[3]]);
        for i in 0..4 {
            assert_eq!(cell.vertex(i), v[i]);
            assert_eq!(cell.neighbor(i), n[i]);
        }

        let only_vertices: Cell<PlainTds> = Cell::with_vertices([v[0], v[1], v[2], v[3]]);
        assert_eq!(only_vertices.vertices(), cell.vertices());
        assert!(only_vertices.neighbors().iter().all(Handle::is_null));
    }

    // =============================================================================
    // VERTEX TESTS
    // =============================================================================

    #[test]
    fn test_set_vertex_then_vertex() {
        let v = vertex_keys(4);
        let mut cell: Cell<PlainTds> = Cell::new();
        for (i, &vk) in v.iter().enumerate() {
            cell.set_vertex(i, vk).unwrap();
            assert_eq!(cell.vertex(i), vk);
        }
    }

    #[test]
    fn test_set_vertices_and_lookups() {
        let v = vertex_keys(5);
        let mut cell: Cell<PlainTds> = Cell::new();
        cell.set_vertices([v[0], v[1], v[2], v[3]]);

        for (k, &vk) in v.iter().take(4).enumerate() {
            assert!(cell.has_vertex(vk));
            assert_eq!(cell.vertex_index(vk), Some(k));
            assert_eq!(cell.index_of(vk), Ok(k));
        }
        assert!(!cell.has_vertex(v[4]));
        assert_eq!(cell.vertex_index(v[4]), None);
    }

    #[test]
    fn test_index_of_absent_vertex_is_an_error() {
        let v = vertex_keys(5);
        let cell: Cell<PlainTds> = Cell::with_vertices([v[0], v[1], v[2], v[3]]);
        // Must not fall back to the last slot.
        assert_eq!(cell.index_of(v[4]), Err(CellContractError::VertexNotFound));
    }

    #[test]
    fn test_set_vertex_out_of_range() {
        let v = vertex_keys(1);
        let mut cell: Cell<PlainTds> = Cell::new();
        assert_eq!(
            cell.set_vertex(4, v[0]),
            Err(CellContractError::IndexOutOfRange { index: 4 })
        );
        assert!(cell.vertices().iter().all(Handle::is_null));
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn test_vertex_out_of_range_panics() {
        let cell: Cell<PlainTds> = Cell::new();
        let _ = cell.vertex(4);
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn test_neighbor_out_of_range_panics() {
        let cell: Cell<PlainTds> = Cell::new();
        let _ = cell.neighbor(7);
    }

    #[test]
    fn test_clear_vertices() {
        let v = vertex_keys(4);
        let mut cell: Cell<PlainTds> = Cell::with_vertices([v[0], v[1], v[2], v[3]]);
        cell.clear_vertices();
        assert!(cell.vertices().iter().all(Handle::is_null));
    }

    #[test]
    fn test_facet_vertices() {
        let v = vertex_keys(4);
        let cell: Cell<PlainTds> = Cell::with_vertices([v[0], v[1], v[2], v[3]]);
        assert_eq!(cell.facet_vertices(0), Ok([v[1], v[2], v[3]]));
        assert_eq!(cell.facet_vertices(2), Ok([v[0], v[1], v[3]]));
        assert_eq!(cell.facet_vertices(3), Ok([v[0], v[1], v[2]]));
        assert_eq!(
            cell.facet_vertices(4),
            Err(CellContractError::IndexOutOfRange { index: 4 })
        );
    }

    // =============================================================================
    // NEIGHBOR TESTS
    // =============================================================================

    #[test]
    fn test_set_neighbors_and_lookups() {
        let n = cell_keys(5);
        let mut cell: Cell<PlainTds> = Cell::new();
        cell.set_neighbors([n[0], n[1], n[2], n[3]]).unwrap();

        for (i, &nk) in n.iter().take(4).enumerate() {
            assert_eq!(cell.neighbor(i), nk);
            assert!(cell.has_neighbor(nk));
            assert_eq!(cell.neighbor_index(nk), Some(i));
            assert_eq!(cell.index_of_neighbor(nk), Ok(i));
        }
        assert!(!cell.has_neighbor(n[4]));
        assert_eq!(
            cell.index_of_neighbor(n[4]),
            Err(CellContractError::NeighborNotFound)
        );

        cell.clear_neighbors();
        assert!(cell.neighbors().iter().all(Handle::is_null));
    }

    #[test]
    fn test_set_neighbor_rejects_self_for_every_slot() {
        let n = cell_keys(2);
        let mut cell: Cell<PlainTds> = Cell::new();
        cell.set_handle(n[0]);

        for i in 0..4 {
            assert_eq!(
                cell.set_neighbor(i, n[0]),
                Err(CellContractError::SelfNeighbor { index: i })
            );
            assert!(cell.neighbor(i).is_null());
            cell.set_neighbor(i, n[1]).unwrap();
        }
    }

    #[test]
    fn test_set_neighbors_rejects_self_without_partial_update() {
        let n = cell_keys(4);
        let mut cell: Cell<PlainTds> = Cell::new();
        cell.set_handle(n[0]);

        assert_eq!(
            cell.set_neighbors([n[1], n[2], n[0], n[3]]),
            Err(CellContractError::SelfNeighbor { index: 2 })
        );
        assert!(cell.neighbors().iter().all(Handle::is_null));
    }

    #[test]
    fn test_null_neighbor_is_never_a_self_loop() {
        let mut cell: Cell<PlainTds> = Cell::new();
        assert!(cell.set_neighbor(0, CellKey::null()).is_ok());
    }

    #[test]
    fn test_set_neighbor_out_of_range() {
        let n = cell_keys(1);
        let mut cell: Cell<PlainTds> = Cell::new();
        assert_eq!(
            cell.set_neighbor(9, n[0]),
            Err(CellContractError::IndexOutOfRange { index: 9 })
        );
    }

    #[test]
    fn test_mirror_index() {
        let v = vertex_keys(5);
        // c = (v0, v1, v2, v3); d shares facet (v0, v1, v2) and has v4 in slot 1.
        let c: Cell<PlainTds> = Cell::with_vertices([v[0], v[1], v[2], v[3]]);
        let d: Cell<PlainTds> = Cell::with_vertices([v[2], v[4], v[0], v[1]]);
        assert_eq!(c.mirror_index(3, &d), Some(1));
        assert_eq!(d.mirror_index(1, &c), Some(3));
        // Facet 0 of c is (v1, v2, v3), which d does not contain.
        assert_eq!(c.mirror_index(0, &d), None);
        assert_eq!(c.mirror_index(4, &d), None);
    }

    // =============================================================================
    // ERASE COUNTER TESTS
    // =============================================================================

    #[test]
    fn test_erase_counter_sequential() {
        let mut cell: Cell<CountingTds> = Cell::new();
        assert_eq!(cell.get_erase_counter(), 0);
        for k in 1..=5 {
            cell.increment_erase_counter();
            assert_eq!(cell.get_erase_counter(), k);
        }
        cell.set_erase_counter(100);
        assert_eq!(cell.get_erase_counter(), 100);
    }

    #[test]
    fn test_erase_counter_does_not_affect_adjacency() {
        let v = vertex_keys(4);
        let n = cell_keys(4);
        let mut cell: Cell<CountingTds> =
            Cell::with_vertices_and_neighbors([v[0], v[1], v[2], v[3]], [n[0], n[1], n[2], n[3]]);
        let before = cell.clone();
        cell.increment_erase_counter();
        assert_eq!(cell, before);
        assert_eq!(cell.vertices(), before.vertices());
    }

    #[test]
    fn test_stamp_detects_erasure() {
        let n = cell_keys(1);
        let mut cell: Cell<CountingTds> = Cell::new();
        cell.set_handle(n[0]);
        let stamp = cell.stamp();
        assert!(cell.is_current(&stamp));

        cell.increment_erase_counter();
        assert!(!cell.is_current(&stamp));
        assert!(cell.is_current(&cell.stamp()));
    }

    #[test]
    fn test_erase_counter_parallel() {
        const THREADS: u32 = 12;

        let cell: Cell<ParallelTds> = Cell::new();
        assert_eq!(cell.get_erase_counter(), 0);
        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    let seen = cell.fetch_increment_erase_counter();
                    assert!(seen < THREADS);
                });
            }
        });
        assert_eq!(cell.get_erase_counter(), THREADS);

        cell.store_erase_counter(3);
        assert_eq!(cell.get_erase_counter(), 3);
    }

    #[test]
    fn test_counter_size_follows_strategy() {
        use std::mem::size_of;
        // Nine handles and nothing else when the strategy opts out.
        assert_eq!(size_of::<Cell<PlainTds>>(), 9 * size_of::<CellKey>());
        assert!(size_of::<Cell<CountingTds>>() > size_of::<Cell<PlainTds>>());
    }

    // =============================================================================
    // PAYLOAD, EQUALITY, GEOMETRY
    // =============================================================================

    #[test]
    fn test_tds_data_is_opaque_scratch() {
        let mut cell: Cell<CountingTds> = Cell::new();
        assert_eq!(*cell.tds_data(), 0);
        *cell.tds_data_mut() = 7;
        assert_eq!(*cell.tds_data(), 7);

        let other: Cell<CountingTds> = Cell::new();
        assert_ne!(cell, other);
    }

    #[test]
    fn test_equality_ignores_handle() {
        let v = vertex_keys(4);
        let n = cell_keys(1);
        let a: Cell<PlainTds> = Cell::with_vertices([v[0], v[1], v[2], v[3]]);
        let mut b = a.clone();
        b.set_handle(n[0]);
        assert_eq!(a, b);
        b.set_vertex(0, v[1]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_circumcenter_forwards_to_kernel() {
        let v = vertex_keys(4);
        let cell: Cell<PlainTds> = Cell::with_vertices([v[0], v[1], v[2], v[3]]);
        let points = [
            [1.0, 1.0, 1.0],
            [1.0, -1.0, -1.0],
            [-1.0, 1.0, -1.0],
            [-1.0, -1.0, 1.0],
        ];
        let center = cell
            .circumcenter(&FastKernel, |vk| {
                v.iter().position(|&w| w == vk).map(|i| points[i])
            })
            .unwrap();
        for coord in center {
            assert_relative_eq!(coord, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_circumcenter_reports_unresolved_vertex() {
        let v = vertex_keys(3);
        let mut cell: Cell<PlainTds> = Cell::new();
        cell.set_vertex(0, v[0]).unwrap();
        cell.set_vertex(1, v[1]).unwrap();
        cell.set_vertex(2, v[2]).unwrap();

        let result = cell.circumcenter(&FastKernel, |_| Some([0.0; 3]));
        assert_eq!(result, Err(CellContractError::UnresolvedVertex { index: 3 }));

        cell.set_vertex(3, v[0]).unwrap();
        let result = cell.circumcenter(&FastKernel, |vk| (vk != v[1]).then_some([0.0; 3]));
        assert_eq!(result, Err(CellContractError::UnresolvedVertex { index: 1 }));
    }

    #[test]
    fn test_circumcenter_reports_flat_cell() {
        let v = vertex_keys(4);
        let cell: Cell<PlainTds> = Cell::with_vertices([v[0], v[1], v[2], v[3]]);
        let points = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ];
        let result = cell.circumcenter(&FastKernel, |vk| {
            v.iter().position(|&w| w == vk).map(|i| points[i])
        });
        assert_eq!(
            result,
            Err(CellContractError::Circumcenter(CircumcenterError::Degenerate))
        );
    }
}
