//! Reference 3D triangulation data structure.
//!
//! [`Tds`] stores vertices and tetrahedral cells and maintains the adjacency
//! between cells. It is purely combinatorial: vertices carry no coordinates,
//! only the handle of one incident cell. Geometry lives outside, typically in a
//! [`VertexSecondaryMap`](crate::core::collections::VertexSecondaryMap).
//!
//! # Two-step cell binding
//!
//! A `Tds` is parameterized by a cell type `CB` named against the placeholder
//! (`Cell` by default) and a [`ConcurrencyTag`]. The cell type actually stored
//! is `CB` rebound to the structure itself, [`CellOf<CB, C>`]:
//!
//! ```rust
//! use std::any::TypeId;
//! use tds3::prelude::*;
//!
//! assert_eq!(TypeId::of::<CellOf<Cell>>(), TypeId::of::<Cell<Tds>>());
//! assert_eq!(
//!     TypeId::of::<CellOf<Cell, Parallel>>(),
//!     TypeId::of::<Cell<Tds<Cell, Parallel>>>()
//! );
//! ```
//!
//! # Invariants
//!
//! A structure passing [`Tds::validate`] satisfies:
//!
//! - every cell has four live, pairwise distinct vertices;
//! - every non-null neighbor is a live cell that points back;
//! - two adjacent cells agree on their shared facet: `neighbor(i)` of one cell
//!   contains exactly the three vertices other than `vertex(i)`;
//! - a vertex's incident cell, if any, is live and contains the vertex.
//!
//! Cells live in a [`CompactContainer`], so their keys are versioned: a key
//! taken before [`Tds::delete_cell`] does not resolve to the cell that later
//! reuses the slot.
//!
//! # Examples
//!
//! ```rust
//! use tds3::prelude::*;
//!
//! let mut tds: Tds = Tds::new();
//! let v: Vec<VertexKey> = (0..5).map(|_| tds.create_vertex()).collect();
//! let a = tds.create_cell([v[0], v[1], v[2], v[3]]).unwrap();
//! let b = tds.create_cell([v[4], v[2], v[1], v[0]]).unwrap();
//!
//! tds.assign_neighbors().unwrap();
//! assert_eq!(tds.cell(a).unwrap().neighbor(3), b);
//! assert_eq!(tds.mirror_index(a, 3).unwrap(), 0);
//! assert!(tds.validate().is_ok());
//!
//! tds.delete_cell(b).unwrap();
//! assert!(tds.cell(a).unwrap().neighbor(3).is_null());
//! assert!(!tds.contains_cell(b));
//! ```

use crate::core::cell::{CELL_SIZE, Cell, CellContractError};
use crate::core::collections::{
    CellKeyIndexMap, CompactContainer, CompactContainerError, FastHashMap, MAX_SLOTS,
    StorageMap, VertexKeyIndexMap,
};
use crate::core::erase_counter::{ConcurrencyTag, Sequential, WithEraseCounter};
use crate::core::traits::tds_cell::TdsCell;
use crate::core::traits::tds_types::{ConcreteTds, Handle, RebindTds, TdsTypes};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use thiserror::Error;
use tracing::{debug, warn};

// =============================================================================
// KEYS
// =============================================================================

new_key_type! {
    /// Key type for accessing vertices of a [`Tds`].
    pub struct VertexKey;
}

new_key_type! {
    /// Key type for accessing cells of a [`Tds`].
    ///
    /// Cell keys carry the erase generation of their slot and stop resolving
    /// once the cell is deleted.
    pub struct CellKey;
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by [`Tds`] operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TdsError {
    /// The vertex key does not resolve.
    #[error("Vertex {vertex:?} not found")]
    VertexNotFound {
        /// The missing vertex.
        vertex: VertexKey,
    },
    /// The cell key does not resolve (never created, deleted, or stale).
    #[error("Cell {cell:?} not found")]
    CellNotFound {
        /// The missing cell.
        cell: CellKey,
    },
    /// A vertex was given more than once for the same cell.
    #[error("Vertex {vertex:?} appears more than once in a cell")]
    DuplicateVertex {
        /// The repeated vertex.
        vertex: VertexKey,
    },
    /// Two cells were linked across facets with different vertices.
    #[error(
        "Facet {index} of cell {cell:?} does not match facet {neighbor_index} of cell {neighbor:?}"
    )]
    FacetMismatch {
        /// First cell.
        cell: CellKey,
        /// Facet index in the first cell.
        index: usize,
        /// Second cell.
        neighbor: CellKey,
        /// Facet index in the second cell.
        neighbor_index: usize,
    },
    /// The facet has no neighbor across it.
    #[error("Cell {cell:?} has no neighbor across facet {index}")]
    NoNeighbor {
        /// The cell.
        cell: CellKey,
        /// The facet index.
        index: usize,
    },
    /// More than two cells share a facet.
    #[error("Facet shared by {count} cells; at most two are allowed")]
    NonManifoldFacet {
        /// Number of cells found on the facet.
        count: usize,
    },
    /// A cell precondition was violated.
    #[error("Cell contract violated: {0}")]
    Contract(#[from] CellContractError),
    /// The cell storage rejected an insertion.
    #[error("Cell storage error: {0}")]
    Container(#[from] CompactContainerError),
    /// A cell's extra state could not be written or read.
    #[error("Cell stream error: {message}")]
    Io {
        /// The underlying I/O error message.
        message: String,
    },
    /// A snapshot refers to vertices or cells it does not contain.
    #[error("Invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of the problem.
        message: String,
    },
    /// A cell's `read_extra` did not consume all of its recorded bytes.
    #[error("Cell record {record} has {remaining} unread extra bytes")]
    TrailingBytes {
        /// Index of the cell record.
        record: usize,
        /// Number of bytes left over.
        remaining: usize,
    },
}

impl From<io::Error> for TdsError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Structural invariant violations found by [`Tds::validate`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TdsValidationError {
    /// The cell's own `is_valid` check failed.
    #[error("Cell {cell:?} failed its own validity check")]
    InvalidCell {
        /// The cell.
        cell: CellKey,
    },
    /// A vertex slot is null.
    #[error("Cell {cell:?} has a null vertex in slot {index}")]
    NullVertex {
        /// The cell.
        cell: CellKey,
        /// The vertex slot.
        index: usize,
    },
    /// A vertex key does not resolve.
    #[error("Cell {cell:?} refers to missing vertex {vertex:?}")]
    MissingVertex {
        /// The cell.
        cell: CellKey,
        /// The missing vertex.
        vertex: VertexKey,
    },
    /// A vertex appears in two slots of the same cell.
    #[error("Cell {cell:?} contains vertex {vertex:?} twice")]
    DuplicateVertex {
        /// The cell.
        cell: CellKey,
        /// The repeated vertex.
        vertex: VertexKey,
    },
    /// A neighbor key does not resolve.
    #[error("Cell {cell:?} has a dead neighbor in slot {index}")]
    MissingNeighbor {
        /// The cell.
        cell: CellKey,
        /// The neighbor slot.
        index: usize,
    },
    /// A neighbor does not point back.
    #[error("Cell {neighbor:?} (neighbor {index} of {cell:?}) does not point back")]
    NonMutualNeighbor {
        /// The cell.
        cell: CellKey,
        /// The neighbor slot.
        index: usize,
        /// The neighbor.
        neighbor: CellKey,
    },
    /// Two adjacent cells disagree on their shared facet.
    #[error("Cells {cell:?} and {neighbor:?} disagree on facet {index}")]
    FacetMismatch {
        /// The cell.
        cell: CellKey,
        /// The facet index in `cell`.
        index: usize,
        /// The neighbor.
        neighbor: CellKey,
    },
    /// A vertex's incident cell is dead or does not contain it.
    #[error("Vertex {vertex:?} has a stale incident cell")]
    IncidentCell {
        /// The vertex.
        vertex: VertexKey,
    },
}

// =============================================================================
// ALGORITHM SCRATCH DATA
// =============================================================================

/// Conflict state of a cell during an insertion or removal algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictState {
    /// Not visited.
    #[default]
    Clear,
    /// Inside the conflict zone.
    InConflict,
    /// On the boundary of the conflict zone.
    OnBoundary,
    /// Visited and done.
    Processed,
}

/// Per-cell scratch payload of a [`Tds`].
///
/// Algorithms mark cells while walking the structure and reset them when done
/// (see [`Tds::clear_conflict_flags`]). The cell never looks at it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TdsData {
    state: ConflictState,
}

impl TdsData {
    /// The current state.
    #[must_use]
    pub const fn state(&self) -> ConflictState {
        self.state
    }

    /// Resets to [`ConflictState::Clear`].
    pub const fn clear(&mut self) {
        self.state = ConflictState::Clear;
    }

    /// Marks the cell as in conflict.
    pub const fn mark_in_conflict(&mut self) {
        self.state = ConflictState::InConflict;
    }

    /// Marks the cell as on the conflict boundary.
    pub const fn mark_on_boundary(&mut self) {
        self.state = ConflictState::OnBoundary;
    }

    /// Marks the cell as processed.
    pub const fn mark_processed(&mut self) {
        self.state = ConflictState::Processed;
    }

    /// Returns `true` if unmarked.
    #[must_use]
    pub const fn is_clear(&self) -> bool {
        matches!(self.state, ConflictState::Clear)
    }

    /// Returns `true` if marked in conflict.
    #[must_use]
    pub const fn is_in_conflict(&self) -> bool {
        matches!(self.state, ConflictState::InConflict)
    }

    /// Returns `true` if marked on the boundary.
    #[must_use]
    pub const fn is_on_boundary(&self) -> bool {
        matches!(self.state, ConflictState::OnBoundary)
    }

    /// Returns `true` if marked processed.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        matches!(self.state, ConflictState::Processed)
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// One cell of a [`TdsSnapshot`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    /// Vertex indices into `0..vertex_count`, `None` for null slots.
    pub vertices: [Option<usize>; 4],
    /// Neighbor indices into the snapshot's cell list, `None` for null slots.
    pub neighbors: [Option<usize>; 4],
    /// Bytes produced by the cell's `write_extra`.
    pub extra: Vec<u8>,
}

/// Index-based image of a [`Tds`], independent of key values.
///
/// # Examples
///
/// ```rust
/// use tds3::prelude::*;
///
/// let mut tds: Tds = Tds::new();
/// let v: Vec<VertexKey> = (0..4).map(|_| tds.create_vertex()).collect();
/// tds.create_cell([v[0], v[1], v[2], v[3]]).unwrap();
///
/// let snapshot = tds.snapshot().unwrap();
/// let json = serde_json::to_string(&snapshot).unwrap();
/// let back: TdsSnapshot = serde_json::from_str(&json).unwrap();
/// let restored: Tds = Tds::from_snapshot(&back).unwrap();
/// assert_eq!(restored.snapshot().unwrap(), snapshot);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TdsSnapshot {
    /// Number of vertices.
    pub vertex_count: usize,
    /// Cells in storage order.
    pub cells: Vec<CellRecord>,
}

// =============================================================================
// TDS STRUCT DEFINITION
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TdsVertex {
    incident_cell: Option<CellKey>,
}

/// The cell type stored by `Tds<CB, C>`: `CB` rebound to the structure itself.
pub type CellOf<CB, C = Sequential> = <CB as RebindTds>::Rebound<Tds<CB, C>>;

/// A 3D triangulation data structure storing cells of type [`CellOf<CB, C>`].
///
/// - `CB`: the cell type, named against the placeholder. Defaults to [`Cell`].
/// - `C`: [`Sequential`] or [`Parallel`](crate::core::erase_counter::Parallel)
///   bookkeeping. Under `Parallel`, erase counters are atomic and the structure
///   is `Sync`.
///
/// Cells always carry an erase counter ([`WithEraseCounter`]).
pub struct Tds<CB: RebindTds = Cell, C: ConcurrencyTag = Sequential> {
    vertices: StorageMap<VertexKey, TdsVertex>,
    cells: CompactContainer<CellOf<CB, C>>,
    generation: u64,
    _marker: PhantomData<fn() -> (CB, C)>,
}

impl<CB: RebindTds, C: ConcurrencyTag> TdsTypes for Tds<CB, C> {
    type VertexHandle = VertexKey;
    type CellHandle = CellKey;
    type Concurrency = C;
    type CellStrategy = WithEraseCounter;
    type CellData = TdsData;
}

impl<CB: RebindTds, C: ConcurrencyTag> ConcreteTds for Tds<CB, C> {}

impl<CB: RebindTds, C: ConcurrencyTag> Tds<CB, C> {
    /// Creates an empty structure.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertices: StorageMap::with_key(),
            cells: CompactContainer::new(),
            generation: 0,
            _marker: PhantomData,
        }
    }

    /// Number of vertices.
    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of cells.
    #[must_use]
    pub const fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    /// Modification counter, bumped by every structural change.
    ///
    /// Lets dependent caches detect that they need to refresh.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    const fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

impl<CB: RebindTds, C: ConcurrencyTag> Default for Tds<CB, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<CB: RebindTds, C: ConcurrencyTag> fmt::Debug for Tds<CB, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tds")
            .field("vertices", &self.vertices.len())
            .field("cells", &self.cells.len())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<CB, C> Clone for Tds<CB, C>
where
    CB: RebindTds,
    C: ConcurrencyTag,
    CellOf<CB, C>: Clone,
{
    fn clone(&self) -> Self {
        Self {
            vertices: self.vertices.clone(),
            cells: self.cells.clone(),
            generation: self.generation,
            _marker: PhantomData,
        }
    }
}

// =============================================================================
// COMBINATORIAL OPERATIONS
// =============================================================================

impl<CB, C> Tds<CB, C>
where
    CB: RebindTds,
    C: ConcurrencyTag,
    CellOf<CB, C>: TdsCell<Tds = Self>,
{
    // -------------------------------------------------------------------------
    // Vertices
    // -------------------------------------------------------------------------

    /// Adds an isolated vertex and returns its key.
    pub fn create_vertex(&mut self) -> VertexKey {
        let key = self.vertices.insert(TdsVertex::default());
        self.bump_generation();
        key
    }

    /// Returns `true` if `v` is a vertex of this structure.
    #[must_use]
    pub fn contains_vertex(&self, v: VertexKey) -> bool {
        self.vertices.contains_key(v)
    }

    /// Iterates over vertex keys.
    pub fn vertex_keys(&self) -> impl Iterator<Item = VertexKey> + '_ {
        self.vertices.keys()
    }

    /// One cell containing `v`, or `None` if `v` is isolated or unknown.
    #[must_use]
    pub fn incident_cell(&self, v: VertexKey) -> Option<CellKey> {
        self.vertices.get(v).and_then(|vertex| vertex.incident_cell)
    }

    /// Iterates over all cells containing `v`.
    pub fn cells_containing_vertex(&self, v: VertexKey) -> impl Iterator<Item = CellKey> + '_ {
        self.cells
            .iter()
            .filter(move |(_, cell)| cell.base().has_vertex(v))
            .map(|(key, _)| key)
    }

    // -------------------------------------------------------------------------
    // Cells
    // -------------------------------------------------------------------------

    /// Creates a cell on four vertices, with null neighbors.
    ///
    /// # Errors
    ///
    /// Returns [`TdsError::VertexNotFound`] for an unknown vertex,
    /// [`TdsError::DuplicateVertex`] if a vertex is repeated, and
    /// [`TdsError::Container`] if cell storage is full.
    pub fn create_cell(&mut self, vertices: [VertexKey; 4]) -> Result<CellKey, TdsError> {
        for (i, &v) in vertices.iter().enumerate() {
            if !self.vertices.contains_key(v) {
                return Err(TdsError::VertexNotFound { vertex: v });
            }
            if vertices[..i].contains(&v) {
                return Err(TdsError::DuplicateVertex { vertex: v });
            }
        }

        let mut cell = <CellOf<CB, C>>::default();
        cell.base_mut().set_vertices(vertices);
        let key = self.cells.insert(cell)?;

        for v in vertices {
            if let Some(vertex) = self.vertices.get_mut(v)
                && vertex.incident_cell.is_none()
            {
                vertex.incident_cell = Some(key);
            }
        }
        self.bump_generation();
        Ok(key)
    }

    /// Deletes a cell and returns it.
    ///
    /// Neighbors pointing at the deleted cell are reset to null, and vertices
    /// whose incident cell it was are moved to another cell containing them.
    ///
    /// # Errors
    ///
    /// Returns [`TdsError::CellNotFound`] if `key` does not resolve.
    pub fn delete_cell(&mut self, key: CellKey) -> Result<CellOf<CB, C>, TdsError> {
        let removed = self
            .cells
            .erase(key)
            .ok_or(TdsError::CellNotFound { cell: key })?;
        let base = removed.base();

        for &n in base.neighbors() {
            if n.is_null() {
                continue;
            }
            if let Some(neighbor) = self.cells.get_mut(n) {
                let neighbor = neighbor.base_mut();
                if let Some(j) = neighbor.neighbor_index(key) {
                    neighbor.set_neighbor(j, CellKey::null())?;
                }
            }
        }

        for (i, &v) in base.vertices().iter().enumerate() {
            let orphaned = self
                .vertices
                .get(v)
                .is_some_and(|vertex| vertex.incident_cell == Some(key));
            if !orphaned {
                continue;
            }
            // Any neighbor except the one opposite `v` also contains `v`.
            let replacement = base
                .neighbors()
                .iter()
                .enumerate()
                .filter(|&(j, n)| j != i && !n.is_null())
                .map(|(_, &n)| n)
                .find(|&n| self.cells.get(n).is_some_and(|c| c.base().has_vertex(v)))
                .or_else(|| self.cells_containing_vertex(v).next());
            if let Some(vertex) = self.vertices.get_mut(v) {
                vertex.incident_cell = replacement;
            }
        }

        debug!(cell = ?key, "Deleted cell");
        self.bump_generation();
        Ok(removed)
    }

    /// Returns the cell stored under `key`.
    #[must_use]
    pub fn cell(&self, key: CellKey) -> Option<&CellOf<CB, C>> {
        self.cells.get(key)
    }

    /// Mutable access to the cell stored under `key`.
    ///
    /// Edits made through this reference bypass the structure's bookkeeping;
    /// run [`validate`](Self::validate) afterwards if in doubt. Changing the
    /// cell's erase counter invalidates `key`; [`rekey_cell`](Self::rekey_cell)
    /// recovers the new one.
    #[must_use]
    pub fn cell_mut(&mut self, key: CellKey) -> Option<&mut CellOf<CB, C>> {
        self.cells.get_mut(key)
    }

    /// Re-keys a cell whose erase counter was changed through
    /// [`cell_mut`](Self::cell_mut), and returns its current key.
    ///
    /// The cell's own handle, its neighbors' back-pointers and the incident
    /// cells of its vertices are moved from `old` to the new key, so
    /// self-neighbor checks and [`validate`](Self::validate) see the cell
    /// under its current key again.
    ///
    /// Only the slot of `old` is consulted: if it was vacated and reused, the
    /// key of its current occupant is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TdsError::CellNotFound`] if no cell occupies the slot of `old`.
    pub fn rekey_cell(&mut self, old: CellKey) -> Result<CellKey, TdsError> {
        let new = self
            .cells
            .rekey(old)
            .ok_or(TdsError::CellNotFound { cell: old })?;
        if new == old {
            return Ok(new);
        }
        let Some(cell) = self.cells.get(new) else {
            return Err(TdsError::CellNotFound { cell: new });
        };
        let neighbors = *cell.base().neighbors();
        let vertices = *cell.base().vertices();

        for n in neighbors {
            if let Some(neighbor) = self.cells.get_mut(n) {
                let neighbor = neighbor.base_mut();
                if let Some(j) = neighbor.neighbor_index(old) {
                    neighbor.set_neighbor(j, new)?;
                }
            }
        }
        for v in vertices {
            if let Some(vertex) = self.vertices.get_mut(v)
                && vertex.incident_cell == Some(old)
            {
                vertex.incident_cell = Some(new);
            }
        }
        debug!(old = ?old, new = ?new, "Re-keyed cell");
        self.bump_generation();
        Ok(new)
    }

    /// Returns `true` if `key` resolves to a live cell.
    #[must_use]
    pub fn contains_cell(&self, key: CellKey) -> bool {
        self.cells.contains(key)
    }

    /// Iterates over `(key, cell)` pairs in storage order.
    pub fn cells(&self) -> impl Iterator<Item = (CellKey, &CellOf<CB, C>)> {
        self.cells.iter()
    }

    /// Iterates over cell keys in storage order.
    pub fn cell_keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.cells.keys()
    }

    // -------------------------------------------------------------------------
    // Adjacency
    // -------------------------------------------------------------------------

    /// Makes `c` and `d` neighbors across facet `i` of `c` and facet `j` of `d`.
    ///
    /// # Errors
    ///
    /// - [`TdsError::Contract`] if `i` or `j` is out of range, or if `c == d`.
    /// - [`TdsError::CellNotFound`] if either key does not resolve.
    /// - [`TdsError::FacetMismatch`] unless facet `i` of `c` and facet `j` of
    ///   `d` have the same three vertices.
    pub fn set_adjacency(
        &mut self,
        c: CellKey,
        i: usize,
        d: CellKey,
        j: usize,
    ) -> Result<(), TdsError> {
        for index in [i, j] {
            if index >= CELL_SIZE {
                return Err(CellContractError::IndexOutOfRange { index }.into());
            }
        }
        let cell_c = self.cells.get(c).ok_or(TdsError::CellNotFound { cell: c })?;
        let cell_d = self.cells.get(d).ok_or(TdsError::CellNotFound { cell: d })?;
        if cell_c.base().mirror_index(i, cell_d.base()) != Some(j) {
            return Err(TdsError::FacetMismatch {
                cell: c,
                index: i,
                neighbor: d,
                neighbor_index: j,
            });
        }

        if let Some(cell) = self.cells.get_mut(c) {
            cell.base_mut().set_neighbor(i, d)?;
        }
        if let Some(cell) = self.cells.get_mut(d) {
            cell.base_mut().set_neighbor(j, c)?;
        }
        self.bump_generation();
        Ok(())
    }

    /// Index of `c` in the neighbor list of `c.neighbor(i)`.
    ///
    /// # Errors
    ///
    /// Returns [`TdsError::NoNeighbor`] if facet `i` has no neighbor and
    /// [`TdsError::Contract`] if the neighbor does not point back.
    pub fn mirror_index(&self, c: CellKey, i: usize) -> Result<usize, TdsError> {
        if i >= CELL_SIZE {
            return Err(CellContractError::IndexOutOfRange { index: i }.into());
        }
        let cell = self.cells.get(c).ok_or(TdsError::CellNotFound { cell: c })?;
        let n = cell.base().neighbor(i);
        if n.is_null() {
            return Err(TdsError::NoNeighbor { cell: c, index: i });
        }
        let neighbor = self.cells.get(n).ok_or(TdsError::CellNotFound { cell: n })?;
        Ok(neighbor.base().index_of_neighbor(c)?)
    }

    /// Rebuilds all adjacencies from shared facets.
    ///
    /// Existing neighbor links are discarded. Two cells become neighbors when
    /// they share three vertices; facets found in a single cell get a null
    /// neighbor.
    ///
    /// # Errors
    ///
    /// - [`TdsError::DuplicateVertex`] if a cell repeats a vertex, since two of
    ///   its own facets would then coincide.
    /// - [`TdsError::NonManifoldFacet`] if three or more cells share a facet.
    ///
    /// The structure is unchanged on error.
    pub fn assign_neighbors(&mut self) -> Result<(), TdsError> {
        let mut facet_map: FastHashMap<[VertexKey; 3], Vec<(CellKey, usize)>> =
            FastHashMap::default();
        for (key, cell) in self.cells.iter() {
            let vertices = cell.base().vertices();
            for (i, v) in vertices.iter().enumerate() {
                if vertices[..i].contains(v) {
                    return Err(TdsError::DuplicateVertex { vertex: *v });
                }
            }
            for i in 0..CELL_SIZE {
                let mut facet = cell.base().facet_vertices(i)?;
                facet.sort_unstable();
                let sharing = facet_map.entry(facet).or_default();
                if sharing.len() >= 2 {
                    return Err(TdsError::NonManifoldFacet {
                        count: sharing.len() + 1,
                    });
                }
                sharing.push((key, i));
            }
        }

        // Every cell gets a fresh neighbor array; nothing is written until all
        // facets have been matched.
        let mut links: FastHashMap<CellKey, [CellKey; 4]> = self
            .cells
            .keys()
            .map(|key| (key, [CellKey::null(); 4]))
            .collect();
        for sharing in facet_map.values() {
            if let &[(c, i), (d, j)] = sharing.as_slice() {
                if let Some(neighbors) = links.get_mut(&c) {
                    neighbors[i] = d;
                }
                if let Some(neighbors) = links.get_mut(&d) {
                    neighbors[j] = c;
                }
            }
        }

        for (key, neighbors) in links {
            if let Some(cell) = self.cells.get_mut(key) {
                cell.base_mut().set_neighbors(neighbors)?;
            }
        }
        self.bump_generation();
        Ok(())
    }

    /// Resets every neighbor of every cell to null.
    pub fn clear_all_neighbors(&mut self) {
        for (_, cell) in self.cells.iter_mut() {
            cell.base_mut().clear_neighbors();
        }
        self.bump_generation();
    }

    /// Resets the scratch payload of every cell.
    pub fn clear_conflict_flags(&mut self) {
        for (_, cell) in self.cells.iter_mut() {
            cell.base_mut().tds_data_mut().clear();
        }
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Checks every structural invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), TdsValidationError> {
        self.check(false, 1)
    }

    /// Checks the structure, returning `false` on the first violation.
    ///
    /// `level` 0 only runs cell-local checks (each cell's own `is_valid` and
    /// its vertices); higher levels also check adjacency and incidence. With
    /// `verbose`, the violation is logged.
    #[must_use]
    pub fn is_valid(&self, verbose: bool, level: u32) -> bool {
        match self.check(verbose, level) {
            Ok(()) => true,
            Err(err) => {
                if verbose {
                    warn!(error = %err, "Triangulation data structure is invalid");
                }
                false
            }
        }
    }

    fn check(&self, verbose: bool, level: u32) -> Result<(), TdsValidationError> {
        for (key, cell) in self.cells.iter() {
            if !cell.is_valid(verbose, level) {
                return Err(TdsValidationError::InvalidCell { cell: key });
            }
            let base = cell.base();
            let vertices = base.vertices();
            for (i, &v) in vertices.iter().enumerate() {
                if v.is_null() {
                    return Err(TdsValidationError::NullVertex {
                        cell: key,
                        index: i,
                    });
                }
                if !self.vertices.contains_key(v) {
                    return Err(TdsValidationError::MissingVertex {
                        cell: key,
                        vertex: v,
                    });
                }
                if vertices[..i].contains(&v) {
                    return Err(TdsValidationError::DuplicateVertex {
                        cell: key,
                        vertex: v,
                    });
                }
            }

            if level == 0 {
                continue;
            }
            for (i, &n) in base.neighbors().iter().enumerate() {
                if n.is_null() {
                    continue;
                }
                let neighbor = self
                    .cells
                    .get(n)
                    .ok_or(TdsValidationError::MissingNeighbor {
                        cell: key,
                        index: i,
                    })?;
                let Some(j) = neighbor.base().neighbor_index(key) else {
                    return Err(TdsValidationError::NonMutualNeighbor {
                        cell: key,
                        index: i,
                        neighbor: n,
                    });
                };
                if base.mirror_index(i, neighbor.base()) != Some(j) {
                    return Err(TdsValidationError::FacetMismatch {
                        cell: key,
                        index: i,
                        neighbor: n,
                    });
                }
            }
        }

        if level > 0 {
            for (v, vertex) in self.vertices.iter() {
                if let Some(c) = vertex.incident_cell
                    && !self.cells.get(c).is_some_and(|cell| cell.base().has_vertex(v))
                {
                    return Err(TdsValidationError::IncidentCell { vertex: v });
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Snapshot
    // -------------------------------------------------------------------------

    /// Captures the structure as index-based records.
    ///
    /// Each cell's extra state is captured through its `write_extra` hook.
    ///
    /// # Errors
    ///
    /// Returns [`TdsError::VertexNotFound`] / [`TdsError::CellNotFound`] if a
    /// cell refers to a vertex or neighbor that does not resolve, and
    /// [`TdsError::Io`] if `write_extra` fails.
    pub fn snapshot(&self) -> Result<TdsSnapshot, TdsError> {
        let vertex_index: VertexKeyIndexMap = self
            .vertices
            .keys()
            .enumerate()
            .map(|(i, v)| (v, i))
            .collect();
        let cell_index: CellKeyIndexMap = self
            .cells
            .keys()
            .enumerate()
            .map(|(i, c)| (c, i))
            .collect();

        let mut cells = Vec::with_capacity(self.cells.len());
        for (_, cell) in self.cells.iter() {
            let base = cell.base();
            let mut record = CellRecord::default();
            for (slot, &v) in record.vertices.iter_mut().zip(base.vertices()) {
                if !v.is_null() {
                    *slot = Some(
                        *vertex_index
                            .get(&v)
                            .ok_or(TdsError::VertexNotFound { vertex: v })?,
                    );
                }
            }
            for (slot, &n) in record.neighbors.iter_mut().zip(base.neighbors()) {
                if !n.is_null() {
                    *slot = Some(*cell_index.get(&n).ok_or(TdsError::CellNotFound { cell: n })?);
                }
            }
            cell.write_extra(&mut record.extra)?;
            cells.push(record);
        }

        Ok(TdsSnapshot {
            vertex_count: self.vertices.len(),
            cells,
        })
    }

    /// Rebuilds a structure from a snapshot.
    ///
    /// Each cell's extra state is restored through its `read_extra` hook,
    /// which must consume exactly the recorded bytes. The result is not
    /// validated; call [`validate`](Self::validate) for untrusted input.
    ///
    /// # Errors
    ///
    /// - [`TdsError::InvalidSnapshot`] for out-of-range vertex or cell indices,
    ///   or for more vertices or cells than [`MAX_SLOTS`] (checked before
    ///   anything is allocated).
    /// - [`TdsError::TrailingBytes`] if a cell leaves extra bytes unread.
    /// - [`TdsError::Io`] if `read_extra` fails.
    /// - [`TdsError::Contract`] if a record lists itself as a neighbor.
    pub fn from_snapshot(snapshot: &TdsSnapshot) -> Result<Self, TdsError> {
        if snapshot.vertex_count > MAX_SLOTS {
            return Err(TdsError::InvalidSnapshot {
                message: format!(
                    "{} vertices exceed the limit of {MAX_SLOTS}",
                    snapshot.vertex_count
                ),
            });
        }
        if snapshot.cells.len() > MAX_SLOTS {
            return Err(TdsError::InvalidSnapshot {
                message: format!(
                    "{} cells exceed the limit of {MAX_SLOTS}",
                    snapshot.cells.len()
                ),
            });
        }

        let mut tds = Self::new();
        let mut vertex_keys: Vec<VertexKey> = Vec::new();
        vertex_keys
            .try_reserve_exact(snapshot.vertex_count)
            .map_err(|e| TdsError::InvalidSnapshot {
                message: format!("cannot allocate {} vertices: {e}", snapshot.vertex_count),
            })?;
        for _ in 0..snapshot.vertex_count {
            vertex_keys.push(tds.vertices.insert(TdsVertex::default()));
        }

        let mut cell_keys = Vec::with_capacity(snapshot.cells.len());
        for (record_index, record) in snapshot.cells.iter().enumerate() {
            let mut vertices = [VertexKey::null(); 4];
            for (slot, index) in vertices.iter_mut().zip(record.vertices) {
                if let Some(index) = index {
                    *slot = *vertex_keys.get(index).ok_or_else(|| TdsError::InvalidSnapshot {
                        message: format!(
                            "cell {record_index} refers to vertex {index} of {}",
                            snapshot.vertex_count
                        ),
                    })?;
                }
            }

            let mut cell = <CellOf<CB, C>>::default();
            cell.base_mut().set_vertices(vertices);
            let mut extra: &[u8] = &record.extra;
            cell.read_extra(&mut extra)?;
            if !extra.is_empty() {
                return Err(TdsError::TrailingBytes {
                    record: record_index,
                    remaining: extra.len(),
                });
            }

            let key = tds.cells.insert(cell)?;
            for v in vertices {
                if let Some(vertex) = tds.vertices.get_mut(v)
                    && vertex.incident_cell.is_none()
                {
                    vertex.incident_cell = Some(key);
                }
            }
            cell_keys.push(key);
        }

        for (record_index, (record, &key)) in snapshot.cells.iter().zip(&cell_keys).enumerate() {
            let mut neighbors = [CellKey::null(); 4];
            for (slot, index) in neighbors.iter_mut().zip(record.neighbors) {
                if let Some(index) = index {
                    *slot = *cell_keys.get(index).ok_or_else(|| TdsError::InvalidSnapshot {
                        message: format!(
                            "cell {record_index} refers to neighbor {index} of {}",
                            cell_keys.len()
                        ),
                    })?;
                }
            }
            if let Some(cell) = tds.cells.get_mut(key) {
                cell.base_mut().set_neighbors(neighbors)?;
            }
        }

        debug!(
            vertices = tds.number_of_vertices(),
            cells = tds.number_of_cells(),
            "Restored triangulation data structure from snapshot"
        );
        Ok(tds)
    }
}

// =============================================================================
// TESTS
// =============================================================================
