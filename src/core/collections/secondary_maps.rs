use crate::core::triangulation_data_structure::{CellKey, VertexKey};
use slotmap::SparseSecondaryMap;

// =============================================================================
// SLOTMAP SECONDARY MAPS FOR AUXILIARY DATA
// =============================================================================

/// Sparse secondary map for attaching data to cells.
///
/// Cell keys are versioned, so an entry inserted for a cell that is later
/// deleted cannot be read back through the key of the cell that reuses its slot.
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
/// let mut visited: CellSecondaryMap<bool> = CellSecondaryMap::new();
/// visited.insert(c, true);
/// tds.delete_cell(c).unwrap();
/// let d = tds.create_cell([v[0], v[1], v[2], v[3]]).unwrap();
/// assert_eq!(visited.get(d), None);
/// ```
pub type CellSecondaryMap<V> = SparseSecondaryMap<CellKey, V>;

/// Sparse secondary map for attaching data to vertices, typically positions.
///
/// The combinatorial structure stores no coordinates; geometric callers keep
/// them in a map like this one.
///
/// # Examples
///
/// ```rust
/// use tds3::prelude::*;
///
/// let mut tds: Tds = Tds::new();
/// let v = tds.create_vertex();
///
/// let mut points: VertexSecondaryMap<[f64; 3]> = VertexSecondaryMap::new();
/// points.insert(v, [0.0, 1.0, 2.0]);
/// assert_eq!(points.get(v), Some(&[0.0, 1.0, 2.0]));
/// ```
pub type VertexSecondaryMap<V> = SparseSecondaryMap<VertexKey, V>;

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_secondary_maps_are_sparse() {
        let mut cells: SlotMap<CellKey, ()> = SlotMap::with_key();
        let mut vertices: SlotMap<VertexKey, ()> = SlotMap::with_key();
        let c: Vec<CellKey> = (0..10).map(|_| cells.insert(())).collect();
        let v: Vec<VertexKey> = (0..10).map(|_| vertices.insert(())).collect();

        let mut cell_map: CellSecondaryMap<u8> = CellSecondaryMap::new();
        cell_map.insert(c[7], 1);
        assert_eq!(cell_map.len(), 1);
        assert!(!cell_map.contains_key(c[0]));

        let mut vertex_map: VertexSecondaryMap<usize> = VertexSecondaryMap::new();
        for (i, &vk) in v.iter().enumerate().step_by(3) {
            vertex_map.insert(vk, i);
        }
        assert_eq!(vertex_map.len(), 4);
        assert_eq!(vertex_map.get(v[9]), Some(&9));
    }
}
