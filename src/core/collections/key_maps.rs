use super::FastHashMap;
use crate::core::triangulation_data_structure::{CellKey, VertexKey};

// =============================================================================
// KEY <-> INDEX MAPS
// =============================================================================

/// Dense position of each vertex key, used when flattening a structure to
/// index-based records.
///
/// # Examples
///
/// ```rust
/// use tds3::core::collections::VertexKeyIndexMap;
/// use tds3::prelude::*;
///
/// let mut tds: Tds = Tds::new();
/// let index: VertexKeyIndexMap = (0..3)
///     .map(|i| (tds.create_vertex(), i))
///     .collect();
/// assert_eq!(index.len(), 3);
/// ```
pub type VertexKeyIndexMap = FastHashMap<VertexKey, usize>;

/// Dense position of each cell key.
pub type CellKeyIndexMap = FastHashMap<CellKey, usize>;
