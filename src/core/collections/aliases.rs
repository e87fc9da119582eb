use rustc_hash::{FxHashMap, FxHashSet};

// Import slotmap types for storage backend
#[cfg(not(feature = "dense-slotmap"))]
use slotmap::SlotMap;

#[cfg(feature = "dense-slotmap")]
use slotmap::DenseSlotMap;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Vertex storage backend of the triangulation data structure.
///
/// # Feature Flags
///
/// - **default**: `DenseSlotMap` (the `dense-slotmap` feature)
/// - **--no-default-features**: `SlotMap`
///
/// Public methods return iterators rather than exposing the backend.
#[cfg(not(feature = "dense-slotmap"))]
pub type StorageMap<K, V> = SlotMap<K, V>;

/// Vertex storage backend of the triangulation data structure.
///
/// # Feature Flags
///
/// - **default**: `DenseSlotMap` (the `dense-slotmap` feature)
/// - **--no-default-features**: `SlotMap`
///
/// Public methods return iterators rather than exposing the backend.
#[cfg(feature = "dense-slotmap")]
pub type StorageMap<K, V> = DenseSlotMap<K, V>;

// =============================================================================
// HASHING
// =============================================================================

/// `HashMap` with `rustc_hash::FxHasher`.
///
/// Not DoS-resistant: only use with internal keys such as slot handles.
///
/// # Examples
///
/// ```rust
/// use tds3::core::collections::FastHashMap;
///
/// let mut map: FastHashMap<u64, usize> = FastHashMap::default();
/// map.insert(123, 456);
/// assert_eq!(map.get(&123), Some(&456));
/// ```
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// `HashSet` with `rustc_hash::FxHasher`.
///
/// Not DoS-resistant: only use with internal keys such as slot handles.
pub type FastHashSet<T> = FxHashSet<T>;
