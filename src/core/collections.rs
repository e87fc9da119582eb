//! Collection types for the triangulation data structure.
//!
//! - [`StorageMap`]: slotmap backend for vertices, selected by feature flag.
//! - [`CompactContainer`]: generation-checked cell storage with slot reuse.
//! - Fast hash maps/sets and secondary maps keyed by vertex and cell keys.

mod aliases;
pub mod compact_container;
mod key_maps;
mod secondary_maps;

pub use aliases::*;
pub use compact_container::{CompactContainer, CompactContainerError, CompactItem, MAX_SLOTS};
pub use key_maps::*;
pub use secondary_maps::*;
