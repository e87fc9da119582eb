//! Generation-checked cell storage that reuses erased slots.
//!
//! Items live in a slot vector. Erasing an item bumps its erase counter and
//! records the counter with the vacated slot; the next insertion into that
//! slot (most recently freed first) picks the counter up again. Keys encode
//! the slot index and a version derived from the counter, so a key captured
//! before an erasure no longer resolves once the slot has been reclaimed.
//!
//! The container reads and writes counters through the [`CompactItem`] hooks,
//! which every [`TdsCell`] whose structure uses erase counters implements.
//!
//! Counters are compared modulo 2^31, the width of the version field.

use crate::core::erase_counter::EraseCounter;
use crate::core::traits::tds_cell::TdsCell;
use crate::core::traits::tds_types::{CellHandleOf, ConcreteTds, EraseCounterOf};
use slotmap::{Key, KeyData};
use thiserror::Error;
use tracing::debug;

/// Errors raised by [`CompactContainer`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompactContainerError {
    /// Every addressable slot is in use.
    #[error("Compact container is full: at most {max} slots are addressable")]
    CapacityExceeded {
        /// Maximum number of slots.
        max: usize,
    },
}

/// Hooks a [`CompactContainer`] needs from the items it stores.
pub trait CompactItem {
    /// Key type handed out for stored items.
    type Key: Key;

    /// Current erase generation of the item.
    fn erase_counter(&self) -> u32;

    /// Restores the generation of a reclaimed slot.
    fn set_erase_counter(&mut self, value: u32);

    /// Advances the generation when the item is erased.
    fn increment_erase_counter(&mut self);

    /// Tells the item the key it is stored under.
    fn bind_key(&mut self, key: Self::Key);
}

impl<X> CompactItem for X
where
    X: TdsCell,
    X::Tds: ConcreteTds,
    EraseCounterOf<X::Tds>: EraseCounter,
    CellHandleOf<X>: Key,
{
    type Key = CellHandleOf<X>;

    #[inline]
    fn erase_counter(&self) -> u32 {
        self.base().get_erase_counter()
    }

    #[inline]
    fn set_erase_counter(&mut self, value: u32) {
        self.base_mut().set_erase_counter(value);
    }

    #[inline]
    fn increment_erase_counter(&mut self) {
        self.base_mut().increment_erase_counter();
    }

    #[inline]
    fn bind_key(&mut self, key: Self::Key) {
        self.base_mut().set_handle(key);
    }
}

/// Maximum number of addressable slots. Index `u32::MAX` is the null key.
pub const MAX_SLOTS: usize = u32::MAX as usize - 1;

#[derive(Clone, Debug)]
enum Slot<T> {
    Occupied(T),
    Vacant,
}

#[derive(Clone, Copy, Debug)]
struct FreeSlot {
    index: u32,
    generation: u32,
}

/// Slot vector with a LIFO free list and versioned keys.
///
/// # Examples
///
/// ```rust
/// use tds3::core::collections::{CompactContainer, CompactItem};
/// use tds3::prelude::*;
///
/// let mut cells: CompactContainer<Cell<Tds>> = CompactContainer::new();
/// let a = cells.insert(Cell::new()).unwrap();
/// assert_eq!(cells.get(a).unwrap().handle(), a);
///
/// let erased = cells.erase(a).unwrap();
/// assert_eq!(erased.erase_counter(), 1);
///
/// let b = cells.insert(Cell::new()).unwrap();
/// assert!(cells.get(a).is_none());
/// assert_eq!(cells.get(b).unwrap().get_erase_counter(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct CompactContainer<T> {
    slots: Vec<Slot<T>>,
    free: Vec<FreeSlot>,
    len: usize,
}

impl<T> Default for CompactContainer<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> CompactContainer<T> {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty container with room for `capacity` items.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of stored items.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no item is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated, occupied or vacant.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl<T: CompactItem> CompactContainer<T> {
    fn make_key(index: u32, generation: u32) -> T::Key {
        let version = Self::version_of(generation);
        KeyData::from_ffi((u64::from(version) << 32) | u64::from(index)).into()
    }

    /// Splits a key into slot index and version.
    fn decode(key: T::Key) -> (usize, u32) {
        let ffi = key.data().as_ffi();
        let index = usize::try_from(ffi & u64::from(u32::MAX)).unwrap_or(usize::MAX);
        let version = u32::try_from(ffi >> 32).unwrap_or(0);
        (index, version)
    }

    const fn version_of(generation: u32) -> u32 {
        generation.wrapping_shl(1) | 1
    }

    /// Stores `item` and returns its key.
    ///
    /// A vacant slot is reused if there is one; the item then inherits the
    /// slot's erase counter.
    ///
    /// # Errors
    ///
    /// Returns [`CompactContainerError::CapacityExceeded`] if no slot is vacant
    /// and every addressable slot is taken.
    pub fn insert(&mut self, mut item: T) -> Result<T::Key, CompactContainerError> {
        let (index, generation) = if let Some(FreeSlot { index, generation }) = self.free.pop() {
            item.set_erase_counter(generation);
            debug!(index, generation, "Reusing vacant cell slot");
            (index, generation)
        } else {
            if self.slots.len() >= MAX_SLOTS {
                return Err(CompactContainerError::CapacityExceeded { max: MAX_SLOTS });
            }
            let index = u32::try_from(self.slots.len())
                .map_err(|_| CompactContainerError::CapacityExceeded { max: MAX_SLOTS })?;
            self.slots.push(Slot::Vacant);
            (index, item.erase_counter())
        };

        let key = Self::make_key(index, generation);
        item.bind_key(key);
        self.slots[index as usize] = Slot::Occupied(item);
        self.len += 1;
        Ok(key)
    }

    /// Removes the item stored under `key` and returns it with its erase
    /// counter advanced. Returns `None` if `key` is stale or null.
    pub fn erase(&mut self, key: T::Key) -> Option<T> {
        self.get(key)?;
        let (index, _) = Self::decode(key);
        let free_index = u32::try_from(index).ok()?;
        let Slot::Occupied(mut item) = std::mem::replace(&mut self.slots[index], Slot::Vacant)
        else {
            return None;
        };
        item.increment_erase_counter();
        let generation = item.erase_counter();
        self.free.push(FreeSlot {
            index: free_index,
            generation,
        });
        self.len -= 1;
        debug!(index, generation, "Erased cell slot");
        Some(item)
    }

    /// Returns the item stored under `key`, or `None` if `key` is stale or null.
    #[must_use]
    pub fn get(&self, key: T::Key) -> Option<&T> {
        let (index, version) = Self::decode(key);
        match self.slots.get(index)? {
            Slot::Occupied(item) if Self::version_of(item.erase_counter()) == version => Some(item),
            _ => None,
        }
    }

    /// Mutable access to the item stored under `key`.
    ///
    /// Changing the item's erase counter through this reference invalidates
    /// `key` and every other key to the item, including the handle recorded
    /// through [`CompactItem::bind_key`]. Use [`rekey`](Self::rekey) to obtain
    /// the new key and record it on the item.
    #[must_use]
    pub fn get_mut(&mut self, key: T::Key) -> Option<&mut T> {
        let (index, version) = Self::decode(key);
        match self.slots.get_mut(index)? {
            Slot::Occupied(item) if Self::version_of(item.erase_counter()) == version => Some(item),
            _ => None,
        }
    }

    /// Returns the current key of the item in the same slot as `key` and binds
    /// it to the item, or `None` if the slot is vacant.
    ///
    /// This is the way back after the counter of a live item was changed
    /// through [`get_mut`](Self::get_mut): the old key no longer resolves, but
    /// its slot index still does.
    pub fn rekey(&mut self, key: T::Key) -> Option<T::Key> {
        let (index, _) = Self::decode(key);
        let slot_index = u32::try_from(index).ok()?;
        match self.slots.get_mut(index)? {
            Slot::Occupied(item) => {
                let current = Self::make_key(slot_index, item.erase_counter());
                item.bind_key(current);
                Some(current)
            }
            Slot::Vacant => None,
        }
    }

    /// Returns `true` if `key` resolves to a stored item.
    #[must_use]
    pub fn contains(&self, key: T::Key) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over stored items in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (T::Key, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied(item) => {
                let index = u32::try_from(index).ok()?;
                Some((Self::make_key(index, item.erase_counter()), item))
            }
            Slot::Vacant => None,
        })
    }

    /// Iterates mutably over stored items in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (T::Key, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied(item) => {
                    let index = u32::try_from(index).ok()?;
                    let key = Self::make_key(index, item.erase_counter());
                    Some((key, item))
                }
                Slot::Vacant => None,
            })
    }

    /// Iterates over the keys of stored items in slot order.
    pub fn keys(&self) -> impl Iterator<Item = T::Key> + '_ {
        self.iter().map(|(key, _)| key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::{Cell, CellContractError};
    use crate::core::erase_counter::Parallel;
    use crate::core::triangulation_data_structure::{CellKey, Tds};

    type TestCell = Cell<Tds>;

    #[test]
    fn test_insert_binds_key_and_starts_at_generation_zero() {
        let mut container: CompactContainer<TestCell> = CompactContainer::new();
        assert!(container.is_empty());

        let keys: Vec<CellKey> = (0..3)
            .map(|_| container.insert(Cell::new()).unwrap())
            .collect();
        assert_eq!(container.len(), 3);
        for &key in &keys {
            let cell = container.get(key).unwrap();
            assert_eq!(cell.handle(), key);
            assert_eq!(cell.get_erase_counter(), 0);
        }
        assert_eq!(container.keys().collect::<Vec<_>>(), keys);
    }

    #[test]
    fn test_erase_bumps_counter_and_reuse_restores_it() {
        let mut container: CompactContainer<TestCell> = CompactContainer::new();
        let a = container.insert(Cell::new()).unwrap();
        let erased = container.erase(a).unwrap();
        assert_eq!(erased.get_erase_counter(), 1);
        assert!(container.is_empty());
        assert_eq!(container.slot_count(), 1);

        let b = container.insert(Cell::new()).unwrap();
        assert_ne!(a, b);
        assert_eq!(container.slot_count(), 1);
        assert_eq!(container.get(b).unwrap().get_erase_counter(), 1);

        container.erase(b).unwrap();
        let c = container.insert(Cell::new()).unwrap();
        assert_eq!(container.get(c).unwrap().get_erase_counter(), 2);
    }

    #[test]
    fn test_stale_keys_do_not_resolve() {
        let mut container: CompactContainer<TestCell> = CompactContainer::new();
        let a = container.insert(Cell::new()).unwrap();
        container.erase(a).unwrap();
        assert!(container.get(a).is_none());
        assert!(container.erase(a).is_none());

        let _b = container.insert(Cell::new()).unwrap();
        assert!(!container.contains(a));
        assert!(container.get_mut(a).is_none());
        assert!(!container.contains(CellKey::null()));
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut container: CompactContainer<TestCell> = CompactContainer::new();
        let keys: Vec<CellKey> = (0..4)
            .map(|_| container.insert(Cell::new()).unwrap())
            .collect();
        container.erase(keys[1]).unwrap();
        container.erase(keys[3]).unwrap();

        let first = container.insert(Cell::new()).unwrap();
        let second = container.insert(Cell::new()).unwrap();
        // Slot 3 was freed last, so it is reused first.
        let slots: Vec<CellKey> = container.keys().collect();
        assert_eq!(slots[3], first);
        assert_eq!(slots[1], second);
        assert_eq!(container.slot_count(), 4);
    }

    #[test]
    fn test_iter_mut_sees_every_item() {
        let mut container: CompactContainer<TestCell> = CompactContainer::with_capacity(8);
        for _ in 0..5 {
            container.insert(Cell::new()).unwrap();
        }
        let first = container.keys().next().unwrap();
        container.erase(first).unwrap();

        for (key, cell) in container.iter_mut() {
            assert_eq!(cell.handle(), key);
            cell.tds_data_mut().mark_processed();
        }
        assert!(container.iter().all(|(_, cell)| cell.tds_data().is_processed()));
        assert_eq!(container.iter().count(), 4);
    }

    #[test]
    fn test_bumping_a_live_counter_invalidates_its_key() {
        let mut container: CompactContainer<TestCell> = CompactContainer::new();
        let a = container.insert(Cell::new()).unwrap();
        container.get_mut(a).unwrap().increment_erase_counter();
        assert!(container.get(a).is_none());
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_rekey_restores_self_neighbor_check() {
        let mut container: CompactContainer<TestCell> = CompactContainer::new();
        let a = container.insert(Cell::new()).unwrap();
        container.get_mut(a).unwrap().increment_erase_counter();

        let a2 = container.rekey(a).unwrap();
        assert_ne!(a2, a);
        let cell = container.get_mut(a2).unwrap();
        assert_eq!(cell.handle(), a2);
        assert_eq!(
            cell.set_neighbor(0, a2),
            Err(CellContractError::SelfNeighbor { index: 0 })
        );

        container.erase(a2).unwrap();
        assert_eq!(container.rekey(a2), None);
    }

    #[test]
    fn test_parallel_cells_use_the_same_hooks() {
        let mut container: CompactContainer<Cell<Tds<Cell, Parallel>>> =
            CompactContainer::new();
        let a = container.insert(Cell::new()).unwrap();
        let erased = container.erase(a).unwrap();
        assert_eq!(erased.get_erase_counter(), 1);
        let b = container.insert(Cell::new()).unwrap();
        assert_eq!(container.get(b).unwrap().get_erase_counter(), 1);
    }
}
