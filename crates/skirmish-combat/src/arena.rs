//! Dense per-entity storage.
//!
//! Records live in a `Vec` of slots indexed by a small [`Handle`]; a side map
//! translates external [`EntityId`]s to handles. Freed slots are recycled, so
//! iteration walks a compact array in slot order and is deterministic for a
//! given sequence of inserts and removals.

use ahash::AHashMap;
use skirmish_common::EntityId;

/// Index of a slot inside an [`EntityArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    /// Returns the slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    id: EntityId,
    value: T,
}

/// Arena of per-entity records keyed by [`EntityId`].
#[derive(Debug, Clone)]
pub struct EntityArena<T> {
    slots: Vec<Option<Slot<T>>>,
    index: AHashMap<EntityId, Handle>,
    free: Vec<Handle>,
}

impl<T> Default for EntityArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntityArena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: AHashMap::new(),
            free: Vec::new(),
        }
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns true if `id` has a record.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Returns the handle for `id`, if present.
    #[must_use]
    pub fn handle(&self, id: EntityId) -> Option<Handle> {
        self.index.get(&id).copied()
    }

    /// Inserts or replaces the record for `id`, returning the previous value.
    pub fn insert(&mut self, id: EntityId, value: T) -> Option<T> {
        if let Some(handle) = self.handle(id) {
            if let Some(slot) = self.slots[handle.index()].as_mut() {
                return Some(std::mem::replace(&mut slot.value, value));
            }
        }

        let slot = Some(Slot { id, value });
        let handle = match self.free.pop() {
            Some(handle) => {
                self.slots[handle.index()] = slot;
                handle
            },
            None => {
                self.slots.push(slot);
                Handle((self.slots.len() - 1) as u32)
            },
        };
        self.index.insert(id, handle);
        None
    }

    /// Returns the record for `id`.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        let handle = self.handle(id)?;
        self.slots[handle.index()].as_ref().map(|slot| &slot.value)
    }

    /// Returns the record for `id` mutably.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        let handle = self.handle(id)?;
        self.slots[handle.index()].as_mut().map(|slot| &mut slot.value)
    }

    /// Returns the record for `id`, creating it with `make` if missing.
    pub fn get_or_insert_with(&mut self, id: EntityId, make: impl FnOnce() -> T) -> &mut T {
        if !self.contains(id) {
            self.insert(id, make());
        }
        let handle = self.index[&id];
        match self.slots[handle.index()].as_mut() {
            Some(slot) => &mut slot.value,
            None => unreachable!("indexed slot {} is vacant", handle.index()),
        }
    }

    /// Removes the record for `id` and frees its slot.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let handle = self.index.remove(&id)?;
        let slot = self.slots[handle.index()].take()?;
        self.free.push(handle);
        Some(slot.value)
    }

    /// Iterates live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|s| (s.id, &s.value)))
    }

    /// Iterates live records mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.as_mut().map(|s| (s.id, &mut s.value)))
    }

    /// Iterates the ids of live records in slot order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    /// Keeps only the records for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(EntityId, &mut T) -> bool) {
        for (i, entry) in self.slots.iter_mut().enumerate() {
            let drop_it = match entry.as_mut() {
                Some(slot) => !keep(slot.id, &mut slot.value),
                None => false,
            };
            if drop_it {
                if let Some(slot) = entry.take() {
                    self.index.remove(&slot.id);
                    self.free.push(Handle(i as u32));
                }
            }
        }
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> EntityId {
        EntityId::from_raw(raw)
    }

    #[test]
    fn test_insert_get_remove() {
        let mut arena = EntityArena::new();
        assert!(arena.insert(id(1), 10).is_none());
        assert_eq!(arena.insert(id(1), 11), Some(10));
        assert_eq!(arena.get(id(1)), Some(&11));
        assert_eq!(arena.len(), 1);

        assert_eq!(arena.remove(id(1)), Some(11));
        assert!(arena.get(id(1)).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_slots_are_recycled() {
        let mut arena = EntityArena::new();
        arena.insert(id(1), "a");
        arena.insert(id(2), "b");
        let freed = arena.handle(id(1));
        arena.remove(id(1));
        arena.insert(id(3), "c");
        assert_eq!(arena.handle(id(3)), freed);
        assert_eq!(arena.slots.len(), 2);
    }

    #[test]
    fn test_iteration_is_slot_ordered() {
        let mut arena = EntityArena::new();
        for raw in [5, 3, 9] {
            arena.insert(id(raw), raw);
        }
        let ids: Vec<u64> = arena.ids().map(EntityId::raw).collect();
        assert_eq!(ids, vec![5, 3, 9]);
    }

    #[test]
    fn test_get_or_insert_with() {
        let mut arena: EntityArena<Vec<u32>> = EntityArena::new();
        arena.get_or_insert_with(id(1), Vec::new).push(1);
        arena.get_or_insert_with(id(1), Vec::new).push(2);
        assert_eq!(arena.get(id(1)), Some(&vec![1, 2]));
    }

    #[test]
    fn test_retain() {
        let mut arena = EntityArena::new();
        for raw in 1..=4 {
            arena.insert(id(raw), raw);
        }
        arena.retain(|_, v| *v % 2 == 0);
        assert_eq!(arena.len(), 2);
        assert!(!arena.contains(id(1)));
        assert!(arena.contains(id(4)));
    }
}
