//! Index-addressed storage for serfs, flags, buildings and inventories.
//!
//! Ids are 1-based: slot 0 is never handed out, so persisted records can use
//! 0 for "none". Freed slots are reused lowest-first, which keeps allocation
//! order (and therefore update order) deterministic across save/load.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

pub trait Id: Copy + Eq + Ord + Hash + fmt::Debug {
    fn from_index(index: u32) -> Self;
    fn index(self) -> u32;

    /// Decode a persisted index where 0 means "none".
    fn from_raw(raw: u32) -> Option<Self> {
        (raw != 0).then(|| Self::from_index(raw))
    }
}

/// Encode an optional id for persistence (0 = none).
pub fn raw_index<I: Id>(id: Option<I>) -> u32 {
    id.map(Id::index).unwrap_or(0)
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl Id for $name {
            fn from_index(index: u32) -> Self {
                Self(index)
            }
            fn index(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

define_id!(SerfId);
define_id!(FlagId);
define_id!(BuildingId);
define_id!(InventoryId);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<I, T> {
    slots: Vec<Option<T>>,
    free: BTreeSet<u32>,
    #[serde(skip)]
    _id: PhantomData<I>,
}

impl<I: Id, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self {
            slots: vec![None],
            free: BTreeSet::new(),
            _id: PhantomData,
        }
    }
}

impl<I: Id, T> Arena<I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` in the lowest free slot.
    pub fn allocate(&mut self, value: T) -> I {
        if let Some(index) = self.free.pop_first() {
            self.slots[index as usize] = Some(value);
            return I::from_index(index);
        }
        self.slots.push(Some(value));
        I::from_index((self.slots.len() - 1) as u32)
    }

    /// Store `value` under a specific id (used by loaders). Returns the
    /// previous occupant, if any.
    pub fn insert_at(&mut self, id: I, value: T) -> Option<T> {
        let index = id.index() as usize;
        debug_assert!(index != 0, "slot 0 is reserved");
        while self.slots.len() <= index {
            self.free.insert(self.slots.len() as u32);
            self.slots.push(None);
        }
        self.free.remove(&(index as u32));
        self.slots[index].replace(value)
    }

    pub fn remove(&mut self, id: I) -> Option<T> {
        let index = id.index();
        let value = self.slots.get_mut(index as usize)?.take();
        if value.is_some() {
            self.free.insert(index);
        }
        value
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.index() as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get_mut(id.index() as usize)?.as_mut()
    }

    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - 1 - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live ids in ascending order.
    pub fn ids(&self) -> Vec<I> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (I::from_index(i as u32), v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .skip(1)
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (I::from_index(i as u32), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let mut arena: Arena<SerfId, &str> = Arena::new();
        assert_eq!(arena.allocate("a"), SerfId(1));
        assert_eq!(arena.allocate("b"), SerfId(2));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_lowest_free_slot_is_reused() {
        let mut arena: Arena<FlagId, u8> = Arena::new();
        for v in 0..5 {
            arena.allocate(v);
        }
        arena.remove(FlagId(4));
        arena.remove(FlagId(2));
        assert_eq!(arena.allocate(9), FlagId(2));
        assert_eq!(arena.allocate(9), FlagId(4));
        assert_eq!(arena.allocate(9), FlagId(6));
    }

    #[test]
    fn test_insert_at_fills_gaps_as_free() {
        let mut arena: Arena<SerfId, u8> = Arena::new();
        arena.insert_at(SerfId(3), 7);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.allocate(1), SerfId(1));
        assert_eq!(arena.allocate(2), SerfId(2));
        assert_eq!(arena.allocate(4), SerfId(4));
        assert_eq!(arena.ids(), vec![SerfId(1), SerfId(2), SerfId(3), SerfId(4)]);
    }

    #[test]
    fn test_raw_index_round_trip() {
        assert_eq!(raw_index::<SerfId>(None), 0);
        assert_eq!(SerfId::from_raw(0), None);
        assert_eq!(SerfId::from_raw(raw_index(Some(SerfId(12)))), Some(SerfId(12)));
    }
}
