//! Generational slot storage behind the object manager.

use crate::handle::HandleShared;
use crate::object::ObjectPtr;
use crate::registry::TypeRegistry;
use ember_common::InstanceId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Weak};

/// Slot index plus the generation the slot had when the object was stored.
///
/// A key stops resolving once its slot is reaped, even if the slot is later
/// reused for another object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub index: u32,
    pub generation: u32,
}

pub(crate) struct Entry {
    pub(crate) cell: ObjectPtr,
    /// Observes the owning handles without keeping them alive.
    pub(crate) owner: Weak<HandleShared>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_instance: BTreeMap<InstanceId, ObjectKey>,
}

impl Arena {
    pub(crate) fn insert(&mut self, cell: ObjectPtr) -> ObjectKey {
        let instance_id = cell.instance_id();
        let entry = Entry {
            cell,
            owner: Weak::new(),
        };
        let key = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                ObjectKey {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                ObjectKey {
                    index,
                    generation: 0,
                }
            }
        };
        self.by_instance.insert(instance_id, key);
        key
    }

    pub(crate) fn set_owner(&mut self, key: ObjectKey, owner: Weak<HandleShared>) {
        if let Some(entry) = self.get_mut(key) {
            entry.owner = owner;
        }
    }

    pub(crate) fn get(&self, key: ObjectKey) -> Option<&Entry> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn get_mut(&mut self, key: ObjectKey) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    pub(crate) fn lookup(&self, id: InstanceId) -> Option<(ObjectKey, &Entry)> {
        let key = *self.by_instance.get(&id)?;
        self.get(key).map(|entry| (key, entry))
    }

    pub(crate) fn contains(&self, id: InstanceId) -> bool {
        self.by_instance.contains_key(&id)
    }

    /// Evict the entry under `key`, invalidating every key that points at it.
    pub(crate) fn remove(&mut self, key: ObjectKey) -> Option<Entry> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.by_instance.remove(&entry.cell.instance_id());
        Some(entry)
    }

    /// Entries in instance id order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (ObjectKey, &Entry)> {
        self.by_instance
            .values()
            .filter_map(|key| self.get(*key).map(|entry| (*key, entry)))
    }

    pub(crate) fn len(&self) -> usize {
        self.by_instance.len()
    }
}

/// State shared between a manager and the handles it issued.
pub(crate) struct Store {
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) arena: Mutex<Arena>,
    /// Next instance id to hand out. `0` is never issued.
    pub(crate) next_id: AtomicU32,
}

impl Store {
    pub(crate) fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            arena: Mutex::new(Arena::default()),
            next_id: AtomicU32::new(1),
        }
    }
}
