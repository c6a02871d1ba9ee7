use crate::entity::{EntityHandle, EntityId};
use fxhash::FxHashSet;
use std::rc::Rc;

fn ptr_key(handle: &EntityHandle) -> usize {
    Rc::as_ptr(handle) as usize
}

/// The engine's master, ordered array of entities, plus an identity index used to reject
/// double registration.
///
/// Deliberately not part of [`EngineShared`](crate::dispatch::EngineShared): only
/// top-level `Engine` calls ever touch it, never a listener callback running underneath
/// one, so it needs no interior mutability of its own.
#[derive(Default)]
pub(crate) struct EntityManager {
    entities: Vec<EntityHandle>,
    registered: FxHashSet<usize>,
}

impl EntityManager {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entities: Vec::with_capacity(capacity),
            registered: FxHashSet::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub(crate) fn contains(&self, handle: &EntityHandle) -> bool {
        self.registered.contains(&ptr_key(handle))
    }

    pub(crate) fn add(&mut self, handle: EntityHandle) {
        self.registered.insert(ptr_key(&handle));
        self.entities.push(handle);
    }

    /// Unlinks `handle` from the master array, returning whether it was present.
    pub(crate) fn remove(&mut self, handle: &EntityHandle) -> bool {
        if !self.registered.remove(&ptr_key(handle)) {
            return false;
        }
        if let Some(pos) = self.entities.iter().position(|e| Rc::ptr_eq(e, handle)) {
            self.entities.remove(pos);
        }
        true
    }

    pub(crate) fn entities(&self) -> &[EntityHandle] {
        &self.entities
    }

    pub(crate) fn get(&self, id: EntityId) -> Option<&EntityHandle> {
        self.entities.iter().find(|handle| handle.borrow().id() == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }

    /// Removes every entity from the master array, returning the handles that were present
    /// so the caller can run removal notifications and detach each one.
    pub(crate) fn clear(&mut self) -> Vec<EntityHandle> {
        self.registered.clear();
        std::mem::take(&mut self.entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::new_entity_handle;

    #[test]
    fn add_then_contains_then_remove() {
        let mut manager = EntityManager::default();
        let handle = new_entity_handle();
        assert!(!manager.contains(&handle));
        manager.add(handle.clone());
        assert!(manager.contains(&handle));
        assert_eq!(manager.len(), 1);
        assert!(manager.remove(&handle));
        assert!(!manager.contains(&handle));
        assert!(!manager.remove(&handle));
    }

    #[test]
    fn clear_empties_and_returns_every_handle() {
        let mut manager = EntityManager::default();
        manager.add(new_entity_handle());
        manager.add(new_entity_handle());
        let cleared = manager.clear();
        assert_eq!(cleared.len(), 2);
        assert_eq!(manager.len(), 0);
    }
}
