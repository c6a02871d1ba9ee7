use crate::entity::EntityHandle;
use crate::family::{Family, FamilyIdx};
use ecs_internal::TiVecSafeOperations;
use std::cell::RefCell;
use std::rc::Rc;
use typed_index_collections::TiVec;

/// Receives notifications when an entity starts or stops matching a family this listener
/// was registered against.
///
/// Dispatched in ascending priority order, the same way the source engine's per-family
/// listener lists are priority-sorted.
pub trait FamilyListener {
    /// Called after `entity` starts matching the family.
    fn on_entity_added(&mut self, entity: &EntityHandle);

    /// Called after `entity` stops matching the family, or is removed from the engine
    /// while still matching it.
    fn on_entity_removed(&mut self, entity: &EntityHandle);
}

/// A handle returned by [`FamilyManager::add_listener`], used to unregister later.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ListenerId(u64);

struct RegisteredListener {
    id: ListenerId,
    priority: i32,
    listener: Rc<RefCell<dyn FamilyListener>>,
}

struct FamilyEntry {
    family: Family,
    entities: Rc<RefCell<Vec<EntityHandle>>>,
    listeners: Vec<RegisteredListener>,
}

/// One pending notification produced by [`FamilyManager::update_membership`].
///
/// Listener dispatch happens outside of any [`FamilyManager`] borrow: collecting these
/// first and invoking the listeners afterward is what lets a listener reenter the family
/// cache (e.g. to read another family's entity list) without a `RefCell` double-borrow.
pub(crate) enum FamilyChange {
    Added(Rc<RefCell<dyn FamilyListener>>, EntityHandle),
    Removed(Rc<RefCell<dyn FamilyListener>>, EntityHandle),
}

/// Per-engine cache of family membership, keyed by the process-wide [`FamilyIdx`].
///
/// A family is only realized (scanned and kept up to date) the first time
/// [`get_entities_for`](Self::get_entities_for) is called for it, matching the source
/// engine's lazily-populated family caches. Entries are stored densely by `FamilyIdx`,
/// the same way the source engine keys its per-component-type storages, growing the
/// backing [`TiVec`] on demand rather than scanning a hash map keyed on the index.
#[derive(Default)]
pub(crate) struct FamilyManager {
    entries: TiVec<FamilyIdx, Option<FamilyEntry>>,
    next_listener_id: u64,
}

impl FamilyManager {
    fn realized(&mut self) -> impl Iterator<Item = &mut FamilyEntry> {
        self.entries.iter_mut().filter_map(Option::as_mut)
    }

    /// Returns the live entity list for `family`, scanning `all_entities` to populate it
    /// if this is the first time the family is requested on this engine.
    pub(crate) fn get_entities_for(
        &mut self,
        family: &Family,
        all_entities: &[EntityHandle],
    ) -> Rc<RefCell<Vec<EntityHandle>>> {
        let slot = self.entries.get_mut_or_create(family.index());
        if slot.is_none() {
            let matching: Vec<EntityHandle> = all_entities
                .iter()
                .filter(|handle| family.matches(handle.borrow().component_bits()))
                .cloned()
                .collect();
            for handle in &matching {
                handle.borrow_mut().set_family_bit(family.index().into(), true);
            }
            *slot = Some(FamilyEntry {
                family: family.clone(),
                entities: Rc::new(RefCell::new(matching)),
                listeners: Vec::new(),
            });
        }
        slot.as_ref()
            .expect("populated above if it was empty")
            .entities
            .clone()
    }

    pub(crate) fn add_listener(
        &mut self,
        family: &Family,
        priority: i32,
        listener: Rc<RefCell<dyn FamilyListener>>,
        all_entities: &[EntityHandle],
    ) -> ListenerId {
        self.get_entities_for(family, all_entities);
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        let entry = self
            .entries
            .get_mut_or_create(family.index())
            .as_mut()
            .expect("entry was just populated by get_entities_for");
        entry.listeners.push(RegisteredListener {
            id,
            priority,
            listener,
        });
        entry.listeners.sort_by_key(|l| l.priority);
        id
    }

    pub(crate) fn remove_listener(&mut self, id: ListenerId) {
        for entry in self.realized() {
            entry.listeners.retain(|l| l.id != id);
        }
    }

    /// Re-evaluates every realized family against `handle`'s current component bits,
    /// updating membership and returning the notifications that must be dispatched.
    ///
    /// Unrealized families are left untouched: they will scan fresh on first access.
    pub(crate) fn update_membership(&mut self, handle: &EntityHandle) -> Vec<FamilyChange> {
        let mut changes = Vec::new();
        let component_bits = handle.borrow().component_bits().clone();
        for entry in self.realized() {
            let family_idx: usize = entry.family.index().into();
            let now_matches = entry.family.matches(&component_bits);
            let was_matching = handle.borrow().family_bits().contains(family_idx);
            if now_matches == was_matching {
                continue;
            }
            handle.borrow_mut().set_family_bit(family_idx, now_matches);
            let mut entities = entry.entities.borrow_mut();
            if now_matches {
                entities.push(handle.clone());
            } else if let Some(pos) = entities.iter().position(|e| Rc::ptr_eq(e, handle)) {
                entities.remove(pos);
            }
            drop(entities);
            for registered in &entry.listeners {
                let change = if now_matches {
                    FamilyChange::Added(registered.listener.clone(), handle.clone())
                } else {
                    FamilyChange::Removed(registered.listener.clone(), handle.clone())
                };
                changes.push(change);
            }
        }
        changes
    }

    /// Unlinks `handle` from every realized family it currently matches, returning the
    /// removal notifications. Used when an entity leaves the engine entirely.
    pub(crate) fn remove_from_all(&mut self, handle: &EntityHandle) -> Vec<FamilyChange> {
        let mut changes = Vec::new();
        for entry in self.realized() {
            let family_idx: usize = entry.family.index().into();
            if !handle.borrow().family_bits().contains(family_idx) {
                continue;
            }
            let mut entities = entry.entities.borrow_mut();
            if let Some(pos) = entities.iter().position(|e| Rc::ptr_eq(e, handle)) {
                entities.remove(pos);
            }
            drop(entities);
            for registered in &entry.listeners {
                changes.push(FamilyChange::Removed(registered.listener.clone(), handle.clone()));
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{new_entity_handle, EntityHandleExt};

    struct Position;
    struct Recorder {
        added: Vec<u8>,
    }
    impl FamilyListener for Recorder {
        fn on_entity_added(&mut self, _entity: &EntityHandle) {
            self.added.push(1);
        }
        fn on_entity_removed(&mut self, _entity: &EntityHandle) {
            self.added.push(0);
        }
    }

    #[test]
    fn first_access_scans_existing_entities() {
        let mut manager = FamilyManager::default();
        let handle = new_entity_handle();
        handle.add(Position);
        let family = Family::all::<Position>().get();
        let entities = manager.get_entities_for(&family, &[handle.clone()]);
        assert_eq!(entities.borrow().len(), 1);
    }

    #[test]
    fn update_membership_reports_added_and_removed() {
        let mut manager = FamilyManager::default();
        let handle = new_entity_handle();
        let family = Family::all::<Position>().get();
        manager.get_entities_for(&family, &[]);
        handle.add(Position);
        let changes = manager.update_membership(&handle);
        assert!(matches!(changes.as_slice(), []));
        handle.remove::<Position>();
        let changes = manager.update_membership(&handle);
        assert!(changes.is_empty());
    }
}
