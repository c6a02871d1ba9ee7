use crate::Engine;
use ecs_internal::idx_type;
use fxhash::FxHashMap;
use std::any::{Any, TypeId};
use typed_index_collections::TiVec;

idx_type!(pub(crate) SystemIdx);

/// A unit of per-tick logic registered with an [`Engine`].
///
/// Mirrors the source engine's entity systems: each tick, every system whose
/// [`check_processing`](Self::check_processing) returns `true` is given a chance to act,
/// in ascending priority order.
pub trait EntitySystem: Any {
    /// Returns whether this system should run this tick. Defaults to always running.
    fn check_processing(&self, engine: &Engine) -> bool {
        let _ = engine;
        true
    }

    /// Runs one tick of this system's logic.
    fn update(&mut self, engine: &mut Engine, delta_time: f32);

    /// Called once, synchronously, when the system is added to an engine.
    fn added_to_engine(&mut self, engine: &mut Engine) {
        let _ = engine;
    }

    /// Called once, synchronously, when the system is removed from an engine.
    fn removed_from_engine(&mut self, engine: &mut Engine) {
        let _ = engine;
    }

    /// Lower values run earlier within the same tick. Defaults to `0`.
    fn priority(&self) -> i32 {
        0
    }

    /// Type-erased view of `self`, used by [`Engine::get_system`](crate::Engine::get_system)
    /// to downcast back to the concrete system type.
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SystemEntry {
    type_id: TypeId,
    priority: i32,
    system: Option<Box<dyn EntitySystem>>,
}

/// Holds the engine's registered systems in priority order, densely indexed by
/// [`SystemIdx`] the same way the source engine's system storage is a `TiVec` keyed by
/// its own dense system index.
///
/// `update`'s `Option::take`-then-put-back dance (mirrored in
/// [`Engine::update`](crate::Engine::update)) is what lets a system's `update` method take
/// `&mut Engine` — which includes this very manager — without a double mutable borrow.
#[derive(Default)]
pub(crate) struct SystemManager {
    entries: TiVec<SystemIdx, SystemEntry>,
    lookup: FxHashMap<TypeId, SystemIdx>,
}

impl SystemManager {
    /// Registers `system` under `type_id`. Returns `false` without changing anything if a
    /// system of that type is already registered.
    pub(crate) fn add(&mut self, type_id: TypeId, system: Box<dyn EntitySystem>) -> bool {
        if self.lookup.contains_key(&type_id) {
            return false;
        }
        let priority = system.priority();
        self.entries.push(SystemEntry {
            type_id,
            priority,
            system: Some(system),
        });
        self.resort();
        true
    }

    /// Removes and returns the system registered under `type_id`, if any.
    pub(crate) fn remove(&mut self, type_id: TypeId) -> Option<Box<dyn EntitySystem>> {
        let pos = self.entries.raw.iter().position(|e| e.type_id == type_id)?;
        let entry = self.entries.raw.remove(pos);
        self.resort();
        entry.system
    }

    pub(crate) fn remove_all(&mut self) -> Vec<Box<dyn EntitySystem>> {
        self.lookup.clear();
        self.entries
            .raw
            .drain(..)
            .filter_map(|mut entry| entry.system.take())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Temporarily takes ownership of the system at `index`, leaving its slot empty.
    pub(crate) fn take(&mut self, index: usize) -> Option<Box<dyn EntitySystem>> {
        self.entries.raw.get_mut(index).and_then(|e| e.system.take())
    }

    /// Returns the system at `index` to its slot after a `take`.
    pub(crate) fn put_back(&mut self, index: usize, system: Box<dyn EntitySystem>) {
        if let Some(entry) = self.entries.raw.get_mut(index) {
            entry.system = Some(system);
        }
    }

    pub(crate) fn get(&self, type_id: TypeId) -> Option<&dyn EntitySystem> {
        let index = *self.lookup.get(&type_id)?;
        self.entries[index].system.as_deref()
    }

    /// Iterates every registered system in priority order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &dyn EntitySystem> {
        self.entries.raw.iter().filter_map(|e| e.system.as_deref())
    }

    fn resort(&mut self) {
        self.entries.raw.sort_by_key(|e| e.priority);
        self.lookup.clear();
        for (index, entry) in self.entries.iter_enumerated() {
            self.lookup.insert(entry.type_id, index);
        }
    }
}
