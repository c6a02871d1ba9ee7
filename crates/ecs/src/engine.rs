use crate::component::Component;
use crate::dispatch::{self, EngineShared};
use crate::entity::{next_entity_id, new_entity_handle, EntityHandle, EntityId};
use crate::family::Family;
use crate::logging;
use crate::result::{Error, Result};
use crate::storages::entities::EntityManager;
use crate::storages::families::{FamilyChange, FamilyListener, ListenerId};
use crate::storages::operations::EntityOperation;
use crate::storages::systems::{EntitySystem, SystemManager};
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// An entity-component-system engine.
///
/// Owns the master entity array and the registered systems directly (never behind a
/// `RefCell`, since only top-level calls on `&mut Engine` ever touch them); family caches
/// and the deferred-operation queue live behind [`EngineShared`], reachable from listener
/// callbacks running underneath an update. See the crate documentation for the full
/// deferred-operation protocol.
pub struct Engine {
    shared: Rc<EngineShared>,
    entities: EntityManager,
    systems: SystemManager,
    updating: Cell<bool>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        logging::init();
        Self {
            shared: Rc::new(EngineShared::default()),
            entities: EntityManager::default(),
            systems: SystemManager::default(),
            updating: Cell::new(false),
        }
    }

    /// Creates an empty engine with pre-reserved capacity for `initial_entities_capacity`
    /// entities. `load_factor` is accepted for parity with the source engine's constructor
    /// but has no effect on `FxHashSet`-backed lookups; `0` for either argument means
    /// "implementation default".
    #[must_use]
    pub fn with_capacity(initial_entities_capacity: usize, load_factor: f32) -> Self {
        logging::init();
        let _ = load_factor;
        Self {
            shared: Rc::new(EngineShared::default()),
            entities: EntityManager::with_capacity(initial_entities_capacity),
            systems: SystemManager::default(),
            updating: Cell::new(false),
        }
    }

    /// Returns whether [`update`](Self::update) is currently running.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.updating.get()
    }

    /// Runs `factory` and wraps a `None` result in [`Error::ComponentFactoryFailure`].
    ///
    /// A thin convenience for callers that build components through a factory rather than
    /// a literal value; the engine does not interpret or retry the failure.
    pub fn create_component<C, F>(&self, factory: F) -> Result<C>
    where
        C: Component,
        F: FnOnce() -> Option<C>,
    {
        factory().ok_or(Error::ComponentFactoryFailure(std::any::type_name::<C>()))
    }

    /// Creates a new, detached entity. Call [`add_entity`](Self::add_entity) to register it.
    #[must_use]
    pub fn create_entity(&self) -> EntityHandle {
        new_entity_handle()
    }

    /// Registers `handle` with the engine, assigning it an id and computing its initial
    /// family membership.
    ///
    /// Applied immediately if the engine is idle; queued for the next drain if it is
    /// currently updating or notifying. Returns [`Error::AlreadyRegistered`] if `handle` is
    /// already registered with this or another engine.
    pub fn add_entity(&mut self, handle: EntityHandle) -> Result<()> {
        if self.entities.contains(&handle) || handle.borrow().shared().is_some() {
            return Err(Error::AlreadyRegistered);
        }
        if self.shared.deferred.get() {
            self.shared
                .queues
                .borrow_mut()
                .push(EntityOperation::AddEntity { handle });
        } else {
            self.finalize_add(&handle);
            self.drain_to_fixpoint()?;
        }
        Ok(())
    }

    fn finalize_add(&mut self, handle: &EntityHandle) {
        let id = next_entity_id();
        handle.borrow_mut().attach(id, Rc::downgrade(&self.shared));
        self.entities.add(handle.clone());
        dispatch::dispatch_family_changes(&self.shared, handle);
    }

    /// Requests removal of `handle` from the engine. A no-op if it is not registered.
    ///
    /// Applied immediately if the engine is idle; queued for the next drain otherwise. A
    /// second deferred request for an entity already scheduled for removal is a no-op: at
    /// most one `RemoveEntity` operation is ever queued for a given entity.
    pub fn remove_entity(&mut self, handle: &EntityHandle) -> Result<()> {
        if !self.entities.contains(handle) {
            return Ok(());
        }
        if self.shared.deferred.get() {
            if handle.borrow().is_scheduled_for_removal() {
                return Ok(());
            }
            handle.borrow_mut().set_scheduled_for_removal(true);
            self.shared
                .queues
                .borrow_mut()
                .push(EntityOperation::RemoveEntity {
                    handle: handle.clone(),
                });
        } else {
            handle.borrow_mut().set_scheduled_for_removal(true);
            self.finalize_removal(handle);
            self.drain_to_fixpoint()?;
        }
        Ok(())
    }

    /// Looks up `id` and requests its removal. A no-op if no such entity is registered.
    pub fn remove_entity_by_id(&mut self, id: EntityId) -> Result<()> {
        if let Some(handle) = self.get_entity(id) {
            self.remove_entity(&handle)
        } else {
            Ok(())
        }
    }

    fn finalize_removal(&mut self, handle: &EntityHandle) {
        if !self.entities.remove(handle) {
            return;
        }
        handle.borrow_mut().set_removing(true);
        let changes = self.shared.families.borrow_mut().remove_from_all(handle);
        self.dispatch_removals(changes);
        handle.borrow_mut().uninstall_all_raw();
        handle.borrow_mut().detach();
    }

    fn dispatch_removals(&self, changes: Vec<FamilyChange>) {
        if changes.is_empty() {
            return;
        }
        self.shared.with_notifying(|| {
            for change in changes {
                if let FamilyChange::Removed(listener, entity) = change {
                    listener.borrow_mut().on_entity_removed(&entity);
                }
            }
        });
    }

    /// Removes every entity currently registered with the engine.
    pub fn remove_all_entities(&mut self) -> Result<()> {
        for handle in self.entities.clear() {
            handle.borrow_mut().set_removing(true);
            let changes = self.shared.families.borrow_mut().remove_from_all(&handle);
            self.dispatch_removals(changes);
            handle.borrow_mut().uninstall_all_raw();
            handle.borrow_mut().detach();
        }
        self.drain_to_fixpoint()
    }

    /// Removes every entity currently matching `family`, reading its live cache rather
    /// than a snapshot: entities that start matching `family` between this call and the
    /// drain that applies it are removed too; entities that stop matching are spared.
    pub fn remove_all_entities_in(&mut self, family: &Family) -> Result<()> {
        let view = self.get_entities_for(family);
        if self.shared.deferred.get() {
            for handle in view.borrow().iter() {
                handle.borrow_mut().set_scheduled_for_removal(true);
            }
            self.shared
                .queues
                .borrow_mut()
                .push(EntityOperation::RemoveAll { view });
            Ok(())
        } else {
            self.drain_view(&view);
            self.drain_to_fixpoint()
        }
    }

    /// Repeatedly removes the first entity of `view` until it is empty. `view` shrinks as
    /// a side effect of each removal, since it is the same live array the family cache
    /// holds.
    fn drain_view(&mut self, view: &Rc<RefCell<Vec<EntityHandle>>>) {
        loop {
            let next = view.borrow().first().cloned();
            let Some(handle) = next else {
                break;
            };
            handle.borrow_mut().set_scheduled_for_removal(true);
            self.finalize_removal(&handle);
        }
    }

    /// Looks up a registered entity by id.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<EntityHandle> {
        self.entities.get(id).cloned()
    }

    /// Returns the number of entities currently registered.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns every entity currently registered, in registration order.
    #[must_use]
    pub fn get_entities(&self) -> &[EntityHandle] {
        self.entities.entities()
    }

    /// Returns the live, engine-maintained entity list for `family`.
    ///
    /// The first call for a given family scans every registered entity; subsequent calls,
    /// on this engine, reuse the same cache and the same handle.
    #[must_use]
    pub fn get_entities_for(&self, family: &Family) -> Rc<RefCell<Vec<EntityHandle>>> {
        self.shared
            .families
            .borrow_mut()
            .get_entities_for(family, self.entities.entities())
    }

    /// Registers a listener notified whenever an entity starts or stops matching `family`.
    pub fn add_entity_listener(
        &self,
        family: &Family,
        priority: i32,
        listener: Rc<RefCell<dyn FamilyListener>>,
    ) -> ListenerId {
        self.shared.families.borrow_mut().add_listener(
            family,
            priority,
            listener,
            self.entities.entities(),
        )
    }

    /// Unregisters a listener previously returned by [`add_entity_listener`](Self::add_entity_listener).
    pub fn remove_entity_listener(&self, id: ListenerId) {
        self.shared.families.borrow_mut().remove_listener(id);
    }

    /// Registers a system, replacing any existing system of type `S`.
    ///
    /// If a system of type `S` is already registered, it is detached first — its
    /// [`removed_from_engine`](EntitySystem::removed_from_engine) hook runs synchronously —
    /// before the new instance's [`added_to_engine`](EntitySystem::added_to_engine) hook
    /// runs and it takes over the slot. Returns `true` if a prior instance was replaced.
    pub fn add_system<S>(&mut self, mut system: S) -> bool
    where
        S: EntitySystem + 'static,
    {
        let replaced = if let Some(mut old) = self.systems.remove(TypeId::of::<S>()) {
            old.removed_from_engine(self);
            true
        } else {
            false
        };
        system.added_to_engine(self);
        self.systems.add(TypeId::of::<S>(), Box::new(system));
        replaced
    }

    /// Removes the registered system of type `S`, running its
    /// [`removed_from_engine`](EntitySystem::removed_from_engine) hook synchronously.
    pub fn remove_system<S>(&mut self) -> Option<Box<dyn EntitySystem>>
    where
        S: EntitySystem + 'static,
    {
        let removed = self.systems.remove(TypeId::of::<S>());
        if let Some(mut system) = removed {
            system.removed_from_engine(self);
            Some(system)
        } else {
            None
        }
    }

    /// Removes every registered system, running each one's
    /// [`removed_from_engine`](EntitySystem::removed_from_engine) hook.
    pub fn remove_all_systems(&mut self) {
        for mut system in self.systems.remove_all() {
            system.removed_from_engine(self);
        }
    }

    /// Returns the number of registered systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Returns a reference to the registered system of type `S`, if any.
    #[must_use]
    pub fn get_system<S>(&self) -> Option<&S>
    where
        S: EntitySystem + 'static,
    {
        self.systems
            .get(TypeId::of::<S>())
            .and_then(|system| system.as_any().downcast_ref::<S>())
    }

    /// Returns every registered system, in priority order.
    pub fn get_systems(&self) -> impl Iterator<Item = &dyn EntitySystem> {
        self.systems.iter()
    }

    /// Runs one tick: every system in ascending priority order whose
    /// [`check_processing`](EntitySystem::check_processing) returns `true` gets to run its
    /// [`update`](EntitySystem::update), with the pending-operation queue drained to a
    /// fixpoint between each system and once more at tick end.
    ///
    /// Returns [`Error::ReentrantUpdate`] if called while already updating, or
    /// [`Error::UnknownOperation`] if draining the queue hits an internal invariant
    /// violation. Either way, the engine is left in a non-updating state before returning.
    pub fn update(&mut self, delta_time: f32) -> Result<()> {
        if self.updating.get() {
            return Err(Error::ReentrantUpdate);
        }
        self.updating.set(true);
        self.shared.deferred.set(true);
        let run_result = self.run_systems(delta_time);
        self.shared.deferred.set(false);
        let final_drain = self.drain_to_fixpoint();
        self.updating.set(false);
        run_result.and(final_drain)
    }

    fn run_systems(&mut self, delta_time: f32) -> Result<()> {
        for index in 0..self.systems.len() {
            let Some(mut system) = self.systems.take(index) else {
                continue;
            };
            if system.check_processing(self) {
                system.update(self, delta_time);
            }
            self.systems.put_back(index, system);
            self.drain_to_fixpoint()?;
        }
        Ok(())
    }

    /// Drains the pending-operation queue, applying component-level mutations and entity
    /// lifecycle requests, until a pass produces nothing new.
    ///
    /// `dispatch::drain_queue` is expected to fully apply every component-level operation
    /// it sees, leaving only entity lifecycle operations behind. If one leaks through
    /// unconsumed, that is an internal bug: it is loud (`debug_assert!`) in development
    /// builds and reported as [`Error::UnknownOperation`] otherwise, rather than silently
    /// ignored or allowed to panic in a release build.
    fn drain_to_fixpoint(&mut self) -> Result<()> {
        loop {
            dispatch::drain_queue(&self.shared);
            let lifecycle_ops = self.shared.queues.borrow_mut().drain();
            if lifecycle_ops.is_empty() {
                break;
            }
            for operation in lifecycle_ops {
                self.apply_lifecycle_op(operation)?;
            }
        }
        Ok(())
    }

    /// Applies a single operation left behind by `dispatch::drain_queue`, which should
    /// only ever be an entity lifecycle operation.
    fn apply_lifecycle_op(&mut self, operation: EntityOperation) -> Result<()> {
        match operation {
            EntityOperation::AddEntity { handle } => self.finalize_add(&handle),
            EntityOperation::RemoveEntity { handle } => self.finalize_removal(&handle),
            EntityOperation::RemoveAll { view } => self.drain_view(&view),
            EntityOperation::AddComponent { .. }
            | EntityOperation::RemoveComponent { .. }
            | EntityOperation::RemoveAllComponents { .. } => {
                debug_assert!(
                    false,
                    "dispatch::drain_queue left a component-level operation undrained"
                );
                return Err(Error::UnknownOperation);
            }
        }
        Ok(())
    }
}
