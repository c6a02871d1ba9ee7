use crate::component::{Component, ComponentTypeIdx, ComponentTypeRegistry};
use crate::dispatch::EngineShared;
use fixedbitset::FixedBitSet;
use fxhash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// The 64-bit identity of an [`Entity`].
///
/// `0` is reserved for entities that are not currently owned by an engine, either because
/// they were just created and not yet added, or because they were removed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// The id of an entity that is not owned by any engine.
    pub const DETACHED: Self = Self(0);

    /// Returns whether this id refers to a real, engine-owned entity.
    #[must_use]
    pub fn is_detached(self) -> bool {
        self == Self::DETACHED
    }
}

impl Debug for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl From<EntityId> for u64 {
    #[inline]
    fn from(id: EntityId) -> Self {
        id.0
    }
}

pub(crate) fn next_entity_id() -> EntityId {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    EntityId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Identity plus component map, the fundamental unit the engine tracks.
///
/// Entities are always accessed through an [`EntityHandle`], a reference-counted,
/// interior-mutable handle, so the same entity can live simultaneously in the engine's
/// master array and in any number of family caches without duplication.
pub struct Entity {
    id: EntityId,
    components: FxHashMap<ComponentTypeIdx, Box<dyn Any>>,
    component_bits: FixedBitSet,
    family_bits: FixedBitSet,
    scheduled_for_removal: bool,
    removing: bool,
    shared: Option<Weak<EngineShared>>,
}

impl Debug for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("component_count", &self.components.len())
            .finish()
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            id: EntityId::DETACHED,
            components: FxHashMap::default(),
            component_bits: FixedBitSet::new(),
            family_bits: FixedBitSet::new(),
            scheduled_for_removal: false,
            removing: false,
            shared: None,
        }
    }
}

impl Entity {
    /// Creates a new entity, detached from any engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entity's id, `0` if detached.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Returns whether the entity is flagged for removal on the next drain.
    #[must_use]
    pub fn is_scheduled_for_removal(&self) -> bool {
        self.scheduled_for_removal
    }

    /// Returns whether the entity is currently within its removal-notification window.
    #[must_use]
    pub fn is_removing(&self) -> bool {
        self.removing
    }

    /// Returns the bitset of component-type indices this entity currently has.
    #[must_use]
    pub fn component_bits(&self) -> &FixedBitSet {
        &self.component_bits
    }

    /// Returns the bitset of family indices this entity currently matches.
    #[must_use]
    pub fn family_bits(&self) -> &FixedBitSet {
        &self.family_bits
    }

    /// Returns whether the entity has a component with the given type index.
    #[must_use]
    pub fn has_component(&self, type_idx: ComponentTypeIdx) -> bool {
        self.component_bits.contains(type_idx.into())
    }

    /// Returns whether the entity has any of the components in `bits`.
    #[must_use]
    pub fn has_any(&self, bits: &FixedBitSet) -> bool {
        bits.ones().any(|i| self.component_bits.contains(i))
    }

    /// Returns whether the entity has all of the components in `bits`.
    #[must_use]
    pub fn has_all(&self, bits: &FixedBitSet) -> bool {
        bits.ones().all(|i| self.component_bits.contains(i))
    }

    /// Returns a type-erased reference to the component at `type_idx`, if present.
    #[must_use]
    pub fn get_component(&self, type_idx: ComponentTypeIdx) -> Option<&dyn Any> {
        self.components.get(&type_idx).map(AsRef::as_ref)
    }

    /// Returns a type-erased mutable reference to the component at `type_idx`, if present.
    #[must_use]
    pub fn get_component_mut(&mut self, type_idx: ComponentTypeIdx) -> Option<&mut dyn Any> {
        self.components.get_mut(&type_idx).map(AsMut::as_mut)
    }

    /// Returns an unmodifiable view of the entity's components.
    #[must_use]
    pub fn components(&self) -> &FxHashMap<ComponentTypeIdx, Box<dyn Any>> {
        &self.components
    }

    /// Installs a component directly, with no deferral and no dispatch.
    ///
    /// Used internally once a caller has already decided this mutation must apply now.
    pub(crate) fn install_raw(&mut self, type_idx: ComponentTypeIdx, component: Box<dyn Any>) {
        let idx: usize = type_idx.into();
        if idx >= self.component_bits.len() {
            self.component_bits.grow(idx + 1);
        }
        self.components.insert(type_idx, component);
        self.component_bits.insert(idx);
    }

    /// Removes a component directly, returning whether it was present.
    pub(crate) fn uninstall_raw(&mut self, type_idx: ComponentTypeIdx) -> bool {
        if self.components.remove(&type_idx).is_some() {
            self.component_bits.set(type_idx.into(), false);
            true
        } else {
            false
        }
    }

    /// Removes every component, returning their type indices in an arbitrary stable order.
    pub(crate) fn uninstall_all_raw(&mut self) -> Vec<ComponentTypeIdx> {
        let type_idxs: Vec<ComponentTypeIdx> = self.components.keys().copied().collect();
        self.components.clear();
        self.component_bits.clear();
        type_idxs
    }

    pub(crate) fn set_family_bit(&mut self, family_idx: usize, value: bool) {
        if family_idx >= self.family_bits.len() {
            self.family_bits.grow(family_idx + 1);
        }
        self.family_bits.set(family_idx, value);
    }

    pub(crate) fn attach(&mut self, id: EntityId, shared: Weak<EngineShared>) {
        self.id = id;
        self.shared = Some(shared);
        self.scheduled_for_removal = false;
    }

    pub(crate) fn shared(&self) -> Option<Rc<EngineShared>> {
        self.shared.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_scheduled_for_removal(&mut self, value: bool) {
        self.scheduled_for_removal = value;
    }

    pub(crate) fn set_removing(&mut self, value: bool) {
        self.removing = value;
    }

    pub(crate) fn detach(&mut self) {
        self.id = EntityId::DETACHED;
        self.shared = None;
        self.scheduled_for_removal = false;
        self.removing = false;
    }
}

/// A reference-counted, interior-mutable handle to an [`Entity`].
///
/// This is the idiomatic stand-in for the source engine's shared, reference-identified
/// entity objects: the same handle can be cloned into the master array, any number of
/// family caches, and system-local state, all pointing at the same underlying entity.
pub type EntityHandle = Rc<RefCell<Entity>>;

/// Creates a new, detached entity handle.
#[must_use]
pub fn new_entity_handle() -> EntityHandle {
    Rc::new(RefCell::new(Entity::new()))
}

/// Ergonomic operations on an [`EntityHandle`], mirroring the component operations an
/// [`Entity`] exposes in the source engine.
pub trait EntityHandleExt {
    /// Returns the entity's id, `0` if detached.
    fn entity_id(&self) -> EntityId;

    /// Returns whether the entity currently has a component of type `C`.
    fn has<C>(&self) -> bool
    where
        C: Component;

    /// Calls `f` with a reference to the entity's component of type `C`, if present.
    fn with<C, R>(&self, f: impl FnOnce(Option<&C>) -> R) -> R
    where
        C: Component;

    /// Calls `f` with a mutable reference to the entity's component of type `C`, if present.
    fn with_mut<C, R>(&self, f: impl FnOnce(Option<&mut C>) -> R) -> R
    where
        C: Component;

    /// Adds or replaces the component of type `C`.
    ///
    /// Applied immediately and dispatched to family listeners if the engine is idle;
    /// queued for the next drain otherwise.
    fn add<C>(&self, component: C)
    where
        C: Component;

    /// Removes the component of type `C`, if present. A no-op if absent.
    fn remove<C>(&self)
    where
        C: Component;

    /// Removes every component from the entity.
    fn remove_all(&self);
}

impl EntityHandleExt for EntityHandle {
    fn entity_id(&self) -> EntityId {
        self.borrow().id()
    }

    fn has<C>(&self) -> bool
    where
        C: Component,
    {
        self.borrow().has_component(ComponentTypeRegistry::type_idx_of::<C>())
    }

    fn with<C, R>(&self, f: impl FnOnce(Option<&C>) -> R) -> R
    where
        C: Component,
    {
        let type_idx = ComponentTypeRegistry::type_idx_of::<C>();
        let entity = self.borrow();
        f(entity.get_component(type_idx).and_then(<dyn Any>::downcast_ref))
    }

    fn with_mut<C, R>(&self, f: impl FnOnce(Option<&mut C>) -> R) -> R
    where
        C: Component,
    {
        let type_idx = ComponentTypeRegistry::type_idx_of::<C>();
        let mut entity = self.borrow_mut();
        f(entity.get_component_mut(type_idx).and_then(<dyn Any>::downcast_mut))
    }

    fn add<C>(&self, component: C)
    where
        C: Component,
    {
        let type_idx = ComponentTypeRegistry::type_idx_of::<C>();
        crate::dispatch::add_component(self, type_idx, Box::new(component));
    }

    fn remove<C>(&self)
    where
        C: Component,
    {
        let type_idx = ComponentTypeRegistry::type_idx_of::<C>();
        crate::dispatch::remove_component(self, type_idx);
    }

    fn remove_all(&self) {
        crate::dispatch::remove_all_components(self);
    }
}
