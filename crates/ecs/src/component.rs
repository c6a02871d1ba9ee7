use ecs_internal::idx_type;
use fxhash::FxHashMap;
use std::any::{Any, TypeId};
use std::sync::{Mutex, OnceLock};

idx_type!(pub ComponentTypeIdx);

/// Marker trait for types that can be attached to an [`Entity`](crate::Entity).
///
/// Automatically implemented for every `'static` type; no manual implementation is expected.
pub trait Component: Any {}

impl<T> Component for T where T: Any {}

/// Assigns a stable, dense, small-integer index to every distinct [`Component`] type.
///
/// Indices are process-wide and stable for the lifetime of the process, the same way the
/// source engine keeps a single static component-type index table shared by every `Engine`
/// instance: two engines running in the same process agree on the index of a given component
/// type.
pub struct ComponentTypeRegistry;

impl ComponentTypeRegistry {
    /// Returns the index of `C`, registering it on first use.
    ///
    /// Assignment is monotonic and dense, starting at 0.
    pub fn type_idx_of<C>() -> ComponentTypeIdx
    where
        C: Component,
    {
        Self::type_idx_of_raw(TypeId::of::<C>())
    }

    pub(crate) fn type_idx_of_raw(type_id: TypeId) -> ComponentTypeIdx {
        let types = Self::types();
        let mut types = types.lock().expect("component type registry poisoned");
        let next_idx = ComponentTypeIdx::from(types.len());
        *types.entry(type_id).or_insert(next_idx)
    }

    fn types() -> &'static Mutex<FxHashMap<TypeId, ComponentTypeIdx>> {
        static TYPES: OnceLock<Mutex<FxHashMap<TypeId, ComponentTypeIdx>>> = OnceLock::new();
        TYPES.get_or_init(|| Mutex::new(FxHashMap::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Velocity;

    #[test]
    fn assign_dense_stable_indexes() {
        let position_idx = ComponentTypeRegistry::type_idx_of::<Position>();
        let velocity_idx = ComponentTypeRegistry::type_idx_of::<Velocity>();
        assert_ne!(position_idx, velocity_idx);
        assert_eq!(position_idx, ComponentTypeRegistry::type_idx_of::<Position>());
        assert_eq!(velocity_idx, ComponentTypeRegistry::type_idx_of::<Velocity>());
    }
}
