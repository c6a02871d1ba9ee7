use std::result;
use thiserror::Error;

/// The result type returned by fallible `ecs` operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can be returned by the engine.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// [`Engine::add_entity`](crate::Engine::add_entity) was called with an entity that is
    /// already registered in the engine.
    #[error("entity is already registered in the engine")]
    AlreadyRegistered,
    /// [`Engine::update`](crate::Engine::update) was called while an update was already
    /// running.
    #[error("update called while the engine is already updating")]
    ReentrantUpdate,
    /// An internal invariant was violated while draining a pending-operation queue: a
    /// component-level operation survived the drain pass that should have applied it.
    ///
    /// This indicates a bug in the engine rather than caller misuse.
    #[error("internal error: queue drain left a component-level operation unapplied")]
    UnknownOperation,
    /// A caller-provided component factory failed to produce a component.
    #[error("component factory failed to create component of type `{0}`")]
    ComponentFactoryFailure(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        assert_eq!(
            Error::AlreadyRegistered.to_string(),
            "entity is already registered in the engine"
        );
        assert_eq!(
            Error::ReentrantUpdate.to_string(),
            "update called while the engine is already updating"
        );
        assert_eq!(
            Error::UnknownOperation.to_string(),
            "internal error: queue drain left a component-level operation unapplied"
        );
        assert_eq!(
            Error::ComponentFactoryFailure("Position").to_string(),
            "component factory failed to create component of type `Position`"
        );
    }

    #[test]
    fn already_registered_is_produced_by_re_adding_a_registered_entity() {
        use crate::Engine;

        let mut engine = Engine::new();
        let handle = engine.create_entity();
        engine.add_entity(handle.clone()).unwrap();
        assert_eq!(engine.add_entity(handle).unwrap_err(), Error::AlreadyRegistered);
    }

    #[test]
    fn reentrant_update_is_produced_by_calling_update_from_a_system() {
        use crate::{Engine, EntitySystem};

        struct Reentrant;
        impl EntitySystem for Reentrant {
            fn update(&mut self, engine: &mut Engine, delta_time: f32) {
                assert_eq!(engine.update(delta_time).unwrap_err(), Error::ReentrantUpdate);
            }
        }

        let mut engine = Engine::new();
        engine.add_system(Reentrant);
        engine.update(1.0).unwrap();
    }

    #[test]
    fn component_factory_failure_is_produced_by_a_factory_returning_none() {
        use crate::Engine;

        struct Unbuildable;

        let engine = Engine::new();
        let err = engine
            .create_component::<Unbuildable, _>(|| None)
            .unwrap_err();
        assert_eq!(err, Error::ComponentFactoryFailure(std::any::type_name::<Unbuildable>()));
    }
}
