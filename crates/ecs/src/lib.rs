//! A small, single-threaded, family-index entity-component-system.
//!
//! An [`Engine`] holds entities (bags of components, reached through reference-counted
//! [`EntityHandle`]s) and systems (per-tick logic implementing [`EntitySystem`]). Systems
//! query entities through [`Family`] descriptors — predicates over the set of component
//! types an entity carries — rather than iterating every entity by hand.
//!
//! Mutations requested while the engine is updating, or while it is dispatching a family
//! listener notification, are queued rather than applied immediately, and replayed once
//! the engine returns to idle. This is what lets a system, or a listener reacting to one
//! entity's change, safely add components to, remove components from, or remove entirely,
//! any entity — including ones currently being iterated by another family — without ever
//! invalidating the collection underneath that iteration.
//!
//! # Example
//!
//! ```
//! use ecs::{Engine, EntityHandleExt, EntitySystem, Family};
//!
//! struct Position(f32);
//! struct Velocity(f32);
//!
//! struct MovementSystem;
//!
//! impl EntitySystem for MovementSystem {
//!     fn update(&mut self, engine: &mut Engine, delta_time: f32) {
//!         let moving = Family::all::<Position>().all::<Velocity>().get();
//!         for entity in engine.get_entities_for(&moving).borrow().iter() {
//!             let speed = entity.with::<Velocity, _>(|v| v.unwrap().0);
//!             entity.with_mut::<Position, _>(|p| p.unwrap().0 += speed * delta_time);
//!         }
//!     }
//! }
//!
//! let mut engine = Engine::new();
//! let entity = engine.create_entity();
//! entity.add(Position(0.0));
//! entity.add(Velocity(1.0));
//! engine.add_entity(entity.clone()).unwrap();
//! engine.add_system(MovementSystem);
//! engine.update(1.0).unwrap();
//! entity.with::<Position, _>(|p| assert_eq!(p.unwrap().0, 1.0));
//! ```

mod component;
mod dispatch;
mod engine;
mod entity;
mod family;
mod logging;
mod result;
mod storages;

pub use component::{Component, ComponentTypeIdx, ComponentTypeRegistry};
pub use engine::Engine;
pub use entity::{new_entity_handle, Entity, EntityHandle, EntityHandleExt, EntityId};
pub use family::{Family, FamilyBuilder, FamilyIdx};
pub use result::{Error, Result};
pub use storages::families::{FamilyListener, ListenerId};
pub use storages::systems::EntitySystem;
