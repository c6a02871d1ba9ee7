use ecs::{Engine, EntityHandle, EntityHandleExt, EntitySystem, Family, FamilyListener};
use std::cell::RefCell;
use std::rc::Rc;

struct A;
struct B;

struct RemovingSystem {
    target: EntityHandle,
}

impl EntitySystem for RemovingSystem {
    fn update(&mut self, engine: &mut Engine, _delta_time: f32) {
        engine.remove_entity(&self.target).unwrap();
    }
}

#[test]
fn removal_requested_during_update_is_visible_only_after_drain() {
    let mut engine = Engine::new();
    let target = engine.create_entity();
    target.add(A);
    engine.add_entity(target.clone()).unwrap();
    engine.add_system(RemovingSystem { target: target.clone() });

    engine.update(1.0).unwrap();

    assert_eq!(engine.entity_count(), 0);
    assert!(target.entity_id().is_detached());
}

struct AddBSystem {
    target: EntityHandle,
}

impl EntitySystem for AddBSystem {
    fn update(&mut self, _engine: &mut Engine, _delta_time: f32) {
        self.target.add(B);
    }
}

struct RemovalRecorder {
    removed: Rc<RefCell<Vec<()>>>,
}

impl FamilyListener for RemovalRecorder {
    fn on_entity_added(&mut self, _entity: &EntityHandle) {}

    fn on_entity_removed(&mut self, _entity: &EntityHandle) {
        self.removed.borrow_mut().push(());
    }
}

#[test]
fn entity_leaves_family_when_a_system_adds_an_excluded_component() {
    let mut engine = Engine::new();
    let entity = engine.create_entity();
    entity.add(A);
    engine.add_entity(entity.clone()).unwrap();

    let family = Family::all::<A>().exclude::<B>().get();
    let removed = Rc::new(RefCell::new(Vec::new()));
    engine.add_entity_listener(
        &family,
        0,
        Rc::new(RefCell::new(RemovalRecorder {
            removed: removed.clone(),
        })),
    );
    assert_eq!(engine.get_entities_for(&family).borrow().len(), 1);

    engine.add_system(AddBSystem {
        target: entity.clone(),
    });
    engine.update(1.0).unwrap();

    assert_eq!(engine.get_entities_for(&family).borrow().len(), 0);
    assert_eq!(removed.borrow().len(), 1);
}

struct RemoveAllFamilySystem {
    family: Family,
}

impl EntitySystem for RemoveAllFamilySystem {
    fn update(&mut self, engine: &mut Engine, _delta_time: f32) {
        engine.remove_all_entities_in(&self.family).unwrap();
    }
}

#[test]
fn remove_all_in_family_removes_every_matching_entity_once_drained() {
    let mut engine = Engine::new();
    let family = Family::all::<A>().get();
    for _ in 0..3 {
        let entity = engine.create_entity();
        entity.add(A);
        engine.add_entity(entity).unwrap();
    }
    assert_eq!(engine.get_entities_for(&family).borrow().len(), 3);

    engine.add_system(RemoveAllFamilySystem {
        family: Family::all::<A>().get(),
    });
    engine.update(1.0).unwrap();

    assert_eq!(engine.entity_count(), 0);
    assert_eq!(engine.get_entities_for(&family).borrow().len(), 0);
}

struct DoubleRemoveSystem {
    target: EntityHandle,
}

impl EntitySystem for DoubleRemoveSystem {
    fn update(&mut self, engine: &mut Engine, _delta_time: f32) {
        engine.remove_entity(&self.target).unwrap();
        engine.remove_entity(&self.target).unwrap();
    }
}

#[test]
fn double_deferred_removal_of_the_same_entity_fires_one_notification() {
    let mut engine = Engine::new();
    let target = engine.create_entity();
    target.add(A);
    engine.add_entity(target.clone()).unwrap();

    let family = Family::all::<A>().get();
    let removed = Rc::new(RefCell::new(Vec::new()));
    engine.add_entity_listener(
        &family,
        0,
        Rc::new(RefCell::new(RemovalRecorder {
            removed: removed.clone(),
        })),
    );

    engine.add_system(DoubleRemoveSystem {
        target: target.clone(),
    });
    engine.update(1.0).unwrap();

    assert_eq!(engine.entity_count(), 0);
    assert_eq!(removed.borrow().len(), 1);
}

#[test]
fn reentrant_update_from_a_system_is_rejected_and_outer_update_still_completes() {
    struct ReentrantSystem;
    impl EntitySystem for ReentrantSystem {
        fn update(&mut self, engine: &mut Engine, delta_time: f32) {
            assert!(engine.update(delta_time).is_err());
        }
    }
    let mut engine = Engine::new();
    engine.add_system(ReentrantSystem);
    assert!(engine.update(1.0).is_ok());
    assert!(!engine.is_updating());
}

#[test]
fn family_get_is_idempotent_across_independent_builder_chains() {
    let first = Family::all::<A>().exclude::<B>().get();
    let second = Family::all::<A>().exclude::<B>().get();
    assert_eq!(first.index(), second.index());
}
