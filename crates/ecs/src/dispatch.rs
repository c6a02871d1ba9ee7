//! Shared, reentrancy-safe state reachable from both top-level `Engine` calls and
//! listener callbacks running underneath them.
//!
//! Split into a `Cell<bool>` flag plus two independent `RefCell`s rather than one big
//! `RefCell` around an aggregate struct: a listener invoked while `families` is borrowed
//! can still enqueue a mutation (which only needs `queues`) without tripping a double
//! borrow. The engine's master entity array is deliberately *not* part of this struct; it
//! stays on `Engine` itself, reachable only from non-reentrant, top-level code.

use crate::component::ComponentTypeIdx;
use crate::entity::EntityHandle;
use crate::storages::families::FamilyManager;
use crate::storages::operations::{EntityOperation, OperationQueues};
use std::any::Any;
use std::cell::{Cell, RefCell};

pub(crate) struct EngineShared {
    pub(crate) deferred: Cell<bool>,
    pub(crate) families: RefCell<FamilyManager>,
    pub(crate) queues: RefCell<OperationQueues>,
}

impl Default for EngineShared {
    fn default() -> Self {
        Self {
            deferred: Cell::new(false),
            families: RefCell::new(FamilyManager::default()),
            queues: RefCell::new(OperationQueues::default()),
        }
    }
}

impl EngineShared {
    /// Runs `f` with `deferred` held true for its duration, so mutations triggered from
    /// within `f` (typically listener callbacks) are queued instead of applied.
    pub(crate) fn with_notifying<R>(&self, f: impl FnOnce() -> R) -> R {
        let was_deferred = self.deferred.replace(true);
        let result = f();
        self.deferred.set(was_deferred);
        result
    }
}

pub(crate) fn add_component(handle: &EntityHandle, type_idx: ComponentTypeIdx, component: Box<dyn Any>) {
    let shared = handle.borrow().shared();
    match shared {
        Some(shared) if shared.deferred.get() => {
            shared.queues.borrow_mut().push(EntityOperation::AddComponent {
                handle: handle.clone(),
                type_idx,
                component,
            });
        }
        Some(shared) => {
            handle.borrow_mut().install_raw(type_idx, component);
            dispatch_family_changes(&shared, handle);
        }
        None => {
            handle.borrow_mut().install_raw(type_idx, component);
        }
    }
}

pub(crate) fn remove_component(handle: &EntityHandle, type_idx: ComponentTypeIdx) {
    let shared = handle.borrow().shared();
    match shared {
        Some(shared) if shared.deferred.get() => {
            shared
                .queues
                .borrow_mut()
                .push(EntityOperation::RemoveComponent {
                    handle: handle.clone(),
                    type_idx,
                });
        }
        Some(shared) => {
            handle.borrow_mut().uninstall_raw(type_idx);
            dispatch_family_changes(&shared, handle);
        }
        None => {
            handle.borrow_mut().uninstall_raw(type_idx);
        }
    }
}

pub(crate) fn remove_all_components(handle: &EntityHandle) {
    let shared = handle.borrow().shared();
    match shared {
        Some(shared) if shared.deferred.get() => {
            shared
                .queues
                .borrow_mut()
                .push(EntityOperation::RemoveAllComponents {
                    handle: handle.clone(),
                });
        }
        Some(shared) => {
            handle.borrow_mut().uninstall_all_raw();
            dispatch_family_changes(&shared, handle);
        }
        None => {
            handle.borrow_mut().uninstall_all_raw();
        }
    }
}

/// Applies one immediate mutation's family-membership fallout: re-evaluates every realized
/// family against `handle` and dispatches added/removed notifications to their listeners.
///
/// Listener dispatch happens with `deferred` held true and with no outstanding
/// [`FamilyManager`] borrow, so a listener is free to read family caches or request further
/// mutations (which queue, since `deferred` is true) without reentering a held borrow.
pub(crate) fn dispatch_family_changes(shared: &std::rc::Rc<EngineShared>, handle: &EntityHandle) {
    let changes = shared.families.borrow_mut().update_membership(handle);
    if changes.is_empty() {
        return;
    }
    shared.with_notifying(|| {
        for change in changes {
            match change {
                crate::storages::families::FamilyChange::Added(listener, entity) => {
                    listener.borrow_mut().on_entity_added(&entity);
                }
                crate::storages::families::FamilyChange::Removed(listener, entity) => {
                    listener.borrow_mut().on_entity_removed(&entity);
                }
            }
        }
    });
    drain_queue(shared);
}

/// Drains the operation queue to a fixpoint, applying every queued component-level
/// mutation directly and chasing the family-change fallout it produces.
///
/// `RemoveEntity` requests are left untouched in the queue: unlinking an entity from the
/// engine's master array is `Engine`'s job, not this module's, since that array is
/// deliberately kept out of [`EngineShared`]. They are re-queued once per pass and picked
/// up by [`Engine::update`](crate::Engine::update)'s own drain loop.
pub(crate) fn drain_queue(shared: &std::rc::Rc<EngineShared>) {
    loop {
        let batch = shared.queues.borrow_mut().drain();
        if batch.is_empty() {
            break;
        }
        let mut made_progress = false;
        let mut lifecycle_ops = Vec::new();
        for operation in batch {
            match operation {
                EntityOperation::AddComponent {
                    handle,
                    type_idx,
                    component,
                } => {
                    made_progress = true;
                    handle.borrow_mut().install_raw(type_idx, component);
                    dispatch_family_changes(shared, &handle);
                }
                EntityOperation::RemoveComponent { handle, type_idx } => {
                    made_progress = true;
                    handle.borrow_mut().uninstall_raw(type_idx);
                    dispatch_family_changes(shared, &handle);
                }
                EntityOperation::RemoveAllComponents { handle } => {
                    made_progress = true;
                    handle.borrow_mut().uninstall_all_raw();
                    dispatch_family_changes(shared, &handle);
                }
                op @ (EntityOperation::AddEntity { .. }
                | EntityOperation::RemoveEntity { .. }
                | EntityOperation::RemoveAll { .. }) => {
                    lifecycle_ops.push(op);
                }
            }
        }
        if !lifecycle_ops.is_empty() {
            let mut queues = shared.queues.borrow_mut();
            for op in lifecycle_ops {
                queues.push(op);
            }
        }
        if !made_progress {
            break;
        }
    }
}
