#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Registry tracking the core entities whose collective death fails a stage.
//!
//! The registry observes cores through the [`Mortal`] capability and owns no
//! entity lifetimes. Consumers reach it through a [`RegistrySlot`], which
//! exposes an inert [`NullCoreRegistry`] until the real registry is bound.

mod binding;

use std::{collections::HashSet, fmt, rc::Rc};

use bastion_core::{EntityId, Mortal, OneShot, OneShotSubscription};

pub use binding::{
    BindingStatus, RegistryBinding, RegistryHandle, RegistrySlot, StageMonitor, StageOutcome,
};

/// Announced once when the start-up sweep completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryReady {
    /// Number of cores known when the registry became ready.
    pub cores: usize,
}

/// Announced once when every registered core has died.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageFailed {
    /// Number of cores registered at the moment of failure.
    pub cores: usize,
}

/// Operations shared by the real registry and its null placeholder.
pub trait CoreRegistryService {
    /// Reports whether this is the inert placeholder.
    fn is_null(&self) -> bool {
        false
    }

    /// Reports whether the start-up sweep has completed.
    fn is_ready(&self) -> bool;

    /// Adds a core. Returns `false` when it was already known or rejected.
    fn register(&mut self, core: Rc<dyn Mortal>) -> bool;

    /// Removes a core. Returns `false` when it was not known.
    fn unregister(&mut self, entity: EntityId) -> bool;

    /// Reports whether the entity is a registered core.
    fn is_core(&self, entity: EntityId) -> bool;

    /// At least one core is registered and every registered core is dead.
    fn is_stage_failed(&self) -> bool;
}

/// Placeholder observed before the real registry is bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NullCoreRegistry;

impl CoreRegistryService for NullCoreRegistry {
    fn is_null(&self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn register(&mut self, core: Rc<dyn Mortal>) -> bool {
        tracing::warn!(
            entity = core.id().get(),
            "core registered before the registry was bound; rejected",
        );
        false
    }

    fn unregister(&mut self, entity: EntityId) -> bool {
        tracing::warn!(
            entity = entity.get(),
            "core unregistered before the registry was bound; ignored",
        );
        false
    }

    fn is_core(&self, _entity: EntityId) -> bool {
        false
    }

    fn is_stage_failed(&self) -> bool {
        false
    }
}

/// De-duplicated collection of cores with a derived owner lookup.
pub struct CoreRegistry {
    cores: Vec<Rc<dyn Mortal>>,
    owners: HashSet<EntityId>,
    ready: bool,
    ready_signal: OneShot<RegistryReady>,
    failure_signal: OneShot<StageFailed>,
}

impl CoreRegistry {
    /// Creates an empty registry that has not run its sweep.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cores: Vec::new(),
            owners: HashSet::new(),
            ready: false,
            ready_signal: OneShot::new(),
            failure_signal: OneShot::new(),
        }
    }

    /// Runs the start-up sweep over the scene and marks the registry ready.
    ///
    /// Only active entities are collected. The sweep runs once; later calls
    /// are ignored and return `false`.
    pub fn start<I>(&mut self, scene: I) -> bool
    where
        I: IntoIterator<Item = Rc<dyn Mortal>>,
    {
        if self.ready {
            tracing::warn!("registry sweep requested twice; ignored");
            return false;
        }

        for core in scene {
            if core.is_active() {
                let _ = self.register(core);
            }
        }
        self.ready = true;
        let ready = RegistryReady {
            cores: self.cores.len(),
        };
        tracing::info!(cores = ready.cores, "core registry ready");
        let _ = self.ready_signal.fire(&ready);
        self.check_failure();
        true
    }

    /// Subscribes to the readiness notification.
    ///
    /// Returns [`OneShotSubscription::AlreadyFired`] without storing the
    /// callback when the registry is already ready.
    pub fn on_ready<F>(&mut self, callback: F) -> OneShotSubscription
    where
        F: FnOnce(&RegistryReady) + 'static,
    {
        self.ready_signal.subscribe(callback)
    }

    /// Subscribes to the stage failure notification.
    pub fn on_stage_failed<F>(&mut self, callback: F) -> OneShotSubscription
    where
        F: FnOnce(&StageFailed) + 'static,
    {
        self.failure_signal.subscribe(callback)
    }

    /// Reports that a core died and re-evaluates the failure predicate.
    pub fn core_died(&mut self, entity: EntityId) {
        if !self.owners.contains(&entity) {
            tracing::debug!(entity = entity.get(), "death reported for unknown core");
            return;
        }
        tracing::debug!(entity = entity.get(), "core died");
        self.check_failure();
    }

    /// Drops a destroyed entity from the registry if it was a core.
    pub fn entity_destroyed(&mut self, entity: EntityId) -> bool {
        self.unregister(entity)
    }

    /// Number of registered cores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    /// Reports whether no cores are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// Identifiers of the registered cores in registration order.
    pub fn core_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.cores.iter().map(|core| core.id())
    }

    fn check_failure(&mut self) {
        if self.failure_signal.is_fired() || !self.is_stage_failed() {
            return;
        }
        let failed = StageFailed {
            cores: self.cores.len(),
        };
        tracing::info!(cores = failed.cores, "every core is dead; stage failed");
        let _ = self.failure_signal.fire(&failed);
    }
}

impl Default for CoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreRegistryService for CoreRegistry {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn register(&mut self, core: Rc<dyn Mortal>) -> bool {
        let entity = core.id();
        if !self.owners.insert(entity) {
            return false;
        }
        tracing::debug!(entity = entity.get(), "core registered");
        self.cores.push(core);
        if self.ready {
            self.check_failure();
        }
        true
    }

    fn unregister(&mut self, entity: EntityId) -> bool {
        if !self.owners.remove(&entity) {
            return false;
        }
        self.cores.retain(|core| core.id() != entity);
        tracing::debug!(entity = entity.get(), "core unregistered");
        self.check_failure();
        true
    }

    fn is_core(&self, entity: EntityId) -> bool {
        self.owners.contains(&entity)
    }

    fn is_stage_failed(&self) -> bool {
        !self.cores.is_empty() && self.cores.iter().all(|core| core.is_dead())
    }
}

impl fmt::Debug for CoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreRegistry")
            .field("cores", &self.owners)
            .field("ready", &self.ready)
            .field("failed", &self.failure_signal.is_fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Core {
        id: EntityId,
        dead: Cell<bool>,
        active: bool,
    }

    impl Mortal for Core {
        fn id(&self) -> EntityId {
            self.id
        }

        fn is_dead(&self) -> bool {
            self.dead.get()
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    fn tracked(id: u32, active: bool) -> Rc<dyn Mortal> {
        Rc::new(Core {
            id: EntityId::new(id),
            dead: Cell::new(false),
            active,
        })
    }

    #[test]
    fn sweep_skips_inactive_entities() {
        let mut registry = CoreRegistry::new();

        assert!(registry.start([tracked(1, true), tracked(2, false), tracked(3, true)]));

        assert_eq!(
            registry.core_ids().collect::<Vec<_>>(),
            vec![EntityId::new(1), EntityId::new(3)]
        );
        assert!(!registry.is_core(EntityId::new(2)));
    }

    #[test]
    fn sweep_runs_once() {
        let mut registry = CoreRegistry::new();
        assert!(registry.start([tracked(1, true)]));

        assert!(!registry.start([tracked(2, true)]), "second sweep is ignored");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregistering_updates_the_lookup() {
        let mut registry = CoreRegistry::new();
        assert!(registry.register(tracked(4, true)));

        assert!(registry.entity_destroyed(EntityId::new(4)));
        assert!(!registry.entity_destroyed(EntityId::new(4)));
        assert!(registry.is_empty());
        assert!(!registry.is_core(EntityId::new(4)));
    }

    #[test]
    fn null_registry_rejects_everything() {
        let mut null = NullCoreRegistry;

        assert!(null.is_null());
        assert!(!null.register(tracked(1, true)));
        assert!(!null.unregister(EntityId::new(1)));
        assert!(!null.is_ready());
        assert!(!null.is_stage_failed());
    }
}
