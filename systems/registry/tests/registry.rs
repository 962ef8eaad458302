use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use bastion_core::{EntityId, Mortal, OneShotSubscription};
use bastion_system_registry::{
    BindingStatus, CoreRegistry, CoreRegistryService, RegistryBinding, RegistrySlot, StageFailed,
    StageMonitor, StageOutcome,
};

#[derive(Debug)]
struct Core {
    id: EntityId,
    dead: Cell<bool>,
}

impl Core {
    fn new(id: u32) -> Rc<Self> {
        Rc::new(Self {
            id: EntityId::new(id),
            dead: Cell::new(false),
        })
    }

    fn kill(&self) {
        self.dead.set(true);
    }
}

impl Mortal for Core {
    fn id(&self) -> EntityId {
        self.id
    }

    fn is_dead(&self) -> bool {
        self.dead.get()
    }
}

fn scene(cores: &[&Rc<Core>]) -> Vec<Rc<dyn Mortal>> {
    cores
        .iter()
        .map(|core| Rc::clone(*core) as Rc<dyn Mortal>)
        .collect()
}

#[test]
fn zero_cores_is_not_a_failure() {
    let mut registry = CoreRegistry::new();
    assert!(registry.start(Vec::new()));

    assert!(registry.is_ready());
    assert!(!registry.is_stage_failed());
}

#[test]
fn failure_requires_every_core_dead() {
    let a = Core::new(1);
    let b = Core::new(2);
    let mut registry = CoreRegistry::new();
    assert!(registry.start(scene(&[&a, &b])));

    a.kill();
    assert!(!registry.is_stage_failed(), "B is still alive");

    b.kill();
    assert!(registry.is_stage_failed());
}

#[test]
fn duplicate_registration_changes_nothing() {
    let a = Core::new(1);
    let b = Core::new(2);
    let mut registry = CoreRegistry::new();
    assert!(registry.start(scene(&[&a, &b])));
    a.kill();

    assert!(!registry.register(a.clone()), "already known");
    assert!(!registry.unregister(EntityId::new(99)), "unknown core");

    assert_eq!(registry.len(), 2);
    assert!(registry.is_core(EntityId::new(1)));
    assert!(!registry.is_stage_failed());
}

#[test]
fn late_cores_self_register_after_the_sweep() {
    let a = Core::new(1);
    let late = Core::new(7);
    let mut registry = CoreRegistry::new();
    assert!(registry.start(scene(&[&a])));

    assert!(registry.register(late.clone()));
    a.kill();

    assert!(!registry.is_stage_failed(), "late core keeps the stage alive");
    assert!(registry.is_core(EntityId::new(7)));
}

#[test]
fn stage_failed_fires_once_when_the_last_core_dies() {
    let a = Core::new(1);
    let b = Core::new(2);
    let mut registry = CoreRegistry::new();
    assert!(registry.start(scene(&[&a, &b])));
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    assert!(matches!(
        registry.on_stage_failed(move |failed| sink.borrow_mut().push(*failed)),
        OneShotSubscription::Pending(_)
    ));

    a.kill();
    registry.core_died(EntityId::new(1));
    assert!(received.borrow().is_empty());

    b.kill();
    registry.core_died(EntityId::new(2));
    registry.core_died(EntityId::new(2));

    assert_eq!(*received.borrow(), vec![StageFailed { cores: 2 }]);
    assert_eq!(
        registry.on_stage_failed(|_| {}),
        OneShotSubscription::AlreadyFired
    );
}

#[test]
fn slot_exposes_the_null_registry_until_bound() {
    let slot = RegistrySlot::new();
    let core = Core::new(3);

    assert!(slot.resolve().is_null());
    assert!(!slot.register(core.clone()), "placeholder rejects registration");

    let registry = Rc::new(RefCell::new(CoreRegistry::new()));
    assert!(slot.bind(Rc::clone(&registry)));
    assert!(!slot.bind(Rc::new(RefCell::new(CoreRegistry::new()))));

    assert!(!slot.resolve().is_null());
    assert!(slot.register(core));
    assert!(registry.borrow().is_core(EntityId::new(3)));
}

#[test]
fn binding_after_ready_observes_it_immediately() {
    let slot = RegistrySlot::new();
    let registry = Rc::new(RefCell::new(CoreRegistry::new()));
    assert!(registry.borrow_mut().start(Vec::new()));
    assert!(slot.bind(Rc::clone(&registry)));

    let mut binding = RegistryBinding::new(slot.clone());

    assert_eq!(binding.poll(), BindingStatus::Ready);
    assert_eq!(binding.readiness_signals(), 1);
    assert!(binding.registry().is_some());
}

#[test]
fn binding_before_ready_receives_exactly_one_signal() {
    let slot = RegistrySlot::new();
    let mut binding = RegistryBinding::new(slot.clone());
    assert_eq!(binding.poll(), BindingStatus::Unbound);
    assert!(binding.registry().is_none());

    let registry = Rc::new(RefCell::new(CoreRegistry::new()));
    assert!(slot.bind(Rc::clone(&registry)));
    assert_eq!(binding.poll(), BindingStatus::BoundNotReady);
    assert_eq!(binding.poll(), BindingStatus::BoundNotReady);

    assert!(registry.borrow_mut().start(Vec::new()));
    assert_eq!(binding.status(), BindingStatus::Ready);
    assert_eq!(binding.poll(), BindingStatus::Ready);
    assert_eq!(binding.poll(), BindingStatus::Ready);

    assert_eq!(binding.readiness_signals(), 1);
}

#[test]
fn monitor_reports_failure_once() {
    let slot = RegistrySlot::new();
    let mut monitor = StageMonitor::new(slot.clone());
    let a = Core::new(1);
    assert_eq!(monitor.tick(), None);
    assert_eq!(monitor.status(), BindingStatus::Unbound);

    let registry = Rc::new(RefCell::new(CoreRegistry::new()));
    assert!(slot.bind(Rc::clone(&registry)));
    assert!(registry.borrow_mut().start(scene(&[&a])));
    assert_eq!(monitor.tick(), None);
    assert_eq!(monitor.status(), BindingStatus::Ready);

    a.kill();
    registry.borrow_mut().core_died(EntityId::new(1));

    assert_eq!(monitor.tick(), Some(StageOutcome::Failed { cores: 1 }));
    assert_eq!(monitor.tick(), None);
    assert!(monitor.has_reported());
}

fn record_failures(registry: &mut CoreRegistry) -> Rc<RefCell<Vec<StageFailed>>> {
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    let _ = registry.on_stage_failed(move |failed| sink.borrow_mut().push(*failed));
    received
}

#[test]
fn destroying_the_last_living_core_fails_the_stage() {
    let a = Core::new(1);
    let b = Core::new(2);
    let mut registry = CoreRegistry::new();
    assert!(registry.start(scene(&[&a, &b])));
    let received = record_failures(&mut registry);

    a.kill();
    registry.core_died(EntityId::new(1));
    assert!(received.borrow().is_empty(), "B is still alive");

    assert!(registry.entity_destroyed(EntityId::new(2)));

    assert!(registry.is_stage_failed());
    assert_eq!(*received.borrow(), vec![StageFailed { cores: 1 }]);
}

#[test]
fn registering_a_dead_core_after_the_sweep_fails_the_stage() {
    let dead = Core::new(5);
    dead.kill();
    let mut registry = CoreRegistry::new();
    assert!(registry.start(Vec::new()));
    let received = record_failures(&mut registry);

    assert!(registry.register(dead.clone()));

    assert_eq!(*received.borrow(), vec![StageFailed { cores: 1 }]);
    assert!(!registry.register(dead), "duplicate registration fires nothing");
    assert_eq!(received.borrow().len(), 1);
}

#[test]
fn registrations_before_the_sweep_do_not_signal_failure() {
    let dead = Core::new(6);
    dead.kill();
    let mut registry = CoreRegistry::new();
    let received = record_failures(&mut registry);

    assert!(registry.register(dead.clone()));
    assert!(received.borrow().is_empty(), "registry is not ready yet");

    assert!(registry.start(Vec::new()));
    assert_eq!(*received.borrow(), vec![StageFailed { cores: 1 }]);
}
