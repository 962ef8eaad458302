//! Late binding of consumers to the core registry.

use std::{
    cell::{Cell, OnceCell, RefCell},
    fmt,
    rc::Rc,
};

use bastion_core::{Mortal, OneShotSubscription};

use crate::{CoreRegistry, CoreRegistryService, NullCoreRegistry};

/// Shared handle through which consumers reach the registry.
///
/// The slot resolves to [`NullCoreRegistry`] until [`RegistrySlot::bind`]
/// installs the real registry. Clones observe the same binding.
#[derive(Clone, Default)]
pub struct RegistrySlot {
    bound: Rc<OnceCell<Rc<RefCell<CoreRegistry>>>>,
}

impl RegistrySlot {
    /// Creates an unbound slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the real registry. Only the first call takes effect.
    pub fn bind(&self, registry: Rc<RefCell<CoreRegistry>>) -> bool {
        if self.bound.set(registry).is_err() {
            tracing::warn!("registry slot is already bound; ignoring rebind");
            return false;
        }
        tracing::debug!("registry slot bound");
        true
    }

    /// Returns whatever the slot currently exposes.
    #[must_use]
    pub fn resolve(&self) -> RegistryHandle {
        match self.bound.get() {
            Some(registry) => RegistryHandle::Real(Rc::clone(registry)),
            None => RegistryHandle::Null(NullCoreRegistry),
        }
    }

    /// Registers a core with whatever the slot currently exposes.
    pub fn register(&self, core: Rc<dyn Mortal>) -> bool {
        match self.resolve() {
            RegistryHandle::Null(mut null) => null.register(core),
            RegistryHandle::Real(registry) => registry.borrow_mut().register(core),
        }
    }
}

impl fmt::Debug for RegistrySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySlot")
            .field("bound", &self.bound.get().is_some())
            .finish()
    }
}

/// Registry reachable through a slot at a given moment.
#[derive(Clone, Debug)]
pub enum RegistryHandle {
    /// Placeholder seen before binding.
    Null(NullCoreRegistry),
    /// The bound registry.
    Real(Rc<RefCell<CoreRegistry>>),
}

impl RegistryHandle {
    /// Reports whether the handle is the placeholder.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null(null) => null.is_null(),
            Self::Real(registry) => registry.borrow().is_null(),
        }
    }
}

/// Progress of a consumer towards a usable registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingStatus {
    /// Only the placeholder is reachable.
    Unbound,
    /// The real registry is reachable but has not run its sweep.
    BoundNotReady,
    /// The registry is ready and its queries are meaningful.
    Ready,
}

/// Per-tick binding continuation for consumers created before the registry.
#[derive(Debug)]
pub struct RegistryBinding {
    slot: RegistrySlot,
    registry: Option<Rc<RefCell<CoreRegistry>>>,
    subscribed: bool,
    ready: Rc<Cell<bool>>,
    signals: Rc<Cell<u32>>,
}

impl RegistryBinding {
    /// Creates a binding that will look for the registry through `slot`.
    #[must_use]
    pub fn new(slot: RegistrySlot) -> Self {
        Self {
            slot,
            registry: None,
            subscribed: false,
            ready: Rc::new(Cell::new(false)),
            signals: Rc::new(Cell::new(0)),
        }
    }

    /// Advances the binding by one tick.
    ///
    /// Once the real registry is found its readiness is checked immediately;
    /// only when it is not ready yet does the binding subscribe to the
    /// readiness notification instead of polling.
    pub fn poll(&mut self) -> BindingStatus {
        if self.ready.get() {
            return BindingStatus::Ready;
        }

        if self.registry.is_none() {
            match self.slot.resolve() {
                RegistryHandle::Null(_) => return BindingStatus::Unbound,
                RegistryHandle::Real(registry) => self.registry = Some(registry),
            }
        }
        let Some(registry) = self.registry.clone() else {
            return BindingStatus::Unbound;
        };

        if !self.subscribed {
            let mut registry = registry.borrow_mut();
            if registry.is_ready() {
                mark_ready(&self.ready, &self.signals);
                return BindingStatus::Ready;
            }

            let ready = Rc::clone(&self.ready);
            let signals = Rc::clone(&self.signals);
            match registry.on_ready(move |_| mark_ready(&ready, &signals)) {
                OneShotSubscription::Pending(_) => self.subscribed = true,
                OneShotSubscription::AlreadyFired => mark_ready(&self.ready, &self.signals),
            }
            tracing::debug!(subscribed = self.subscribed, "registry bound");
        }

        if self.ready.get() {
            BindingStatus::Ready
        } else {
            BindingStatus::BoundNotReady
        }
    }

    /// Current status without advancing.
    #[must_use]
    pub fn status(&self) -> BindingStatus {
        match (self.ready.get(), self.registry.is_some()) {
            (true, _) => BindingStatus::Ready,
            (false, true) => BindingStatus::BoundNotReady,
            (false, false) => BindingStatus::Unbound,
        }
    }

    /// Number of readiness signals observed. Never exceeds one.
    #[must_use]
    pub fn readiness_signals(&self) -> u32 {
        self.signals.get()
    }

    /// Registry once the binding is ready.
    #[must_use]
    pub fn registry(&self) -> Option<&Rc<RefCell<CoreRegistry>>> {
        self.registry.as_ref().filter(|_| self.ready.get())
    }
}

fn mark_ready(ready: &Cell<bool>, signals: &Cell<u32>) {
    if !ready.replace(true) {
        signals.set(signals.get() + 1);
    }
}

/// Terminal stage result reported by [`StageMonitor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// Every registered core is dead.
    Failed {
        /// Number of cores registered when the failure was observed.
        cores: usize,
    },
}

/// Late consumer that turns the failure predicate into a single outcome.
#[derive(Debug)]
pub struct StageMonitor {
    binding: RegistryBinding,
    reported: bool,
}

impl StageMonitor {
    /// Creates a monitor reaching the registry through `slot`.
    #[must_use]
    pub fn new(slot: RegistrySlot) -> Self {
        Self {
            binding: RegistryBinding::new(slot),
            reported: false,
        }
    }

    /// Advances the binding and reports failure the first time it is observed.
    pub fn tick(&mut self) -> Option<StageOutcome> {
        if self.reported || self.binding.poll() != BindingStatus::Ready {
            return None;
        }

        let registry = self.binding.registry()?.borrow();
        if !registry.is_stage_failed() {
            return None;
        }

        let cores = registry.len();
        drop(registry);
        self.reported = true;
        tracing::info!(cores, "stage outcome: failed");
        Some(StageOutcome::Failed { cores })
    }

    /// Current binding status.
    #[must_use]
    pub fn status(&self) -> BindingStatus {
        self.binding.status()
    }

    /// Reports whether the failure outcome has been emitted.
    #[must_use]
    pub const fn has_reported(&self) -> bool {
        self.reported
    }
}
