//! Temporal dependency
//!
//! When the bound service leaves and no replacement exists, the dependency
//! stays satisfied for a bounded time. Calls made through the
//! [`TemporalProxy`] meanwhile block until a replacement arrives or the
//! timeout elapses; once the gap expires the dependency is unbound.
//!
//! Each dependency owns at most one timer thread, started on its first gap
//! and re-armed on later ones, so a flapping provider never piles up timers.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cle_domain::error::{Error, Result};
use cle_domain::value_objects::{DependencyKind, Properties, Requirement, ServiceObject};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error};

use super::{Binding, BindingChange, DependencyHandler, ExpiryNotifier, Injected, Selector};
use crate::registry::{ServiceReference, ServiceRegistry};

#[derive(Default)]
struct TemporalSlot {
    service: Mutex<Option<ServiceObject>>,
    ready: Condvar,
}

impl TemporalSlot {
    fn set(&self, service: Option<ServiceObject>) {
        let available = service.is_some();
        *self.service.lock() = service;
        if available {
            self.ready.notify_all();
        }
    }
}

#[derive(Default)]
struct TimerState {
    /// Generation and deadline of the open gap
    armed: Option<(u64, Instant)>,
    stopped: bool,
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

impl TimerShared {
    fn run(&self, notifier: &ExpiryNotifier) {
        let mut state = self.state.lock();
        while !state.stopped {
            match state.armed {
                None => self.wake.wait(&mut state),
                Some((generation, deadline)) if Instant::now() >= deadline => {
                    state.armed = None;
                    MutexGuard::unlocked(&mut state, || notifier(generation));
                }
                Some((_, deadline)) => {
                    self.wake.wait_until(&mut state, deadline);
                }
            }
        }
    }
}

/// Single re-armable expiry timer of one temporal dependency
struct GapTimer {
    shared: Arc<TimerShared>,
    notifier: ExpiryNotifier,
    thread_name: String,
    /// Timer threads started so far; stays at most 1
    spawned: usize,
}

impl GapTimer {
    fn new(field: &str, notifier: ExpiryNotifier) -> Self {
        Self {
            shared: Arc::new(TimerShared::default()),
            notifier,
            thread_name: format!("cle-temporal-{field}"),
            spawned: 0,
        }
    }

    /// Fire `generation` after `timeout`, replacing any pending expiry
    fn arm(&mut self, generation: u64, timeout: Duration) {
        self.shared.state.lock().armed = Some((generation, Instant::now() + timeout));
        self.shared.wake.notify_one();
        if self.spawned > 0 {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let notifier = Arc::clone(&self.notifier);
        let spawned = std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || shared.run(&notifier));
        match spawned {
            Ok(_) => self.spawned += 1,
            Err(e) => {
                error!(thread = %self.thread_name, error = %e, "Cannot start temporal timer; expiring now");
                self.shared.state.lock().armed = None;
                (self.notifier)(generation);
            }
        }
    }

    fn cancel(&self) {
        self.shared.state.lock().armed = None;
        self.shared.wake.notify_one();
    }

    fn is_armed(&self) -> bool {
        self.shared.state.lock().armed.is_some()
    }
}

impl Drop for GapTimer {
    fn drop(&mut self) {
        // not joined: the last instance handle may be released on the timer thread
        self.shared.state.lock().stopped = true;
        self.shared.wake.notify_one();
    }
}

/// Handle injected for a temporal dependency
#[derive(Clone)]
pub struct TemporalProxy {
    specification: Arc<str>,
    timeout: Duration,
    slot: Arc<TemporalSlot>,
}

impl TemporalProxy {
    /// The bound service as `T`, waiting up to the timeout during a gap
    pub fn service<T>(&self) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let mut current = self.slot.service.lock();
        loop {
            if let Some(service) = current.as_ref() {
                return service.downcast::<T>().ok_or_else(|| {
                    Error::type_error(format!(
                        "'{}' service has an unexpected type",
                        self.specification
                    ))
                });
            }
            if self.slot.ready.wait_until(&mut current, deadline).timed_out() && current.is_none() {
                return Err(Error::TemporalTimeout {
                    specification: self.specification.to_string(),
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
    }

    /// Call `f` on the bound service, waiting during a gap
    pub fn call<T, R, F>(&self, f: F) -> Result<R>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce(&T) -> R,
    {
        let service = self.service::<T>()?;
        Ok(f(&*service))
    }

    /// Whether a service is bound right now
    pub fn is_available(&self) -> bool {
        self.slot.service.lock().is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for TemporalProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporalProxy")
            .field("specification", &self.specification)
            .field("timeout", &self.timeout)
            .field("available", &self.is_available())
            .finish()
    }
}

/// Single binding that survives short gaps
pub struct TemporalDependency {
    field: String,
    requirement: Requirement,
    kind: DependencyKind,
    selector: Selector,
    timeout: Duration,
    bound: Option<Binding>,
    /// Departed binding while waiting for a replacement
    departed: Option<Binding>,
    generation: u64,
    timer: GapTimer,
    proxy: TemporalProxy,
}

impl TemporalDependency {
    pub fn new(
        field: String,
        requirement: Requirement,
        timeout: Duration,
        notifier: ExpiryNotifier,
    ) -> Self {
        let selector = Selector::new(requirement.filter().cloned());
        let timer = GapTimer::new(&field, notifier);
        let proxy = TemporalProxy {
            specification: Arc::from(requirement.specification()),
            timeout,
            slot: Arc::new(TemporalSlot::default()),
        };
        Self {
            field,
            requirement,
            kind: DependencyKind::Temporal { timeout },
            selector,
            timeout,
            bound: None,
            departed: None,
            generation: 0,
            timer,
            proxy,
        }
    }

    fn bind(&mut self, binding: Binding) -> Vec<BindingChange> {
        self.proxy.slot.set(Some(binding.service.clone()));
        self.bound = Some(binding.clone());
        match self.departed.take() {
            Some(old) => {
                self.timer.cancel();
                debug!(field = %self.field, service_id = binding.id(), "Temporal gap closed");
                vec![BindingChange::Rebound {
                    old,
                    new: binding,
                    immediate: true,
                }]
            }
            None => vec![BindingChange::Bound(binding)],
        }
    }

    fn open_gap(&mut self, departed: Binding) {
        self.proxy.slot.set(None);
        self.departed = Some(departed);
        self.generation += 1;
        debug!(field = %self.field, timeout = ?self.timeout, "Temporal gap opened");
        self.timer.arm(self.generation, self.timeout);
    }
}

impl DependencyHandler for TemporalDependency {
    fn field(&self) -> &str {
        &self.field
    }

    fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    fn kind(&self) -> &DependencyKind {
        &self.kind
    }

    fn try_binding(&mut self, registry: &ServiceRegistry) -> Vec<BindingChange> {
        if self.bound.is_some() {
            return Vec::new();
        }
        match self.selector.best(registry, self.requirement.specification(), None) {
            Some(binding) => self.bind(binding),
            None => Vec::new(),
        }
    }

    fn on_service_registered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        if self.bound.is_some() {
            return Vec::new();
        }
        match Binding::resolve(registry, reference) {
            Some(binding) => self.bind(binding),
            None => Vec::new(),
        }
    }

    fn on_service_unregistered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        let Some(old) = self.bound.take_if(|b| b.id() == reference.id()) else {
            return Vec::new();
        };
        match self
            .selector
            .best(registry, self.requirement.specification(), Some(old.id()))
        {
            Some(new) => {
                self.proxy.slot.set(Some(new.service.clone()));
                self.bound = Some(new.clone());
                vec![BindingChange::Rebound {
                    old,
                    new,
                    immediate: true,
                }]
            }
            None => {
                self.open_gap(old);
                Vec::new()
            }
        }
    }

    fn on_service_modified(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
        previous: &Properties,
    ) -> Vec<BindingChange> {
        match &self.bound {
            Some(current) if current.id() == reference.id() => vec![BindingChange::Updated {
                binding: current.clone(),
                previous: previous.clone(),
            }],
            _ => self.on_service_registered(registry, reference),
        }
    }

    fn on_timeout(&mut self, generation: u64) -> Vec<BindingChange> {
        if generation != self.generation || self.bound.is_some() {
            return Vec::new();
        }
        match self.departed.take() {
            Some(old) => {
                debug!(field = %self.field, "Temporal gap expired");
                vec![BindingChange::Unbound(old)]
            }
            None => Vec::new(),
        }
    }

    fn is_satisfied(&self) -> bool {
        self.requirement.is_optional() || self.bound.is_some() || self.departed.is_some()
    }

    fn value(&self) -> Injected {
        if self.bound.is_some() || self.departed.is_some() {
            Injected::Temporal(self.proxy.clone())
        } else {
            Injected::None
        }
    }

    fn bindings(&self) -> Vec<Binding> {
        self.bound.iter().cloned().collect()
    }

    fn clear(&mut self) -> Vec<BindingChange> {
        self.generation += 1;
        self.timer.cancel();
        self.proxy.slot.set(None);
        self.bound
            .take()
            .or_else(|| self.departed.take())
            .map(BindingChange::Unbound)
            .into_iter()
            .collect()
    }
}
