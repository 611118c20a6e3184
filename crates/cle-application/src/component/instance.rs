//! Component instance state machine
//!
//! Every instance owns a mailbox. Registry listeners, timers, custom
//! handlers and administrative calls only post [`Change`]s to it; whoever
//! holds the instance lock drains the mailbox in order. Drains triggered by
//! registry events are deferred until the registry dispatch lock is
//! released, so component callbacks never run under it.
//!
//! ```text
//!            ┌──────────── check ───────────┐
//!            ▼                              │
//! INSTANTIATED ──▶ VALIDATING ──▶ VALID ──▶ INVALID
//!                      │                    ▲
//!                      └──▶ ERRONEOUS ──────┘ (retry)
//!
//! any state ──▶ KILLED
//! ```

use std::any::Any;
use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Duration;

use cle_domain::constants::{FACTORY_NAME, INSTANCE_NAME};
use cle_domain::error::{CallbackError, CallbackResult, Error, Result, StopSeverity};
use cle_domain::events::{LifecycleEvent, LifecycleEventKind};
use cle_domain::value_objects::{ComponentState, InstanceDetails, Properties, ProvidedDetails};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::descriptor::ComponentDescriptor;
use crate::dispatch::EventHub;
use crate::handlers::{Binding, BindingChange, DependencyHandler, ExpiryNotifier, create_handler};
use crate::ports::component::ContextRequest;
use crate::ports::{Component, ComponentContext, HandlerContext, HandlerFactory, InstanceHandler};
use crate::ports::handlers::LifecycleTrigger;
use crate::registry::{
    DispatchScope, ListenerId, ServiceEvent, ServiceEventKind, ServiceListener,
    ServiceRegistration, ServiceRegistry,
};

thread_local! {
    /// Number of instance drains running on this thread
    static DRAIN_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DrainGuard;

impl DrainGuard {
    fn enter() -> Self {
        DRAIN_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAIN_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Engine services an instance relies on
pub(crate) trait EngineHooks: Send + Sync {
    fn is_running(&self) -> bool;

    /// Kill an instance on behalf of its own component
    fn request_kill(&self, name: &str);

    fn request_shutdown(&self);
}

/// Result of a lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Completed,
    /// Validation failed; the instance keeps this error trace
    Erroneous(String),
    /// Component code asked for a kill or an engine stop
    StopRequested(StopSeverity),
}

/// Work item of an instance mailbox
enum Change {
    Start,
    Service { handler: usize, event: ServiceEvent },
    Expired { handler: usize, generation: u64 },
    Properties { updates: Properties, reconfigure: bool },
    SetController { specification: String, value: bool },
    Invalidate,
    Retry(Properties),
    Check,
    Kill,
}

struct ProvidedService {
    specification: String,
    controller: Option<bool>,
    registration: Option<ServiceRegistration>,
}

struct InstanceCore {
    state: ComponentState,
    started: bool,
    component: Box<dyn Component>,
    properties: Properties,
    handlers: Vec<Box<dyn DependencyHandler>>,
    listeners: Vec<ListenerId>,
    custom: Vec<(String, Box<dyn InstanceHandler>)>,
    provided: Vec<ProvidedService>,
    error_trace: Option<String>,
}

/// Everything needed to create an instance
pub(crate) struct InstanceSpec {
    pub name: String,
    pub bundle: String,
    pub descriptor: Arc<ComponentDescriptor>,
    /// Factory defaults merged with the requested properties
    pub properties: Properties,
    pub registry: Arc<ServiceRegistry>,
    pub events: Arc<EventHub>,
    pub hooks: Weak<dyn EngineHooks>,
    pub default_timeout: Duration,
    /// Custom handler factories, in descriptor order
    pub handler_factories: Vec<Arc<dyn HandlerFactory>>,
}

/// A live component instance
pub struct StoredInstance {
    name: String,
    bundle: String,
    descriptor: Arc<ComponentDescriptor>,
    registry: Arc<ServiceRegistry>,
    events: Arc<EventHub>,
    hooks: Weak<dyn EngineHooks>,
    weak_self: Weak<StoredInstance>,
    core: Mutex<InstanceCore>,
    mailbox: Mutex<VecDeque<Change>>,
    snapshot: RwLock<InstanceDetails>,
}

/// Registry listener feeding one dependency handler
struct HandlerListener {
    instance: Weak<StoredInstance>,
    handler: usize,
}

impl ServiceListener for HandlerListener {
    fn service_changed(&self, event: &ServiceEvent, scope: &DispatchScope<'_>) {
        let Some(instance) = self.instance.upgrade() else {
            return;
        };
        instance.post(Change::Service {
            handler: self.handler,
            event: event.clone(),
        });
        scope.defer(move || instance.drain());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run component code, turning a panic into a callback failure
fn guarded<R>(
    what: &str,
    f: impl FnOnce() -> std::result::Result<R, CallbackError>,
) -> std::result::Result<R, CallbackError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(CallbackError::failed(format!(
            "{what} panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

impl StoredInstance {
    /// Construct and configure the component, then wire its handlers.
    ///
    /// Nothing is subscribed yet: [`start`](Self::start) does that.
    pub(crate) fn create(spec: InstanceSpec) -> Result<Arc<Self>> {
        let InstanceSpec {
            name,
            bundle,
            descriptor,
            mut properties,
            registry,
            events,
            hooks,
            default_timeout,
            handler_factories,
        } = spec;
        let factory = descriptor.factory().to_string();

        let constructor = Arc::clone(descriptor.constructor());
        let mut component = guarded("constructor", || constructor(&properties)).map_err(|e| {
            Error::type_error(format!("cannot construct '{name}' from factory '{factory}': {e}"))
        })?;

        let mut ctx = ComponentContext::new(&name, &factory, &properties, &registry);
        let configured = guarded("configure", || component.configure(&properties, &mut ctx));
        let requests = ctx.into_requests();
        configured.map_err(|e| {
            Error::type_error(format!("cannot configure '{name}' from factory '{factory}': {e}"))
        })?;

        let mut provided: Vec<ProvidedService> = descriptor
            .provides()
            .iter()
            .map(|p| ProvidedService {
                specification: p.specification.clone(),
                controller: p.controller,
                registration: None,
            })
            .collect();
        for request in requests {
            match request {
                ContextRequest::SetProperty(key, value) => {
                    properties.insert(key, value);
                }
                ContextRequest::SetController(specification, value) => {
                    if let Some(p) = provided.iter_mut().find(|p| p.specification == specification) {
                        p.controller = Some(value);
                    }
                }
            }
        }

        let instance = Arc::new_cyclic(|weak: &Weak<Self>| {
            let handlers = descriptor
                .requirements()
                .iter()
                .enumerate()
                .map(|(index, requirement)| {
                    let target = weak.clone();
                    let on_expiry: ExpiryNotifier = Arc::new(move |generation| {
                        if let Some(instance) = target.upgrade() {
                            instance.post(Change::Expired {
                                handler: index,
                                generation,
                            });
                            instance.drain();
                        }
                    });
                    create_handler(
                        &requirement.field,
                        &requirement.requirement,
                        &requirement.kind,
                        &properties,
                        default_timeout,
                        on_expiry,
                    )
                })
                .collect();

            let core = InstanceCore {
                state: ComponentState::Instantiated,
                started: false,
                component,
                properties,
                handlers,
                listeners: Vec::new(),
                custom: Vec::new(),
                provided,
                error_trace: None,
            };
            let snapshot = RwLock::new(InstanceDetails {
                name: name.clone(),
                factory: factory.clone(),
                bundle: bundle.clone(),
                state: ComponentState::Instantiated,
                properties: core.properties.clone(),
                dependencies: Vec::new(),
                provides: Vec::new(),
                handlers: descriptor.handlers().to_vec(),
                error_trace: None,
            });
            Self {
                name,
                bundle,
                descriptor,
                registry,
                events,
                hooks,
                weak_self: weak.clone(),
                core: Mutex::new(core),
                mailbox: Mutex::new(VecDeque::new()),
                snapshot,
            }
        });

        {
            let mut core = instance.core.lock();
            let mut custom = Vec::with_capacity(handler_factories.len());
            for handler_factory in handler_factories {
                let context = HandlerContext {
                    instance: instance.name.clone(),
                    factory: instance.factory().to_string(),
                    properties: core.properties.clone(),
                    trigger: LifecycleTrigger::new(Arc::downgrade(&instance)),
                };
                let handler = guarded("handler factory", || handler_factory.create_handler(&context))
                    .map_err(|e| {
                        Error::type_error(format!(
                            "handler '{}' refused instance '{}': {e}",
                            handler_factory.handler_id(),
                            instance.name
                        ))
                    })?;
                custom.push((handler_factory.handler_id().to_string(), handler));
            }
            core.custom = custom;
            instance.refresh_snapshot(&core);
        }
        Ok(instance)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factory(&self) -> &str {
        self.descriptor.factory()
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn state(&self) -> ComponentState {
        self.snapshot.read().state
    }

    /// Snapshot taken after the last processed change
    pub fn details(&self) -> InstanceDetails {
        self.snapshot.read().clone()
    }

    pub(crate) fn descriptor(&self) -> &Arc<ComponentDescriptor> {
        &self.descriptor
    }

    // ========================================================================
    // Mailbox
    // ========================================================================

    fn post(&self, change: Change) {
        self.mailbox.lock().push_back(change);
    }

    /// Process queued changes unless another caller already does
    fn drain(&self) {
        loop {
            let Some(mut core) = self.core.try_lock() else {
                return;
            };
            self.process_pending(&mut core);
            drop(core);
            if self.mailbox.lock().is_empty() {
                return;
            }
        }
    }

    /// Process queued changes, waiting for a concurrent drain to finish.
    ///
    /// Inside a drain (a callback calling back into the engine) this never
    /// blocks: the change is left to the running drain.
    fn settle(&self) {
        if DRAIN_DEPTH.with(Cell::get) > 0 {
            self.drain();
            return;
        }
        loop {
            {
                let mut core = self.core.lock();
                self.process_pending(&mut core);
            }
            if self.mailbox.lock().is_empty() {
                return;
            }
        }
    }

    fn process_pending(&self, core: &mut InstanceCore) {
        let _guard = DrainGuard::enter();
        loop {
            let next = self.mailbox.lock().pop_front();
            let Some(change) = next else {
                break;
            };
            if core.state == ComponentState::Killed {
                continue;
            }
            self.process(core, change);
            self.refresh_snapshot(core);
        }
    }

    fn process(&self, core: &mut InstanceCore, change: Change) {
        let outcome = match change {
            Change::Start => self.start_core(core),
            Change::Service { handler, event } => {
                let changes = self.route(core, handler, &event);
                self.apply_changes(core, handler, changes, true)
            }
            Change::Expired {
                handler,
                generation,
            } => {
                let changes = core.handlers[handler].on_timeout(generation);
                self.apply_changes(core, handler, changes, true)
            }
            Change::Properties {
                updates,
                reconfigure,
            } => self.update_properties_core(core, updates, reconfigure),
            Change::SetController {
                specification,
                value,
            } => {
                self.set_controller_core(core, &specification, value);
                LifecycleOutcome::Completed
            }
            Change::Invalidate => {
                if core.state == ComponentState::Valid {
                    self.invalidate_core(core);
                }
                LifecycleOutcome::Completed
            }
            Change::Retry(properties) => self.retry_core(core, properties),
            Change::Check => self.check_lifecycle(core),
            Change::Kill => {
                self.kill_core(core);
                LifecycleOutcome::Completed
            }
        };
        if let LifecycleOutcome::StopRequested(severity) = outcome {
            debug!(instance = %self.name, ?severity, "Stop requested by component");
        }
    }

    fn refresh_snapshot(&self, core: &InstanceCore) {
        let details = InstanceDetails {
            name: self.name.clone(),
            factory: self.factory().to_string(),
            bundle: self.bundle.clone(),
            state: core.state,
            properties: core.properties.clone(),
            dependencies: core.handlers.iter().map(|h| h.details()).collect(),
            provides: core
                .provided
                .iter()
                .map(|p| ProvidedDetails {
                    specification: p.specification.clone(),
                    service_id: p.registration.as_ref().map(ServiceRegistration::id),
                    controller: p.controller,
                })
                .collect(),
            handlers: core.custom.iter().map(|(id, _)| id.clone()).collect(),
            error_trace: core.error_trace.clone(),
        };
        *self.snapshot.write() = details;
    }

    // ========================================================================
    // Engine-facing operations
    // ========================================================================

    /// Subscribe the handlers, bind existing services and run the first check
    pub(crate) fn start(&self) -> ComponentState {
        self.post(Change::Start);
        self.settle();
        self.state()
    }

    pub(crate) fn kill(&self) {
        self.post(Change::Kill);
        self.settle();
    }

    pub(crate) fn invalidate(&self) -> ComponentState {
        self.post(Change::Invalidate);
        self.settle();
        self.state()
    }

    pub(crate) fn retry(&self, properties: Properties) -> ComponentState {
        self.post(Change::Retry(properties));
        self.settle();
        self.state()
    }

    pub(crate) fn update_properties(&self, properties: Properties) {
        self.post(Change::Properties {
            updates: properties,
            reconfigure: true,
        });
        self.settle();
    }

    pub(crate) fn set_controller(&self, specification: &str, value: bool) {
        self.post(Change::SetController {
            specification: specification.to_string(),
            value,
        });
        self.settle();
    }

    /// Called by custom handlers from any thread
    pub(crate) fn request_check(&self) {
        self.post(Change::Check);
        self.drain();
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    fn publish(&self, kind: LifecycleEventKind) {
        self.events
            .publish(LifecycleEvent::for_instance(kind, self.factory(), &self.name));
    }

    fn publish_binding(&self, kind: LifecycleEventKind, field: &str, binding: &Binding) {
        self.events.publish(
            LifecycleEvent::for_instance(kind, self.factory(), &self.name)
                .with_binding(field, binding.id()),
        );
    }

    /// Run a component callback with a context, queueing its requests
    fn invoke<F>(&self, core: &mut InstanceCore, what: &str, f: F) -> CallbackResult
    where
        F: FnOnce(&mut Box<dyn Component>, &mut ComponentContext<'_>) -> CallbackResult,
    {
        let mut ctx =
            ComponentContext::new(&self.name, self.factory(), &core.properties, &self.registry);
        let component = &mut core.component;
        let result = guarded(what, || f(component, &mut ctx));
        for request in ctx.into_requests() {
            self.post(match request {
                ContextRequest::SetProperty(key, value) => Change::Properties {
                    updates: Properties::from([(key, value)]),
                    reconfigure: false,
                },
                ContextRequest::SetController(specification, value) => Change::SetController {
                    specification,
                    value,
                },
            });
        }
        result
    }

    fn request_stop(&self, severity: StopSeverity) {
        let hooks = self.hooks.upgrade();
        match (severity, hooks) {
            (StopSeverity::KillComponent, Some(hooks)) => hooks.request_kill(&self.name),
            (StopSeverity::KillComponent, None) => self.post(Change::Kill),
            (StopSeverity::StopEngine, Some(hooks)) => hooks.request_shutdown(),
            (StopSeverity::StopEngine, None) => {
                warn!(instance = %self.name, "Engine stop requested without an engine; killing the instance");
                self.post(Change::Kill);
            }
        }
    }

    /// Log a failed binding callback and honour stop requests
    fn binding_callback_failed(&self, what: &str, field: &str, binding: &Binding, e: &CallbackError) {
        warn!(
            instance = %self.name,
            field,
            service_id = binding.id(),
            error = %e,
            "{what} callback failed"
        );
        if let Some(severity) = e.stop_severity() {
            self.request_stop(severity);
        }
    }

    fn inject(&self, core: &mut InstanceCore, index: usize) {
        let field = core.handlers[index].field().to_string();
        let value = core.handlers[index].value();
        let component = &mut core.component;
        if let Err(e) = guarded("inject", || {
            component.inject(&field, value);
            Ok(())
        }) {
            warn!(instance = %self.name, field, error = %e, "Injection failed");
        }
    }

    fn bind(&self, core: &mut InstanceCore, field: &str, binding: &Binding) {
        if let Err(e) = self.invoke(core, "bind", |c, ctx| {
            c.bind(field, &binding.service, &binding.reference, ctx)
        }) {
            self.binding_callback_failed("bind", field, binding, &e);
        }
        self.publish_binding(LifecycleEventKind::Bound, field, binding);
    }

    fn unbind(&self, core: &mut InstanceCore, field: &str, binding: &Binding) {
        if let Err(e) = self.invoke(core, "unbind", |c, ctx| {
            c.unbind(field, &binding.service, &binding.reference, ctx)
        }) {
            self.binding_callback_failed("unbind", field, binding, &e);
        }
        self.publish_binding(LifecycleEventKind::Unbound, field, binding);
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    fn route(&self, core: &mut InstanceCore, index: usize, event: &ServiceEvent) -> Vec<BindingChange> {
        let handler = &mut core.handlers[index];
        let reference = &event.reference;
        match event.kind {
            ServiceEventKind::Registered => {
                if handler.accepts(reference.specification(), &event.properties) {
                    handler.on_service_registered(&self.registry, reference)
                } else {
                    Vec::new()
                }
            }
            ServiceEventKind::Modified => {
                if handler.accepts(reference.specification(), &event.properties) {
                    let previous = event
                        .previous_properties
                        .as_deref()
                        .cloned()
                        .unwrap_or_default();
                    handler.on_service_modified(&self.registry, reference, &previous)
                } else {
                    handler.on_service_unregistered(&self.registry, reference)
                }
            }
            ServiceEventKind::ModifiedEndMatch | ServiceEventKind::Unregistering => {
                handler.on_service_unregistered(&self.registry, reference)
            }
        }
    }

    /// Turn handler changes into callbacks and events.
    ///
    /// Arrivals are notified before the lifecycle check, departures after
    /// it, so a component is invalidated while it still holds the departing
    /// service.
    fn apply_changes(
        &self,
        core: &mut InstanceCore,
        index: usize,
        changes: Vec<BindingChange>,
        check: bool,
    ) -> LifecycleOutcome {
        let field = core.handlers[index].field().to_string();
        let mut outcome = LifecycleOutcome::Completed;
        for change in changes {
            match change {
                BindingChange::Bound(binding) => {
                    self.inject(core, index);
                    self.bind(core, &field, &binding);
                }
                BindingChange::Unbound(binding) => {
                    if check {
                        outcome = self.check_lifecycle(core);
                    }
                    self.inject(core, index);
                    self.unbind(core, &field, &binding);
                }
                BindingChange::Updated { binding, previous } => {
                    self.inject(core, index);
                    if let Err(e) = self.invoke(core, "update", |c, ctx| {
                        c.update(&field, &binding.service, &binding.reference, &previous, ctx)
                    }) {
                        self.binding_callback_failed("update", &field, &binding, &e);
                    }
                    self.publish_binding(LifecycleEventKind::Updated, &field, &binding);
                }
                BindingChange::Rebound {
                    old,
                    new,
                    immediate,
                } => {
                    if !immediate && core.state == ComponentState::Valid {
                        self.invalidate_core(core);
                    }
                    self.inject(core, index);
                    self.unbind(core, &field, &old);
                    self.bind(core, &field, &new);
                }
            }
            if check {
                outcome = self.check_lifecycle(core);
            }
        }
        outcome
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn is_satisfied(&self, core: &InstanceCore) -> bool {
        core.handlers.iter().all(|h| h.is_satisfied())
            && core.custom.iter().all(|(_, h)| h.is_valid())
            && self.hooks.upgrade().is_none_or(|hooks| hooks.is_running())
    }

    fn check_lifecycle(&self, core: &mut InstanceCore) -> LifecycleOutcome {
        let satisfied = self.is_satisfied(core);
        match core.state {
            ComponentState::Valid if !satisfied => {
                self.invalidate_core(core);
                LifecycleOutcome::Completed
            }
            ComponentState::Instantiated | ComponentState::Invalid if satisfied => {
                self.validate_core(core)
            }
            _ => LifecycleOutcome::Completed,
        }
    }

    fn start_core(&self, core: &mut InstanceCore) -> LifecycleOutcome {
        if core.started {
            return LifecycleOutcome::Completed;
        }
        core.started = true;
        info!(instance = %self.name, factory = %self.factory(), "Instance created");
        self.publish(LifecycleEventKind::Instantiated);

        for index in 0..core.handlers.len() {
            let handler = &core.handlers[index];
            let listener = Arc::new(HandlerListener {
                instance: self.weak_self.clone(),
                handler: index,
            });
            let id = self.registry.add_service_listener(
                listener,
                Some(handler.requirement().specification()),
                handler.listener_filter(),
            );
            core.listeners.push(id);
        }

        for index in 0..core.handlers.len() {
            let changes = core.handlers[index].try_binding(&self.registry);
            self.inject(core, index);
            self.apply_changes(core, index, changes, false);
        }
        self.check_lifecycle(core)
    }

    fn validate_core(&self, core: &mut InstanceCore) -> LifecycleOutcome {
        core.state = ComponentState::Validating;
        let refused = core.custom.iter_mut().find_map(|(id, handler)| {
            guarded("pre_validate", || handler.pre_validate())
                .err()
                .map(|e| CallbackError::failed(format!("handler '{id}': {e}")))
        });
        if let Some(e) = refused {
            return self.fail_validation(core, e);
        }
        if let Err(e) = self.invoke(core, "validate", |c, ctx| c.validate(ctx)) {
            return self.fail_validation(core, e);
        }

        core.state = ComponentState::Valid;
        self.register_provided(core);
        for (_, handler) in &mut core.custom {
            handler.post_validate();
        }
        info!(instance = %self.name, "Instance validated");
        self.publish(LifecycleEventKind::Validated);
        LifecycleOutcome::Completed
    }

    fn fail_validation(&self, core: &mut InstanceCore, error: CallbackError) -> LifecycleOutcome {
        error!(instance = %self.name, error = %error, "Validation failed");
        self.invalidate_core(core);
        let trace = error.to_string();
        core.state = ComponentState::Erroneous;
        core.error_trace = Some(trace.clone());
        self.publish(LifecycleEventKind::Erroneous);
        match error.stop_severity() {
            Some(severity) => {
                self.request_stop(severity);
                LifecycleOutcome::StopRequested(severity)
            }
            None => LifecycleOutcome::Erroneous(trace),
        }
    }

    fn invalidate_core(&self, core: &mut InstanceCore) {
        for (_, handler) in &mut core.custom {
            handler.pre_invalidate();
        }
        core.state = ComponentState::Invalid;
        self.unregister_provided(core);
        if let Err(e) = self.invoke(core, "invalidate", |c, ctx| c.invalidate(ctx)) {
            warn!(instance = %self.name, error = %e, "Invalidate callback failed");
        }
        info!(instance = %self.name, "Instance invalidated");
        self.publish(LifecycleEventKind::Invalidated);
        for (_, handler) in &mut core.custom {
            handler.post_invalidate();
        }
    }

    fn retry_core(&self, core: &mut InstanceCore, properties: Properties) -> LifecycleOutcome {
        if core.state != ComponentState::Erroneous {
            return LifecycleOutcome::Completed;
        }
        core.properties.extend(properties);
        let snapshot = core.properties.clone();
        if let Err(e) = self.invoke(core, "configure", |c, ctx| c.configure(&snapshot, ctx)) {
            warn!(instance = %self.name, error = %e, "Reconfiguration failed; staying erroneous");
            core.error_trace = Some(e.to_string());
            return LifecycleOutcome::Erroneous(e.to_string());
        }
        core.state = ComponentState::Invalid;
        core.error_trace = None;
        self.check_lifecycle(core)
    }

    fn kill_core(&self, core: &mut InstanceCore) {
        if core.state == ComponentState::Valid {
            self.invalidate_core(core);
        }
        for id in core.listeners.drain(..) {
            self.registry.remove_service_listener(id);
        }
        for index in 0..core.handlers.len() {
            let field = core.handlers[index].field().to_string();
            for change in core.handlers[index].clear() {
                if let BindingChange::Unbound(binding) = change {
                    self.inject(core, index);
                    self.unbind(core, &field, &binding);
                }
            }
        }
        for (_, handler) in &mut core.custom {
            handler.stop();
        }
        core.state = ComponentState::Killed;
        info!(instance = %self.name, "Instance killed");
        self.publish(LifecycleEventKind::Killed);
    }

    // ========================================================================
    // Provided services and properties
    // ========================================================================

    fn service_properties(&self, core: &InstanceCore) -> Properties {
        let mut properties = core.properties.clone();
        properties.insert(INSTANCE_NAME.to_string(), Value::from(self.name.as_str()));
        properties.insert(FACTORY_NAME.to_string(), Value::from(self.factory()));
        properties
    }

    fn register_provided(&self, core: &mut InstanceCore) {
        for index in 0..core.provided.len() {
            if core.provided[index].controller != Some(false) {
                self.register_one(core, index);
            }
        }
    }

    fn register_one(&self, core: &mut InstanceCore, index: usize) {
        if core.provided[index].registration.is_some() {
            return;
        }
        let specification = core.provided[index].specification.clone();
        let component = &core.component;
        let object = guarded("provide", || Ok(component.provide(&specification)));
        let Ok(Some(object)) = object else {
            error!(instance = %self.name, specification, "Component provides no object for its specification");
            return;
        };

        let registration = self
            .registry
            .register(specification.as_str(), object, self.service_properties(core));
        debug!(instance = %self.name, specification, service_id = registration.id(), "Provided service registered");
        let reference = registration.reference().clone();
        core.provided[index].registration = Some(registration);
        if let Err(e) = self.invoke(core, "post_registration", |c, ctx| c.post_registration(&reference, ctx)) {
            warn!(instance = %self.name, specification, error = %e, "post_registration callback failed");
        }
    }

    fn unregister_provided(&self, core: &mut InstanceCore) {
        for index in 0..core.provided.len() {
            self.unregister_one(core, index);
        }
    }

    fn unregister_one(&self, core: &mut InstanceCore, index: usize) {
        let Some(registration) = core.provided[index].registration.take() else {
            return;
        };
        self.registry.unregister(&registration);
        let reference = registration.reference().clone();
        if let Err(e) = self.invoke(core, "post_unregistration", |c, ctx| {
            c.post_unregistration(&reference, ctx)
        }) {
            warn!(instance = %self.name, error = %e, "post_unregistration callback failed");
        }
    }

    fn set_controller_core(&self, core: &mut InstanceCore, specification: &str, value: bool) {
        let Some(index) = core
            .provided
            .iter()
            .position(|p| p.specification == specification && p.controller.is_some())
        else {
            warn!(instance = %self.name, specification, "No controlled service for this specification");
            return;
        };
        core.provided[index].controller = Some(value);
        if core.state != ComponentState::Valid {
            return;
        }
        if value {
            self.register_one(core, index);
        } else {
            self.unregister_one(core, index);
        }
    }

    fn update_properties_core(
        &self,
        core: &mut InstanceCore,
        updates: Properties,
        reconfigure: bool,
    ) -> LifecycleOutcome {
        let before = core.properties.clone();
        core.properties.extend(updates);
        if core.properties == before {
            return LifecycleOutcome::Completed;
        }

        if reconfigure {
            let snapshot = core.properties.clone();
            if let Err(e) = self.invoke(core, "configure", |c, ctx| c.configure(&snapshot, ctx)) {
                warn!(instance = %self.name, error = %e, "Configure callback failed");
            }
        }

        let service_properties = self.service_properties(core);
        for provided in &core.provided {
            if let Some(registration) = &provided.registration {
                if let Err(e) = self
                    .registry
                    .update_properties(registration, service_properties.clone())
                {
                    warn!(instance = %self.name, error = %e, "Cannot update provided service");
                }
            }
        }

        let mut outcome = LifecycleOutcome::Completed;
        for index in 0..core.handlers.len() {
            let changes = core.handlers[index].on_properties_changed(&self.registry, &core.properties);
            if !changes.is_empty() {
                outcome = self.apply_changes(core, index, changes, true);
            }
        }
        outcome
    }
}
