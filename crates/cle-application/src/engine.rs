//! Engine
//!
//! The [`Engine`] ties a service registry, the factory registry and the
//! lifecycle event hub together and exposes the administrative surface.
//! It is a cheap handle: clones share the same state.
//!
//! The factory lock is only held for bookkeeping. Building, starting and
//! killing instances always happens after it is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use cle_domain::error::{Error, Result};
use cle_domain::events::{LifecycleEvent, LifecycleEventKind};
use cle_domain::value_objects::{
    ComponentState, FactoryDetails, FactoryStatus, InstanceDetails, Properties, WaitingDetails,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::component::ComponentDescriptor;
use crate::component::instance::{EngineHooks, InstanceSpec, StoredInstance};
use crate::dispatch::{EventHub, LifecycleListenerId};
use crate::factory::{FactoryState, UsableFactory, WaitingEntry, WaitingList};
use crate::ports::{COMPONENT_FACTORIES, EventDispatcher, HandlerFactory, LifecycleListener};
use crate::registry::ServiceRegistry;

/// Default wait of temporal dependencies
pub const DEFAULT_TEMPORAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Timeout of temporal dependencies declared without one
    pub default_temporal_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_temporal_timeout: DEFAULT_TEMPORAL_TIMEOUT,
        }
    }
}

struct EngineInner {
    uid: Uuid,
    registry: Arc<ServiceRegistry>,
    events: Arc<EventHub>,
    options: EngineOptions,
    running: AtomicBool,
    factories: Mutex<FactoryState>,
    weak_self: Weak<EngineInner>,
}

impl EngineInner {
    fn handle(&self) -> Option<Engine> {
        self.weak_self.upgrade().map(|inner| Engine { inner })
    }
}

impl EngineHooks for EngineInner {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn request_kill(&self, name: &str) {
        if let Some(engine) = self.handle() {
            if let Err(e) = engine.kill(name) {
                debug!(instance = name, error = %e, "Kill requested for an instance already gone");
            }
        }
    }

    fn request_shutdown(&self) {
        if let Some(engine) = self.handle() {
            engine.shutdown();
        }
    }
}

/// Component lifecycle engine
///
/// # Example
///
/// ```
/// use cle_application::component::ComponentBuilder;
/// use cle_application::ports::Component;
/// use cle_application::Engine;
/// use cle_domain::value_objects::{ComponentState, Properties};
///
/// #[derive(Default)]
/// struct Hello;
/// impl Component for Hello {}
///
/// let engine = Engine::new();
/// engine
///     .register_factory("demo", ComponentBuilder::of::<Hello>("hello-factory").build().unwrap())
///     .unwrap();
/// let state = engine.instantiate("hello-factory", "hello", Properties::new()).unwrap();
/// assert_eq!(state, ComponentState::Valid);
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with its own registry and inline event delivery
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(ServiceRegistry::new()),
            Arc::new(EventHub::default()),
            EngineOptions::default(),
        )
    }

    /// Engine with its own registry and the given event dispatcher
    pub fn with_dispatcher(dispatcher: Arc<dyn EventDispatcher>, options: EngineOptions) -> Self {
        Self::with_parts(
            Arc::new(ServiceRegistry::new()),
            Arc::new(EventHub::new(dispatcher)),
            options,
        )
    }

    pub fn with_parts(
        registry: Arc<ServiceRegistry>,
        events: Arc<EventHub>,
        options: EngineOptions,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| EngineInner {
            uid: Uuid::new_v4(),
            registry,
            events,
            options,
            running: AtomicBool::new(true),
            factories: Mutex::new(FactoryState::default()),
            weak_self: weak.clone(),
        });
        info!(uid = %inner.uid, "Engine started");
        Self { inner }
    }

    /// Unique id of this engine
    pub fn uid(&self) -> Uuid {
        self.inner.uid
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.inner.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// New factories, instances and waiting entries are refused once stopped
    fn ensure_running(&self) -> Result<()> {
        if self.inner.is_running() {
            Ok(())
        } else {
            Err(Error::value(format!("engine {} is shut down", self.inner.uid)))
        }
    }

    fn hooks(&self) -> Weak<dyn EngineHooks> {
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        weak
    }

    fn instance(&self, name: &str) -> Result<Arc<StoredInstance>> {
        self.inner
            .factories
            .lock()
            .instances
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("instance '{name}'")))
    }

    // ========================================================================
    // Factories
    // ========================================================================

    /// Register a factory for a bundle.
    ///
    /// A second bundle registering the same name is queued behind the first
    /// one; the same bundle registering it twice is a `Value` error.
    pub fn register_factory(&self, bundle: &str, descriptor: ComponentDescriptor) -> Result<FactoryStatus> {
        self.ensure_running()?;
        let name = descriptor.factory().to_string();
        let status = self
            .inner
            .factories
            .lock()
            .register(bundle, Arc::new(descriptor))?;
        info!(factory = %name, bundle, ?status, "Factory registered");
        if status == FactoryStatus::Active {
            self.activate(&name);
        }
        Ok(status)
    }

    /// Unregister a bundle's factory, killing its instances.
    ///
    /// The next queued registrant, if any, takes over the name.
    pub fn unregister_factory(&self, bundle: &str, name: &str) -> Result<()> {
        let (killed, was_usable, promoted) = {
            let mut state = self.inner.factories.lock();
            let slot = state
                .slots
                .get_mut(name)
                .ok_or_else(|| Error::not_found(format!("factory '{name}'")))?;

            if slot.active.as_ref().is_none_or(|r| r.bundle != bundle) {
                let before = slot.queued.len();
                slot.queued.retain(|r| r.bundle != bundle);
                if slot.queued.len() == before {
                    return Err(Error::not_found(format!(
                        "factory '{name}' of bundle '{bundle}'"
                    )));
                }
                debug!(factory = name, bundle, "Queued factory registration dropped");
                return Ok(());
            }

            let was_usable = state.usable(name).is_some();
            let killed = state.take_instances_of(name);
            let promoted = {
                let slot = state.slots.get_mut(name);
                match slot {
                    Some(slot) => {
                        slot.active = slot.queued.pop_front();
                        let promoted = slot.active.is_some();
                        if slot.is_empty() {
                            state.slots.remove(name);
                        }
                        promoted
                    }
                    None => false,
                }
            };
            (killed, was_usable, promoted && state.usable(name).is_some())
        };

        for instance in killed.iter().rev() {
            instance.kill();
        }
        if was_usable {
            self.inner
                .events
                .publish(LifecycleEvent::for_factory(LifecycleEventKind::Unregistered, name));
        }
        info!(factory = name, bundle, instances = killed.len(), "Factory unregistered");
        if promoted {
            self.activate(name);
        }
        Ok(())
    }

    /// Unregister every factory of a bundle; returns how many were removed
    pub fn remove_bundle(&self, bundle: &str) -> usize {
        let names: Vec<String> = {
            let state = self.inner.factories.lock();
            let mut names: Vec<String> = state
                .slots
                .iter()
                .filter(|(_, slot)| slot.has_bundle(bundle))
                .map(|(name, _)| name.clone())
                .collect();
            names.sort();
            names
        };
        names
            .iter()
            .filter(|name| match self.unregister_factory(bundle, name) {
                Ok(()) => true,
                Err(e) => {
                    warn!(bundle, factory = %name, error = %e, "Cannot unregister factory");
                    false
                }
            })
            .count()
    }

    /// Announce a usable factory and create its pending instances
    fn activate(&self, name: &str) {
        let (auto, pending) = {
            let state = self.inner.factories.lock();
            let Some(usable) = state.usable(name) else {
                return;
            };
            (usable.descriptor.instantiations().to_vec(), state.pending_for(name))
        };
        self.inner
            .events
            .publish(LifecycleEvent::for_factory(LifecycleEventKind::Registered, name));
        if !self.is_running() {
            return;
        }

        for instantiation in auto {
            if let Err(e) = self.instantiate(name, &instantiation.name, instantiation.properties) {
                error!(factory = name, instance = %instantiation.name, error = %e, "Auto-instantiation failed");
            }
        }
        for waiting in pending {
            if let Err(e) = self.instantiate_waiting(&waiting) {
                error!(factory = name, instance = %waiting, error = %e, "Waiting instance creation failed");
            }
        }
    }

    /// Make factories that were waiting for custom handlers usable or unusable
    fn handlers_changed(&self, id: &str, added: bool) {
        let affected: Vec<String> = {
            let state = self.inner.factories.lock();
            state
                .slots
                .iter()
                .filter_map(|(name, slot)| {
                    let handlers = slot.active.as_ref()?.descriptor.handlers();
                    // only factories this handler completes (or completed)
                    let needs = handlers.iter().any(|h| h == id);
                    let others_present = handlers
                        .iter()
                        .all(|h| h == id || state.handler_factories.contains_key(h));
                    (needs && others_present).then(|| name.clone())
                })
                .collect()
        };

        for name in affected {
            if added {
                self.activate(&name);
                continue;
            }
            let killed = self.inner.factories.lock().take_instances_of(&name);
            for instance in killed.iter().rev() {
                instance.kill();
            }
            self.inner
                .events
                .publish(LifecycleEvent::for_factory(LifecycleEventKind::Unregistered, &name));
        }
    }

    /// Register a custom handler factory under its id
    pub fn register_handler_factory(&self, factory: Arc<dyn HandlerFactory>) -> Result<()> {
        self.ensure_running()?;
        let id = factory.handler_id().to_string();
        {
            let mut state = self.inner.factories.lock();
            if state.handler_factories.contains_key(&id) {
                return Err(Error::value(format!("handler '{id}' is already registered")));
            }
            state.handler_factories.insert(id.clone(), factory);
        }
        info!(handler = %id, "Handler factory registered");
        self.handlers_changed(&id, true);
        Ok(())
    }

    /// Remove a custom handler factory; factories needing it stop being usable
    pub fn unregister_handler_factory(&self, id: &str) -> Result<()> {
        if self.inner.factories.lock().handler_factories.remove(id).is_none() {
            return Err(Error::not_found(format!("handler '{id}'")));
        }
        info!(handler = id, "Handler factory unregistered");
        self.handlers_changed(id, false);
        Ok(())
    }

    /// Register every factory submitted to [`COMPONENT_FACTORIES`]; returns how
    /// many were registered. Failures are logged.
    pub fn register_linked_factories(&self) -> usize {
        COMPONENT_FACTORIES
            .iter()
            .filter(|entry| {
                let registered =
                    (entry.build)().and_then(|descriptor| self.register_factory(entry.bundle, descriptor));
                match registered {
                    Ok(_) => true,
                    Err(e) => {
                        error!(factory = entry.name, bundle = entry.bundle, error = %e, "Linked factory not registered");
                        false
                    }
                }
            })
            .count()
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Create an instance and return its state once started.
    ///
    /// Unknown factory → `Type`; name in use (by an instance or a waiting
    /// entry) → `Value`; constructor or `configure` failure → `Type`.
    pub fn instantiate(&self, factory: &str, name: &str, properties: Properties) -> Result<ComponentState> {
        self.ensure_running()?;
        let usable = {
            let mut state = self.inner.factories.lock();
            let usable = state
                .usable(factory)
                .ok_or_else(|| Error::type_error(format!("unknown factory '{factory}'")))?;
            if state.name_taken(name) {
                return Err(Error::value(format!("instance name '{name}' is already in use")));
            }
            state.reserved.insert(name.to_string());
            usable
        };
        self.build(factory, name, properties, usable)
    }

    fn instantiate_waiting(&self, name: &str) -> Result<ComponentState> {
        self.ensure_running()?;
        let (factory, properties, usable) = {
            let mut state = self.inner.factories.lock();
            let Some(entry) = state.waiting.get(name) else {
                return Err(Error::not_found(format!("waiting entry '{name}'")));
            };
            if entry.instantiated || state.instances.contains_key(name) || state.reserved.contains(name) {
                return Err(Error::value(format!("instance name '{name}' is already in use")));
            }
            let factory = entry.factory.clone();
            let properties = entry.properties.clone();
            let usable = state
                .usable(&factory)
                .ok_or_else(|| Error::type_error(format!("unknown factory '{factory}'")))?;
            state.reserved.insert(name.to_string());
            (factory, properties, usable)
        };
        self.build(&factory, name, properties, usable)
    }

    /// Build and start an instance whose name is reserved
    fn build(
        &self,
        factory: &str,
        name: &str,
        properties: Properties,
        usable: UsableFactory,
    ) -> Result<ComponentState> {
        let UsableFactory {
            bundle,
            descriptor,
            handler_factories,
        } = usable;
        let mut merged = descriptor.properties().clone();
        merged.extend(properties);

        let created = StoredInstance::create(InstanceSpec {
            name: name.to_string(),
            bundle,
            descriptor: Arc::clone(&descriptor),
            properties: merged,
            registry: Arc::clone(&self.inner.registry),
            events: Arc::clone(&self.inner.events),
            hooks: self.hooks(),
            default_timeout: self.inner.options.default_temporal_timeout,
            handler_factories,
        });

        let instance = {
            let mut state = self.inner.factories.lock();
            state.reserved.remove(name);
            let instance = created?;
            // shutdown may have swept the instances while this one was built
            self.ensure_running()?;
            let still_current = state
                .usable(factory)
                .is_some_and(|current| Arc::ptr_eq(&current.descriptor, &descriptor));
            if !still_current {
                return Err(Error::type_error(format!(
                    "factory '{factory}' went away while '{name}' was being built"
                )));
            }
            state.instances.insert(name.to_string(), Arc::clone(&instance));
            if let Some(entry) = state.waiting.get_mut(name) {
                entry.instantiated = true;
            }
            instance
        };
        Ok(instance.start())
    }

    /// Kill an instance; a waiting entry with that name is dropped too
    pub fn kill(&self, name: &str) -> Result<()> {
        let (instance, entry) = {
            let mut state = self.inner.factories.lock();
            (state.instances.remove(name), state.waiting.remove(name))
        };
        match (instance, entry) {
            (Some(instance), _) => {
                instance.kill();
                Ok(())
            }
            (None, Some(_)) => Ok(()),
            (None, None) => Err(Error::not_found(format!("instance '{name}'"))),
        }
    }

    /// Invalidate a valid instance; it stays invalid until its next lifecycle check
    pub fn invalidate(&self, name: &str) -> Result<ComponentState> {
        Ok(self.instance(name)?.invalidate())
    }

    /// Merge properties into an erroneous instance and validate it again.
    ///
    /// Other states are left untouched and returned as they are.
    pub fn retry_erroneous(&self, name: &str, properties: Properties) -> Result<ComponentState> {
        Ok(self.instance(name)?.retry(properties))
    }

    /// Merge properties into an instance, calling its `configure` callback
    pub fn update_properties(&self, name: &str, properties: Properties) -> Result<()> {
        self.instance(name)?.update_properties(properties);
        Ok(())
    }

    /// Switch a controlled provided service on or off
    pub fn set_service_controller(&self, name: &str, specification: &str, value: bool) -> Result<()> {
        let instance = self.instance(name)?;
        let controlled = instance
            .descriptor()
            .provides()
            .iter()
            .any(|p| p.specification == specification && p.controller.is_some());
        if !controlled {
            return Err(Error::value(format!(
                "instance '{name}' has no controller for '{specification}'"
            )));
        }
        instance.set_controller(specification, value);
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn get_instance_details(&self, name: &str) -> Result<InstanceDetails> {
        Ok(self.instance(name)?.details())
    }

    /// `(name, factory, state)` of every instance, sorted by name
    pub fn get_instances(&self) -> Vec<(String, String, ComponentState)> {
        let instances: Vec<_> = self.inner.factories.lock().instances.values().cloned().collect();
        instances
            .iter()
            .map(|i| (i.name().to_string(), i.factory().to_string(), i.state()))
            .collect()
    }

    pub fn get_factory_details(&self, name: &str) -> Result<FactoryDetails> {
        let state = self.inner.factories.lock();
        let slot = state
            .slots
            .get(name)
            .ok_or_else(|| Error::not_found(format!("factory '{name}'")))?;
        let active = slot
            .active
            .as_ref()
            .ok_or_else(|| Error::not_found(format!("factory '{name}'")))?;
        let mut details = active.descriptor.details(&active.bundle);
        details.instances = state
            .instances
            .values()
            .filter(|i| i.factory() == name)
            .map(|i| i.name().to_string())
            .collect();
        details.queued_bundles = slot.queued.iter().map(|r| r.bundle.clone()).collect();
        Ok(details)
    }

    /// Names of the registered factories, sorted
    pub fn get_factories(&self) -> Vec<String> {
        let state = self.inner.factories.lock();
        let mut names: Vec<String> = state
            .slots
            .iter()
            .filter(|(_, slot)| slot.active.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn get_waiting_components(&self) -> Vec<WaitingDetails> {
        self.inner.factories.lock().waiting_details()
    }

    pub fn waiting_list(&self) -> WaitingList<'_> {
        WaitingList::new(self)
    }

    pub(crate) fn add_waiting(&self, factory: &str, name: &str, properties: Properties) -> Result<()> {
        self.ensure_running()?;
        let usable = {
            let mut state = self.inner.factories.lock();
            if state.name_taken(name) {
                return Err(Error::value(format!("instance name '{name}' is already in use")));
            }
            state.waiting.insert(
                name.to_string(),
                WaitingEntry {
                    factory: factory.to_string(),
                    properties,
                    instantiated: false,
                },
            );
            state.usable(factory).is_some()
        };
        debug!(factory, instance = name, "Waiting entry added");
        if usable {
            if let Err(e) = self.instantiate_waiting(name) {
                error!(factory, instance = name, error = %e, "Waiting instance creation failed");
            }
        }
        Ok(())
    }

    pub(crate) fn remove_waiting(&self, name: &str) -> Result<()> {
        let instance = {
            let mut state = self.inner.factories.lock();
            let entry = state
                .waiting
                .remove(name)
                .ok_or_else(|| Error::not_found(format!("waiting entry '{name}'")))?;
            if entry.instantiated {
                state.instances.remove(name)
            } else {
                None
            }
        };
        if let Some(instance) = instance {
            instance.kill();
        }
        Ok(())
    }

    // ========================================================================
    // Listeners and shutdown
    // ========================================================================

    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) -> LifecycleListenerId {
        self.inner.events.add_listener(listener)
    }

    pub fn remove_listener(&self, id: LifecycleListenerId) -> bool {
        self.inner.events.remove_listener(id)
    }

    /// Wait until every lifecycle event published so far was delivered
    pub fn flush_events(&self) {
        self.inner.events.flush();
    }

    /// Stop the engine: every instance is invalidated and killed.
    ///
    /// Factories stay registered, but new factories, instances and waiting
    /// entries are refused with a `Value` error. Further calls do nothing.
    pub fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!(uid = %self.inner.uid, "Engine stopping");
        let instances: Vec<_> = {
            let mut state = self.inner.factories.lock();
            for entry in state.waiting.values_mut() {
                entry.instantiated = false;
            }
            std::mem::take(&mut state.instances).into_values().collect()
        };
        for instance in instances.iter().rev() {
            instance.kill();
        }
        self.inner.events.flush();
        info!(uid = %self.inner.uid, killed = instances.len(), "Engine stopped");
    }
}
