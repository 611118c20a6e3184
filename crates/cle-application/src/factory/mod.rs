//! Factory bookkeeping
//!
//! Which bundle owns each factory name, which registrants wait in line, the
//! live instances and the waiting list. Everything here sits behind one
//! engine lock that is never held while instances or the registry run.

mod waiting;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use cle_domain::error::{Error, Result};
use cle_domain::value_objects::{FactoryStatus, Properties, WaitingDetails, WaitingStatus};

use crate::component::ComponentDescriptor;
use crate::component::instance::StoredInstance;
use crate::ports::HandlerFactory;

pub use waiting::WaitingList;

/// One bundle's registration of a factory name
pub(crate) struct Registrant {
    pub bundle: String,
    pub descriptor: Arc<ComponentDescriptor>,
}

/// Current owner of a factory name and the registrants queued behind it
#[derive(Default)]
pub(crate) struct FactorySlot {
    pub active: Option<Registrant>,
    pub queued: VecDeque<Registrant>,
}

impl FactorySlot {
    pub fn has_bundle(&self, bundle: &str) -> bool {
        self.active.as_ref().is_some_and(|r| r.bundle == bundle)
            || self.queued.iter().any(|r| r.bundle == bundle)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none() && self.queued.is_empty()
    }
}

/// Request to instantiate a component once its factory is usable
pub(crate) struct WaitingEntry {
    pub factory: String,
    pub properties: Properties,
    pub instantiated: bool,
}

/// Factory able to build instances right now
pub(crate) struct UsableFactory {
    pub bundle: String,
    pub descriptor: Arc<ComponentDescriptor>,
    pub handler_factories: Vec<Arc<dyn HandlerFactory>>,
}

#[derive(Default)]
pub(crate) struct FactoryState {
    pub slots: HashMap<String, FactorySlot>,
    pub instances: BTreeMap<String, Arc<StoredInstance>>,
    /// Names of instances being built
    pub reserved: HashSet<String>,
    pub waiting: BTreeMap<String, WaitingEntry>,
    pub handler_factories: HashMap<String, Arc<dyn HandlerFactory>>,
}

impl FactoryState {
    /// Queue or activate a registrant
    pub fn register(&mut self, bundle: &str, descriptor: Arc<ComponentDescriptor>) -> Result<FactoryStatus> {
        let name = descriptor.factory().to_string();
        let slot = self.slots.entry(name.clone()).or_default();
        if slot.has_bundle(bundle) {
            return Err(Error::value(format!(
                "bundle '{bundle}' already registered factory '{name}'"
            )));
        }
        let registrant = Registrant {
            bundle: bundle.to_string(),
            descriptor,
        };
        if slot.active.is_some() {
            slot.queued.push_back(registrant);
            return Ok(FactoryStatus::Queued);
        }
        slot.active = Some(registrant);
        Ok(self.status(&name))
    }

    /// Status of the active registrant of `name`
    pub fn status(&self, name: &str) -> FactoryStatus {
        if self.usable(name).is_some() {
            FactoryStatus::Active
        } else {
            FactoryStatus::AwaitingHandlers
        }
    }

    pub fn missing_handlers(&self, descriptor: &ComponentDescriptor) -> Vec<String> {
        descriptor
            .handlers()
            .iter()
            .filter(|id| !self.handler_factories.contains_key(id.as_str()))
            .cloned()
            .collect()
    }

    /// The active registrant of `name`, if all its custom handlers exist
    pub fn usable(&self, name: &str) -> Option<UsableFactory> {
        let active = self.slots.get(name)?.active.as_ref()?;
        let handler_factories = active
            .descriptor
            .handlers()
            .iter()
            .map(|id| self.handler_factories.get(id).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(UsableFactory {
            bundle: active.bundle.clone(),
            descriptor: Arc::clone(&active.descriptor),
            handler_factories,
        })
    }

    /// Whether `name` is used by an instance, a build in progress or a waiting entry
    pub fn name_taken(&self, name: &str) -> bool {
        self.instances.contains_key(name)
            || self.reserved.contains(name)
            || self.waiting.contains_key(name)
    }

    /// Remove the instances of a factory; their waiting entries return to pending
    pub fn take_instances_of(&mut self, factory: &str) -> Vec<Arc<StoredInstance>> {
        let names: Vec<String> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.factory() == factory)
            .map(|(name, _)| name.clone())
            .collect();
        names
            .iter()
            .filter_map(|name| {
                if let Some(entry) = self.waiting.get_mut(name) {
                    entry.instantiated = false;
                }
                self.instances.remove(name)
            })
            .collect()
    }

    /// Pending waiting entries for a factory
    pub fn pending_for(&self, factory: &str) -> Vec<String> {
        self.waiting
            .iter()
            .filter(|(_, entry)| entry.factory == factory && !entry.instantiated)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn waiting_details(&self) -> Vec<WaitingDetails> {
        self.waiting
            .iter()
            .map(|(name, entry)| WaitingDetails {
                factory: entry.factory.clone(),
                name: name.clone(),
                properties: entry.properties.clone(),
                status: if entry.instantiated {
                    WaitingStatus::Instantiated
                } else {
                    WaitingStatus::Pending
                },
            })
            .collect()
    }
}
