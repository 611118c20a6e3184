//! Component descriptors
//!
//! A [`ComponentDescriptor`] is everything the engine knows about a factory:
//! how to construct the component, what it requires, what it provides and
//! which instances to create when the factory becomes available.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cle_domain::error::{CallbackError, Error, Result};
use cle_domain::value_objects::{
    DependencyKind, FactoryDetails, Properties, Requirement, RequirementDetails,
};
use serde_json::Value;

use crate::ports::Component;

/// Builds a component from its instance properties
pub type Constructor =
    Arc<dyn Fn(&Properties) -> std::result::Result<Box<dyn Component>, CallbackError> + Send + Sync>;

/// Dependency declared on a component field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementSpec {
    pub field: String,
    pub requirement: Requirement,
    pub kind: DependencyKind,
}

impl RequirementSpec {
    fn details(&self) -> RequirementDetails {
        RequirementDetails {
            field: self.field.clone(),
            specification: self.requirement.specification().to_string(),
            filter: self.requirement.filter().map(ToString::to_string),
            kind: self.kind.name().to_string(),
            optional: self.requirement.is_optional(),
            aggregate: self.requirement.is_aggregate(),
            immediate_rebind: self.requirement.is_immediate_rebind(),
        }
    }
}

/// Service registered while an instance is valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidedSpec {
    pub specification: String,
    /// Initial controller value; `None` means always provided
    pub controller: Option<bool>,
}

/// Instance created as soon as the factory is active
#[derive(Debug, Clone, PartialEq)]
pub struct Instantiation {
    pub name: String,
    pub properties: Properties,
}

/// Immutable description of a component factory
#[derive(Clone)]
pub struct ComponentDescriptor {
    factory: String,
    constructor: Constructor,
    requirements: Vec<RequirementSpec>,
    provides: Vec<ProvidedSpec>,
    properties: Properties,
    handlers: Vec<String>,
    instantiations: Vec<Instantiation>,
}

impl ComponentDescriptor {
    pub fn factory(&self) -> &str {
        &self.factory
    }

    pub fn constructor(&self) -> &Constructor {
        &self.constructor
    }

    /// Dependencies, in declaration order
    pub fn requirements(&self) -> &[RequirementSpec] {
        &self.requirements
    }

    pub fn provides(&self) -> &[ProvidedSpec] {
        &self.provides
    }

    /// Default instance properties
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Ids of the custom handlers every instance needs
    pub fn handlers(&self) -> &[String] {
        &self.handlers
    }

    pub fn instantiations(&self) -> &[Instantiation] {
        &self.instantiations
    }

    /// Builder for another factory sharing this one's component, dependencies
    /// and provided services. Auto-instantiations are not inherited.
    pub fn derive<S: Into<String>>(&self, factory: S) -> ComponentBuilder {
        ComponentBuilder {
            descriptor: Self {
                factory: factory.into(),
                instantiations: Vec::new(),
                ..self.clone()
            },
        }
    }

    pub(crate) fn details(&self, bundle: &str) -> FactoryDetails {
        FactoryDetails {
            name: self.factory.clone(),
            bundle: bundle.to_string(),
            requirements: self.requirements.iter().map(RequirementSpec::details).collect(),
            provides: self.provides.iter().map(|p| p.specification.clone()).collect(),
            properties: self.properties.clone(),
            handlers: self.handlers.clone(),
            instances: Vec::new(),
            queued_bundles: Vec::new(),
        }
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("factory", &self.factory)
            .field("requirements", &self.requirements)
            .field("provides", &self.provides)
            .field("handlers", &self.handlers)
            .field("instantiations", &self.instantiations.len())
            .finish_non_exhaustive()
    }
}

/// Fluent builder for [`ComponentDescriptor`]s
///
/// # Example
///
/// ```
/// use cle_application::component::ComponentBuilder;
/// use cle_application::ports::Component;
///
/// #[derive(Default)]
/// struct Greeter;
/// impl Component for Greeter {}
///
/// let descriptor = ComponentBuilder::of::<Greeter>("greeter-factory")
///     .requires("log", "logger")
///     .provides("greeter")
///     .instantiate("greeter", Default::default())
///     .build()
///     .unwrap();
/// assert_eq!(descriptor.requirements().len(), 1);
/// ```
pub struct ComponentBuilder {
    descriptor: ComponentDescriptor,
}

impl ComponentBuilder {
    pub fn new<S, F>(factory: S, constructor: F) -> Self
    where
        S: Into<String>,
        F: Fn(&Properties) -> std::result::Result<Box<dyn Component>, CallbackError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            descriptor: ComponentDescriptor {
                factory: factory.into(),
                constructor: Arc::new(constructor),
                requirements: Vec::new(),
                provides: Vec::new(),
                properties: Properties::new(),
                handlers: Vec::new(),
                instantiations: Vec::new(),
            },
        }
    }

    /// Factory for a component built with `Default`
    pub fn of<T: Component + Default>(factory: &str) -> Self {
        Self::new(factory, |_| Ok(Box::new(T::default()) as Box<dyn Component>))
    }

    fn dependency(mut self, field: &str, requirement: Requirement, kind: DependencyKind) -> Self {
        self.descriptor.requirements.push(RequirementSpec {
            field: field.to_string(),
            requirement,
            kind,
        });
        self
    }

    /// Mandatory single service
    pub fn requires(self, field: &str, specification: &str) -> Self {
        self.dependency(field, Requirement::new(specification), DependencyKind::Simple)
    }

    /// Simple or aggregate dependency with a full requirement
    pub fn requires_with(self, field: &str, requirement: Requirement) -> Self {
        self.dependency(field, requirement, DependencyKind::Simple)
    }

    /// Highest-ranked match; rebinding is immediate unless the requirement
    /// says otherwise through [`requires_best_with`](Self::requires_best_with)
    pub fn requires_best(self, field: &str, requirement: Requirement) -> Self {
        self.dependency(field, requirement.immediate_rebind(), DependencyKind::Best)
    }

    /// Highest-ranked match keeping the requirement's rebind policy
    pub fn requires_best_with(self, field: &str, requirement: Requirement) -> Self {
        self.dependency(field, requirement, DependencyKind::Best)
    }

    /// Broadcast proxy over every match; target errors are logged
    pub fn requires_broadcast(self, field: &str, requirement: Requirement) -> Self {
        self.requires_broadcast_with(field, requirement, true)
    }

    pub fn requires_broadcast_with(
        self,
        field: &str,
        requirement: Requirement,
        muffle_errors: bool,
    ) -> Self {
        self.dependency(
            field,
            requirement.aggregate(),
            DependencyKind::Broadcast { muffle_errors },
        )
    }

    /// Matches indexed by the value of property `key`
    pub fn requires_map(
        self,
        field: &str,
        requirement: Requirement,
        key: &str,
        allow_none: bool,
    ) -> Self {
        self.dependency(
            field,
            requirement,
            DependencyKind::Map {
                key: key.to_string(),
                allow_none,
            },
        )
    }

    /// Filter rendered from instance properties, e.g. `(lang={lang})`
    pub fn requires_var_filter(self, field: &str, requirement: Requirement, template: &str) -> Self {
        self.dependency(
            field,
            requirement,
            DependencyKind::VarFilter {
                template: template.to_string(),
            },
        )
    }

    /// Single service tolerating gaps up to `timeout`; zero uses the engine default
    pub fn requires_temporal(self, field: &str, requirement: Requirement, timeout: Duration) -> Self {
        self.dependency(field, requirement, DependencyKind::Temporal { timeout })
    }

    pub fn provides(mut self, specification: &str) -> Self {
        self.descriptor.provides.push(ProvidedSpec {
            specification: specification.to_string(),
            controller: None,
        });
        self
    }

    /// Provided service that can be switched on and off at runtime
    pub fn provides_with_controller(mut self, specification: &str, initial: bool) -> Self {
        self.descriptor.provides.push(ProvidedSpec {
            specification: specification.to_string(),
            controller: Some(initial),
        });
        self
    }

    /// Default instance property
    pub fn property<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.descriptor
            .properties
            .insert(key.to_string(), value.into());
        self
    }

    /// Require a custom handler registered with the engine
    pub fn handler(mut self, id: &str) -> Self {
        self.descriptor.handlers.push(id.to_string());
        self
    }

    /// Create an instance as soon as the factory is active
    pub fn instantiate(mut self, name: &str, properties: Properties) -> Self {
        self.descriptor.instantiations.push(Instantiation {
            name: name.to_string(),
            properties,
        });
        self
    }

    /// Check the declaration and produce the descriptor
    pub fn build(self) -> Result<ComponentDescriptor> {
        let descriptor = self.descriptor;
        if descriptor.factory.trim().is_empty() {
            return Err(Error::value("factory name must not be empty"));
        }

        let mut fields = HashSet::new();
        for requirement in &descriptor.requirements {
            if !fields.insert(requirement.field.as_str()) {
                return Err(Error::value(format!(
                    "factory '{}' declares field '{}' twice",
                    descriptor.factory, requirement.field
                )));
            }
        }

        let mut provided = HashSet::new();
        for spec in &descriptor.provides {
            if !provided.insert(spec.specification.as_str()) {
                return Err(Error::value(format!(
                    "factory '{}' provides '{}' twice",
                    descriptor.factory, spec.specification
                )));
            }
        }

        let mut names = HashSet::new();
        for instantiation in &descriptor.instantiations {
            if !names.insert(instantiation.name.as_str()) {
                return Err(Error::value(format!(
                    "factory '{}' instantiates '{}' twice",
                    descriptor.factory, instantiation.name
                )));
            }
        }
        Ok(descriptor)
    }
}
