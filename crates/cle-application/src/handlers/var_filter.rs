//! Variable-filter dependency
//!
//! The filter is a template whose `{property}` placeholders are replaced by
//! instance property values. Each time the instance properties change the
//! template is rendered again and the bindings are re-evaluated.

use cle_domain::filter::{Filter, escape};
use cle_domain::value_objects::{DependencyKind, Properties, Requirement, property_key};
use tracing::warn;

use super::{
    AggregateDependency, Binding, BindingChange, DependencyHandler, Injected, Refilter, Selector,
    SimpleDependency,
};
use crate::registry::{ServiceReference, ServiceRegistry};

/// Render a filter template with instance properties.
///
/// Values are escaped before substitution. `{{` and `}}` stand for literal
/// braces.
///
/// # Example
///
/// ```
/// use cle_application::handlers::render_template;
/// use cle_domain::value_objects::properties;
///
/// let props = properties([("lang", "fr".into())]);
/// assert_eq!(render_template("(lang={lang})", &props).unwrap(), "(lang=fr)");
/// assert!(render_template("(lang={region})", &props).is_err());
/// ```
pub fn render_template(template: &str, properties: &Properties) -> Result<String, String> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                rendered.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(format!("unclosed placeholder '{{{name}'")),
                    }
                }
                let name = name.trim();
                let value = properties
                    .get(name)
                    .and_then(property_key)
                    .ok_or_else(|| format!("missing property '{name}'"))?;
                rendered.push_str(&escape(&value));
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                rendered.push('}');
            }
            '}' => return Err("unmatched '}'".to_string()),
            c => rendered.push(c),
        }
    }
    Ok(rendered)
}

/// Selector for the rendered template, combined with the static filter
fn selector_for(template: &str, requirement: &Requirement, properties: &Properties) -> Selector {
    let rendered = render_template(template, properties)
        .and_then(|text| Filter::parse_optional(&text).map_err(|e| e.to_string()));
    match rendered {
        Ok(dynamic) => Selector::new(match (requirement.filter().cloned(), dynamic) {
            (Some(fixed), Some(dynamic)) => Some(fixed.and(dynamic)),
            (fixed, dynamic) => fixed.or(dynamic),
        }),
        Err(reason) => {
            warn!(template, %reason, "Filter template cannot be rendered; matching nothing");
            Selector::blocked()
        }
    }
}

/// Simple or aggregate dependency filtered by a property template
pub struct VarFilterDependency {
    inner: Box<dyn Refilter>,
    kind: DependencyKind,
    template: String,
    selector: Selector,
}

impl VarFilterDependency {
    pub fn new(
        field: String,
        requirement: Requirement,
        template: String,
        properties: &Properties,
    ) -> Self {
        let selector = selector_for(&template, &requirement, properties);
        let mut inner: Box<dyn Refilter> = if requirement.is_aggregate() {
            Box::new(AggregateDependency::new(field, requirement))
        } else {
            Box::new(SimpleDependency::new(field, requirement))
        };
        inner.set_selector(selector.clone());
        Self {
            inner,
            kind: DependencyKind::VarFilter {
                template: template.clone(),
            },
            template,
            selector,
        }
    }
}

impl DependencyHandler for VarFilterDependency {
    fn field(&self) -> &str {
        self.inner.field()
    }

    fn requirement(&self) -> &Requirement {
        self.inner.requirement()
    }

    fn kind(&self) -> &DependencyKind {
        &self.kind
    }

    fn current_filter(&self) -> Option<&Filter> {
        self.selector.filter()
    }

    /// The registry listener takes every service of the specification; the
    /// rendered filter is applied by the handler
    fn listener_filter(&self) -> Option<Filter> {
        None
    }

    fn accepts(&self, specification: &str, properties: &Properties) -> bool {
        self.inner.accepts(specification, properties)
    }

    fn try_binding(&mut self, registry: &ServiceRegistry) -> Vec<BindingChange> {
        self.inner.try_binding(registry)
    }

    fn on_service_registered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        self.inner.on_service_registered(registry, reference)
    }

    fn on_service_unregistered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        self.inner.on_service_unregistered(registry, reference)
    }

    fn on_service_modified(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
        previous: &Properties,
    ) -> Vec<BindingChange> {
        self.inner.on_service_modified(registry, reference, previous)
    }

    fn on_properties_changed(
        &mut self,
        registry: &ServiceRegistry,
        properties: &Properties,
    ) -> Vec<BindingChange> {
        let selector = selector_for(&self.template, self.inner.requirement(), properties);
        if selector == self.selector {
            return Vec::new();
        }
        self.selector = selector.clone();
        self.inner.set_selector(selector);
        self.inner.reevaluate(registry)
    }

    fn is_satisfied(&self) -> bool {
        self.inner.is_satisfied()
    }

    fn value(&self) -> Injected {
        self.inner.value()
    }

    fn bindings(&self) -> Vec<Binding> {
        self.inner.bindings()
    }

    fn clear(&mut self) -> Vec<BindingChange> {
        self.inner.clear()
    }
}
