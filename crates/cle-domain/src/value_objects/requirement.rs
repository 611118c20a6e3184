//! Requirements and dependency kinds
//!
//! A [`Requirement`] states which services a component field accepts; the
//! [`DependencyKind`] chooses how the engine binds them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::Filter;
use crate::value_objects::Properties;

/// Service dependency of a component field
///
/// # Example
///
/// ```
/// use cle_domain::value_objects::Requirement;
///
/// let req = Requirement::new("storage")
///     .with_filter("(kind=disk)")
///     .unwrap()
///     .optional();
/// assert_eq!(req.specification(), "storage");
/// assert!(req.is_optional());
/// assert!(Requirement::new("storage").with_filter("(kind=").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    specification: String,
    filter: Option<Filter>,
    optional: bool,
    aggregate: bool,
    immediate_rebind: bool,
}

impl Requirement {
    /// Mandatory, single-valued requirement on a specification
    pub fn new<S: Into<String>>(specification: S) -> Self {
        Self {
            specification: specification.into(),
            filter: None,
            optional: false,
            aggregate: false,
            immediate_rebind: false,
        }
    }

    /// Restrict matches with an LDAP filter; blank text removes the filter
    pub fn with_filter(mut self, filter: &str) -> Result<Self> {
        self.filter = Filter::parse_optional(filter)?;
        Ok(self)
    }

    /// Restrict matches with an already parsed filter
    pub fn with_parsed_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    /// Component stays valid without a match
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Bind every match instead of one
    pub fn aggregate(mut self) -> Self {
        self.aggregate = true;
        self
    }

    /// Replace a departed binding without invalidating the component
    pub fn immediate_rebind(mut self) -> Self {
        self.immediate_rebind = true;
        self
    }

    /// Set the rebind policy explicitly
    pub fn with_immediate_rebind(mut self, immediate: bool) -> Self {
        self.immediate_rebind = immediate;
        self
    }

    pub fn specification(&self) -> &str {
        &self.specification
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_aggregate(&self) -> bool {
        self.aggregate
    }

    pub fn is_immediate_rebind(&self) -> bool {
        self.immediate_rebind
    }

    /// Whether a service with this specification and these properties matches
    pub fn accepts(&self, specification: &str, properties: &Properties) -> bool {
        self.specification == specification
            && self.filter.as_ref().is_none_or(|f| f.matches(properties))
    }
}

/// Dependency handler selected for a requirement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyKind {
    /// One binding, or all of them when the requirement is aggregate
    Simple,
    /// The highest-ranked match, switching when a better one appears
    Best,
    /// A proxy forwarding calls to every match
    Broadcast {
        /// Log target failures instead of returning the first one
        muffle_errors: bool,
    },
    /// Matches indexed by the value of a property
    Map {
        /// Property used as the map key
        key: String,
        /// Keep services lacking the key under the `None` key
        allow_none: bool,
    },
    /// Filter rendered from the instance properties
    VarFilter {
        /// Filter template with `{property}` placeholders
        template: String,
    },
    /// Single binding that waits for a replacement before giving up
    Temporal {
        /// How long a departed binding may stay unreplaced
        timeout: Duration,
    },
}

impl DependencyKind {
    /// Short name used in logs and administrative snapshots
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Best => "best",
            Self::Broadcast { .. } => "broadcast",
            Self::Map { .. } => "map",
            Self::VarFilter { .. } => "var_filter",
            Self::Temporal { .. } => "temporal",
        }
    }
}
