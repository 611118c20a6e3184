//! Lifecycle bridge
//!
//! Republishes engine lifecycle events on the event admin, one topic per
//! kind: `cle/component/VALIDATED`, `cle/component/BOUND`, ...

use std::sync::Arc;

use cle_application::ports::LifecycleListener;
use cle_domain::constants::LIFECYCLE_TOPIC_PREFIX;
use cle_domain::events::{LifecycleEvent, LifecycleEventKind};
use cle_domain::value_objects::Properties;
use serde_json::Value;
use tracing::warn;

use crate::constants::EVENT_TIMESTAMP;
use crate::events::event_admin::EventAdmin;

/// Topic on which events of `kind` are republished
pub fn lifecycle_topic(kind: LifecycleEventKind) -> String {
    format!("{LIFECYCLE_TOPIC_PREFIX}/{kind}")
}

/// Event properties describing a lifecycle event; absent fields are left out
pub fn lifecycle_properties(event: &LifecycleEvent) -> Properties {
    let mut properties: Properties = match serde_json::to_value(event) {
        Ok(Value::Object(fields)) => fields
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect(),
        _ => Properties::new(),
    };
    properties.insert(
        EVENT_TIMESTAMP.to_string(),
        Value::from(event.timestamp.timestamp_millis()),
    );
    properties
}

/// [`LifecycleListener`] posting every lifecycle event to an [`EventAdmin`]
pub struct LifecycleBridge {
    admin: Arc<EventAdmin>,
}

impl LifecycleBridge {
    pub fn new(admin: Arc<EventAdmin>) -> Self {
        Self { admin }
    }
}

impl LifecycleListener for LifecycleBridge {
    fn lifecycle_event(&self, event: &LifecycleEvent) {
        let topic = lifecycle_topic(event.kind);
        if let Err(e) = self.admin.post(&topic, lifecycle_properties(event)) {
            warn!(
                topic = %topic,
                factory = %event.factory,
                instance = ?event.instance,
                error = %e,
                "Lifecycle event not republished"
            );
        }
    }
}
