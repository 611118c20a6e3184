//! Event infrastructure
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`worker_pool`] | Bounded pool of named worker threads |
//! | [`queued`] | Lifecycle dispatcher running listeners on one background thread |
//! | [`event_admin`] | Topic bus whose handlers are registry services |
//! | [`bridge`] | Republishes lifecycle events as topic events |

pub mod bridge;
pub mod event_admin;
pub mod queued;
pub mod worker_pool;

pub use bridge::{LifecycleBridge, lifecycle_properties, lifecycle_topic};
pub use event_admin::{EventAdmin, EventHandler, register_handler, validate_topic};
pub use queued::QueuedEventDispatcher;
pub use worker_pool::{EnqueueError, WorkerPool};
