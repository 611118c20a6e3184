//! Type-erased service handles

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Registration id assigned by the service registry
pub type ServiceId = u64;

/// Shareable handle on a registered service.
///
/// Wraps an `Arc<T>` where `T` may be unsized, typically a trait object.
/// Consumers recover the capability they asked for with
/// [`downcast`](Self::downcast), using the same `T` the provider registered.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cle_domain::value_objects::ServiceObject;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// let object = ServiceObject::new::<dyn Greeter>(Arc::new(English));
/// let greeter = object.downcast::<dyn Greeter>().unwrap();
/// assert_eq!(greeter.greet(), "hello");
/// assert!(object.downcast::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct ServiceObject(Arc<dyn Any + Send + Sync>);

impl ServiceObject {
    /// Wrap a shared service
    pub fn new<T>(service: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self(Arc::new(service))
    }

    /// Wrap a plain value
    pub fn from_value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::new(Arc::new(value))
    }

    /// Recover the service as `Arc<T>`, if it was registered as `T`
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.0.downcast_ref::<Arc<T>>().cloned()
    }

    /// Whether the service was registered as `T`
    pub fn is<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.0.is::<Arc<T>>()
    }

    /// Whether both handles point at the same registration payload
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ServiceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceObject({:p})", Arc::as_ptr(&self.0))
    }
}
