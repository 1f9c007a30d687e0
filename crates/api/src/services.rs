//! Service registry shared by the host and plugin modules.
//!
//! `ServiceCollection` is the mutable registry used while the host is being
//! configured. It is only ever touched from the startup thread. `build()`
//! freezes it into a `ServiceProvider`, which is cheap to clone and read-only.

use crate::error::{ServiceError, ServiceResult};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type SharedService = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
struct ServiceSlot {
    type_name: &'static str,
    instances: Vec<SharedService>,
}

/// Registrations keyed by concrete type. Several registrations of one type
/// are kept in order; lookups return the most recent one.
#[derive(Default)]
pub struct ServiceCollection {
    slots: HashMap<TypeId, ServiceSlot>,
    order: Vec<TypeId>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a singleton value.
    pub fn add_singleton<T: Any + Send + Sync>(&mut self, service: T) -> &mut Self {
        self.add_shared(Arc::new(service))
    }

    /// Register an already shared singleton.
    pub fn add_shared<T: Any + Send + Sync>(&mut self, service: Arc<T>) -> &mut Self {
        let id = TypeId::of::<T>();
        let slot = self.slots.entry(id).or_insert_with(|| ServiceSlot {
            type_name: std::any::type_name::<T>(),
            instances: Vec::new(),
        });
        if slot.instances.is_empty() {
            self.order.push(id);
        }
        slot.instances.push(service);
        self
    }

    /// Register `service` only if no service of that type exists yet.
    /// Returns `true` when the value was added.
    pub fn try_add_singleton<T: Any + Send + Sync>(&mut self, service: T) -> bool {
        if self.contains::<T>() {
            return false;
        }
        self.add_singleton(service);
        true
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        lookup_last(&self.slots)
    }

    /// Like `get`, but a missing service is an error naming the type.
    pub fn require<T: Any + Send + Sync>(&self) -> ServiceResult<Arc<T>> {
        self.get::<T>().ok_or_else(ServiceError::missing::<T>)
    }

    pub fn get_all<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        lookup_all(&self.slots)
    }

    /// Number of distinct service types registered.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Type names in first-registration order.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.order
            .iter()
            .filter_map(|id| self.slots.get(id).map(|slot| slot.type_name))
            .collect()
    }

    pub fn build(self) -> ServiceProvider {
        ServiceProvider {
            slots: Arc::new(self.slots),
        }
    }
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("services", &self.type_names())
            .finish()
    }
}

/// Frozen registry handed to the web application and its handlers.
#[derive(Clone, Default)]
pub struct ServiceProvider {
    slots: Arc<HashMap<TypeId, ServiceSlot>>,
}

impl ServiceProvider {
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        lookup_last(&self.slots)
    }

    pub fn require<T: Any + Send + Sync>(&self) -> ServiceResult<Arc<T>> {
        self.get::<T>().ok_or_else(ServiceError::missing::<T>)
    }

    pub fn get_all<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        lookup_all(&self.slots)
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("services", &self.slots.len())
            .finish()
    }
}

fn lookup_last<T: Any + Send + Sync>(slots: &HashMap<TypeId, ServiceSlot>) -> Option<Arc<T>> {
    let slot = slots.get(&TypeId::of::<T>())?;
    let last = slot.instances.last()?.clone();
    last.downcast::<T>().ok()
}

fn lookup_all<T: Any + Send + Sync>(slots: &HashMap<TypeId, ServiceSlot>) -> Vec<Arc<T>> {
    slots
        .get(&TypeId::of::<T>())
        .map(|slot| {
            slot.instances
                .iter()
                .filter_map(|service| service.clone().downcast::<T>().ok())
                .collect()
        })
        .unwrap_or_default()
}
