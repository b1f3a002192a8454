//! Object registry: service name to a lazily constructed, process-lifetime
//! instance.
//!
//! The name → slot map is built once at startup and never mutated, so
//! lookups take no lock. Each slot owns a `OnceLock`, which serializes
//! construction of that one service without touching any other.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use interop_protocol::{BridgeError, DynamicValue};
use interop_services::{MethodTable, Reply, Service};
use tracing::info;

/// Object-safe view of one registered service.
pub(crate) trait ServiceSlot: Send + Sync {
    fn name(&self) -> &'static str;
    fn instance(&self) -> Arc<dyn Any + Send + Sync>;
    fn invoke(&self, method: &str, args: Vec<DynamicValue>) -> Result<Reply, BridgeError>;
    fn method_names(&self) -> Vec<&'static str>;
    fn is_constructed(&self) -> bool;
}

type Factory<S> = Box<dyn Fn() -> S + Send + Sync>;

struct TypedSlot<S: Service> {
    methods: MethodTable<S>,
    factory: Factory<S>,
    cell: OnceLock<Arc<S>>,
}

impl<S: Service> TypedSlot<S> {
    fn get_or_construct(&self) -> &Arc<S> {
        self.cell.get_or_init(|| {
            info!("Creating new instance of {}", S::NAME);
            Arc::new((self.factory)())
        })
    }
}

impl<S: Service> ServiceSlot for TypedSlot<S> {
    fn name(&self) -> &'static str {
        S::NAME
    }

    fn instance(&self) -> Arc<dyn Any + Send + Sync> {
        self.get_or_construct().clone()
    }

    fn invoke(&self, method: &str, args: Vec<DynamicValue>) -> Result<Reply, BridgeError> {
        let service = self.get_or_construct();
        self.methods.call(service, method, args)
    }

    fn method_names(&self) -> Vec<&'static str> {
        self.methods.names()
    }

    fn is_constructed(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Registered services, addressable by name.
#[derive(Default)]
pub struct ObjectRegistry {
    slots: HashMap<&'static str, Box<dyn ServiceSlot>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service constructed with `Default` on first use.
    pub fn register<S: Service + Default>(self) -> Self {
        self.register_with(S::default)
    }

    /// Register a service constructed by `factory` on first use.
    ///
    /// Registering the same name twice replaces the earlier entry.
    pub fn register_with<S, F>(mut self, factory: F) -> Self
    where
        S: Service,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let slot = TypedSlot {
            methods: MethodTable::<S>::build(),
            factory: Box::new(factory),
            cell: OnceLock::new(),
        };
        info!("Registering service: {} ({} methods)", S::NAME, slot.methods.len());
        self.slots.insert(S::NAME, Box::new(slot));
        self
    }

    pub(crate) fn slot(&self, name: &str) -> Result<&dyn ServiceSlot, BridgeError> {
        self.slots
            .get(name)
            .map(|slot| slot.as_ref())
            .ok_or_else(|| BridgeError::service_not_found(name))
    }

    /// The instance registered under `name`, constructing it on first use.
    /// Unknown names construct nothing.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>, BridgeError> {
        Ok(self.slot(name)?.instance())
    }

    /// Typed access to a registered service.
    pub fn get<S: Service>(&self) -> Result<Arc<S>, BridgeError> {
        self.resolve(S::NAME)?
            .downcast::<S>()
            .map_err(|_| BridgeError::internal(format!("{} is registered with another type", S::NAME)))
    }

    pub fn is_constructed(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|slot| slot.is_constructed())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.values().map(|slot| slot.name()).collect();
        names.sort_unstable();
        names
    }

    /// Callable method names of `service`, sorted.
    pub fn methods(&self, service: &str) -> Result<Vec<&'static str>, BridgeError> {
        Ok(self.slot(service)?.method_names())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
