//! Named resource registry.
//!
//! One registry is built per process, frozen, and shared behind an `Arc`.
//! Entries are never mutated after construction, so any number of tasks may
//! resolve them concurrently without coordination.

use std::collections::HashMap;
use std::sync::Arc;

use crate::object_store::ObjectStore;
use crate::warehouse::WarehouseClient;
use crate::RegistryError;

enum Resource {
    Warehouse(Arc<dyn WarehouseClient>),
    ObjectStore(Arc<dyn ObjectStore>),
}

impl Resource {
    fn kind(&self) -> &'static str {
        match self {
            Self::Warehouse(_) => "warehouse",
            Self::ObjectStore(_) => "object store",
        }
    }
}

/// Immutable map from resource name to warehouse / object-store entry.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: HashMap<String, Resource>,
}

impl ResourceRegistry {
    pub fn builder() -> ResourceRegistryBuilder {
        ResourceRegistryBuilder::default()
    }

    /// Resolve a warehouse connection by name.
    pub fn warehouse(&self, name: &str) -> Result<Arc<dyn WarehouseClient>, RegistryError> {
        match self.entries.get(name) {
            Some(Resource::Warehouse(client)) => Ok(Arc::clone(client)),
            Some(other) => Err(RegistryError::WrongKind {
                name: name.to_owned(),
                expected: "warehouse",
                actual: other.kind(),
            }),
            None => Err(RegistryError::UnknownResource(name.to_owned())),
        }
    }

    /// Resolve an object store by name.
    pub fn object_store(&self, name: &str) -> Result<Arc<dyn ObjectStore>, RegistryError> {
        match self.entries.get(name) {
            Some(Resource::ObjectStore(store)) => Ok(Arc::clone(store)),
            Some(other) => Err(RegistryError::WrongKind {
                name: name.to_owned(),
                expected: "object store",
                actual: other.kind(),
            }),
            None => Err(RegistryError::UnknownResource(name.to_owned())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Consuming builder; dropping it is the only way entries stop changing.
#[derive(Default)]
pub struct ResourceRegistryBuilder {
    entries: HashMap<String, Resource>,
}

impl ResourceRegistryBuilder {
    pub fn warehouse(mut self, name: impl Into<String>, client: Arc<dyn WarehouseClient>) -> Self {
        self.entries.insert(name.into(), Resource::Warehouse(client));
        self
    }

    pub fn object_store(mut self, name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.entries.insert(name.into(), Resource::ObjectStore(store));
        self
    }

    pub fn build(self) -> ResourceRegistry {
        ResourceRegistry {
            entries: self.entries,
        }
    }
}
