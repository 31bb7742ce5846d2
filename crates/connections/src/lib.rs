//! `connections` crate — named resource registry and the clients behind it.
//!
//! Provides the process-wide [`ResourceRegistry`] (warehouse connections and
//! object-store entries looked up by name at operator-execution time), the
//! [`WarehouseClient`] trait with its Postgres implementation, and in-memory
//! doubles for tests.  No orchestration logic lives here.

pub mod error;
pub mod memory;
pub mod object_store;
pub mod postgres;
pub mod registry;
pub mod warehouse;

pub use error::{RegistryError, StoreError, WarehouseError};
pub use memory::MemoryWarehouse;
pub use object_store::{ObjectStore, StaticStore, StoreCredentials};
pub use postgres::PostgresWarehouse;
pub use registry::ResourceRegistry;
pub use warehouse::{RecordFormat, StageManifest, WarehouseClient};
