//! Typed error types for the connections crate.

use thiserror::Error;

/// Errors returned by a [`crate::WarehouseClient`] implementation.
///
/// The variant tells the operator layer what went wrong, not whether to
/// retry — retry policy is owned by the scheduler.
#[derive(Debug, Error, Clone)]
pub enum WarehouseError {
    /// DDL was rejected (malformed statement, insufficient privilege).
    #[error("schema error: {0}")]
    Schema(String),

    /// A query or DML statement failed (bad select logic, missing relation).
    #[error("query error: {0}")]
    Query(String),

    /// A bulk load failed (malformed records, copy rejected).
    #[error("load error: {0}")]
    Load(String),
}

/// Errors returned by an [`crate::ObjectStore`] implementation.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("object store access error: {0}")]
    Access(String),
}

/// Errors from [`crate::ResourceRegistry`] lookups.
#[derive(Debug, Error, Clone)]
pub enum RegistryError {
    /// No entry is registered under the requested name.
    #[error("no resource registered under name '{0}'")]
    UnknownResource(String),

    /// The name exists but holds a resource of the other kind.
    #[error("resource '{name}' is a {actual}, expected a {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}
