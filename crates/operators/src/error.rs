//! Operator-level error taxonomy.
//!
//! Every variant is task-local: the scheduler catches it around the operator
//! invocation and decides retry-vs-fail.  Nothing here ever aborts the
//! process.

use connections::{RegistryError, StoreError, WarehouseError};
use thiserror::Error;

/// Errors returned by an operator's `execute`.
#[derive(Debug, Error, Clone)]
pub enum OperatorError {
    /// A named connection or store is not registered (misconfiguration).
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// DDL rejected — malformed statement or insufficient privilege.
    #[error("schema error: {0}")]
    Schema(String),

    /// The staging source path matched zero objects.
    #[error("no objects found under '{0}'")]
    SourceNotFound(String),

    /// Bulk load failed — malformed records or rejected copy.
    #[error("load error: {0}")]
    Load(String),

    /// Insert-from-select failed — bad select logic or missing relation.
    #[error("query error: {0}")]
    Query(String),

    /// One or more quality assertions did not hold.
    #[error("data quality check failed: {0}")]
    DataQuality(String),
}

impl OperatorError {
    /// Stable machine-readable kind, surfaced in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownResource(_) => "unknown_resource",
            Self::Schema(_) => "schema",
            Self::SourceNotFound(_) => "source_not_found",
            Self::Load(_) => "load",
            Self::Query(_) => "query",
            Self::DataQuality(_) => "data_quality",
        }
    }
}

impl From<RegistryError> for OperatorError {
    fn from(e: RegistryError) -> Self {
        Self::UnknownResource(e.to_string())
    }
}

impl From<WarehouseError> for OperatorError {
    fn from(e: WarehouseError) -> Self {
        match e {
            WarehouseError::Schema(m) => Self::Schema(m),
            WarehouseError::Query(m) => Self::Query(m),
            WarehouseError::Load(m) => Self::Load(m),
        }
    }
}

impl From<StoreError> for OperatorError {
    fn from(e: StoreError) -> Self {
        Self::Load(e.to_string())
    }
}
