//! `operators` crate — the operator contract and its built-in implementations.
//!
//! An operator is one kind of warehouse work: create a table, bulk-stage from
//! object storage, load a fact or dimension relation, assert data quality, or
//! do nothing (graph sentinels).  The set is a closed tagged union —
//! [`Operation`] — dispatched with an exhaustive `match`, so adding a kind is
//! a compile-enforced change everywhere, not a runtime registration.

pub mod context;
pub mod error;
pub mod operation;
pub mod path;

pub use context::ExecutionContext;
pub use error::OperatorError;
pub use operation::{
    CreateTable, DataQualityCheck, LoadDimension, LoadFact, Operation, QualityCheck,
    StageToWarehouse,
};
pub use path::render_prefix;
