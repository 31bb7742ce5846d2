//! Run-scoped context passed to every operator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use connections::ResourceRegistry;
use uuid::Uuid;

/// Everything an operator may consult during execution.
///
/// Cloning is cheap; the registry is shared behind an `Arc` and read-only.
#[derive(Clone)]
pub struct ExecutionContext {
    /// ID of the current pipeline run.
    pub run_id: Uuid,
    /// Logical date of the run; drives source-path templating.
    pub execution_date: DateTime<Utc>,
    /// Named warehouse connections and object stores.
    pub resources: Arc<ResourceRegistry>,
}

impl ExecutionContext {
    pub fn new(execution_date: DateTime<Utc>, resources: Arc<ResourceRegistry>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            execution_date,
            resources,
        }
    }
}
