//! Engine-level error types.

use thiserror::Error;

/// Errors found while validating a dependency graph.
///
/// Any of these aborts the run before a single task executes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two or more tasks share the same ID.
    #[error("duplicate task id: '{0}'")]
    DuplicateTask(String),

    /// A dependency edge references a task ID that was never declared.
    #[error("dependency references unknown task '{task_id}' ({side} side)")]
    UnknownTask {
        task_id: String,
        side: &'static str,
    },

    /// The dependency graph contains a directed cycle.
    #[error("pipeline graph contains a cycle")]
    Cycle,
}

/// Errors produced by the engine outside of individual task failures.
///
/// Task-local operator errors never surface here — the scheduler catches
/// them around each invocation and records them in the run report.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graph failed validation; zero tasks were executed.
    #[error("graph validation failed: {0}")]
    Validation(#[from] GraphError),

    /// A schedule expression could not be parsed.
    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },
}
