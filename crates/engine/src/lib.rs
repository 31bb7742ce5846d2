//! `engine` crate — dependency graph, scheduler/executor, and run reporting.
//!
//! One [`Scheduler`] owns one [`DependencyGraph`] per run: the graph is built
//! from a [`PipelineDefinition`] (or assembled in-process), validated, walked
//! in dependency order by a bounded worker pool, and discarded when the run's
//! [`RunReport`] has been produced.  There is no ambient global registry of
//! graphs or tasks.

pub mod definition;
pub mod error;
pub mod graph;
pub mod models;
pub mod scheduler;
pub mod trigger;

pub use definition::{PipelineDefinition, RetryDefaults, TaskDefinition};
pub use error::{EngineError, GraphError};
pub use graph::DependencyGraph;
pub use models::{RetryPolicy, RunReport, RunState, Task, TaskFailure, TaskReport, TaskState};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use trigger::CronTrigger;

#[cfg(test)]
mod scheduler_tests;
