//! Declarative pipeline definition format.
//!
//! A pipeline is a JSON document: a name, an optional cron schedule, retry
//! defaults, and a task list where each task carries its operation (tagged by
//! `kind`), optional retry overrides, and its upstream IDs.  The definition
//! is static configuration — the engine turns it into a fresh
//! [`DependencyGraph`] for every run.

use std::time::Duration;

use operators::Operation;
use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;
use crate::models::{RetryPolicy, Task};

/// Pipeline-wide retry defaults, overridable per task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryDefaults {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub retry_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_delay_secs: 0,
        }
    }
}

/// One task entry of a pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique identifier within this pipeline (referenced by `upstream`).
    pub id: String,
    /// The operation to perform, tagged by `kind`.
    pub operation: Operation,
    /// Override of the pipeline's `max_attempts` default.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Override of the pipeline's `retry_delay_secs` default.
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,
    /// IDs of tasks that must succeed before this one runs.
    #[serde(default)]
    pub upstream: Vec<String>,
}

/// A complete pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    /// Five-field cron expression; absent means trigger-on-demand only.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub defaults: RetryDefaults,
    pub tasks: Vec<TaskDefinition>,
}

impl PipelineDefinition {
    /// Parse a definition from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Build the dependency graph for one run.
    ///
    /// The graph is not validated here — the scheduler validates before
    /// executing, so a broken definition still produces a report-friendly
    /// validation error rather than a parse-time panic.
    pub fn build_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for task_def in &self.tasks {
            let retry = RetryPolicy {
                max_attempts: task_def
                    .max_attempts
                    .unwrap_or(self.defaults.max_attempts)
                    .max(1),
                delay: Duration::from_secs(
                    task_def
                        .retry_delay_secs
                        .unwrap_or(self.defaults.retry_delay_secs),
                ),
            };
            graph.add_task(Task::new(&task_def.id, task_def.operation.clone()).with_retry(retry));
            for upstream in &task_def.upstream {
                graph.add_dependency(upstream.clone(), task_def.id.clone());
            }
        }
        graph
    }
}
