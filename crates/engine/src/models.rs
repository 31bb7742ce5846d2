//! Core domain models: tasks, states, retry policy, and run reports.
//!
//! These types are the source of truth for what a pipeline run looks like
//! in memory.  Reports serialize to JSON so any CLI or monitoring surface
//! can be built on top of them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use operators::Operation;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// How many times a task may run, and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (>= 1).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work in the dependency graph.
///
/// Upstream edges live in the graph, not here; a task only knows its own
/// identity, operation, and retry policy.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub operation: Operation,
    pub retry: RetryPolicy,
}

impl Task {
    pub fn new(id: impl Into<String>, operation: Operation) -> Self {
        Self {
            id: id.into(),
            operation,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Per-task run state.
///
/// Transitions: Pending → Queued → Running → {Success | Failed}; a failed
/// attempt re-enters Queued while attempts remain.  A task whose upstream
/// fails permanently becomes UpstreamFailed without executing; cancellation
/// moves Pending/Queued tasks to Skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Queued,
    Running,
    Success,
    Failed,
    UpstreamFailed,
    Skipped,
}

impl TaskState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::UpstreamFailed | Self::Skipped
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::UpstreamFailed => write!(f, "upstream_failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run state machine
// ---------------------------------------------------------------------------

/// Whole-run state: Initialized → Running → {Succeeded | Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initialized,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run reports
// ---------------------------------------------------------------------------

/// The error that permanently failed a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Machine-readable error kind (e.g. `source_not_found`).
    pub kind: String,
    pub message: String,
}

/// Final record for one task of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub state: TaskState,
    /// Attempts actually made (0 if the task never started).
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Present only when `state == Failed`.
    pub error: Option<TaskFailure>,
}

/// Outcome of one pipeline run, tasks in declaration order.
///
/// This is the run outcome surface: final state, attempts, timestamps, and
/// error kind/message per task — including the full UpstreamFailed cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline: String,
    pub state: RunState,
    pub execution_date: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    /// Look up one task's report by id.
    pub fn task(&self, task_id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// State of one task, if it exists.
    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.task(task_id).map(|t| t.state)
    }
}
