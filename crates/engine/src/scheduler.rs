//! Pipeline run scheduler/executor.
//!
//! `Scheduler` is the central orchestrator for one run:
//! 1. Validates the dependency graph — nothing executes on a broken graph.
//! 2. Dispatches every ready task onto a bounded tokio worker pool.
//! 3. Owns all task state transitions; workers only report events.
//! 4. Retries failed attempts per task policy, then cascades
//!    `UpstreamFailed` through the downstream closure.
//! 5. Produces a `RunReport` covering every task, cascade included.
//!
//! The control loop never blocks on task I/O: warehouse calls happen on
//! worker tasks, and the ready-set recomputation after each completion is
//! the sole synchronization point between branches.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use connections::ResourceRegistry;
use operators::{ExecutionContext, OperatorError};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::graph::DependencyGraph;
use crate::models::{RunReport, RunState, Task, TaskFailure, TaskReport, TaskState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of tasks executing concurrently.  Independent
    /// branches run in parallel up to this bound; dependency-connected
    /// tasks never run concurrently regardless.  A slot is held only while
    /// an attempt is executing — retry waits release it.
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

// ---------------------------------------------------------------------------
// Worker events
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum WorkerEvent {
    /// An attempt is about to execute the operator.
    Started { task_id: String, attempt: u32 },
    /// An attempt failed and the worker is waiting out the retry delay.
    Retrying { task_id: String },
    /// The task reached a terminal result.
    Finished {
        task_id: String,
        attempts: u32,
        result: Result<(), OperatorError>,
    },
}

#[derive(Debug, Default)]
struct TaskRecord {
    attempts: u32,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<TaskFailure>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Orchestrates a single pipeline run.
///
/// One scheduler owns one graph; construct a fresh pair per run.
pub struct Scheduler {
    pipeline: String,
    graph: DependencyGraph,
    resources: Arc<ResourceRegistry>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        pipeline: impl Into<String>,
        graph: DependencyGraph,
        resources: Arc<ResourceRegistry>,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            graph,
            resources,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run to completion without external cancellation.
    pub async fn run(&self, execution_date: DateTime<Utc>) -> Result<RunReport, EngineError> {
        self.run_with_cancellation(execution_date, CancellationToken::new())
            .await
    }

    /// Run to completion, honouring a run-level cancellation token.
    ///
    /// On cancellation, Pending and Queued tasks move to Skipped; an
    /// attempt that is already executing is allowed to finish and records
    /// its real terminal state, while a task waiting out a retry delay
    /// abandons the wait and ends Skipped.  Partially-applied warehouse
    /// side effects are not rolled back.
    ///
    /// # Errors
    /// [`EngineError::Validation`] if the graph is invalid — in that case
    /// zero tasks were executed and no report exists.
    #[instrument(skip(self, cancel), fields(pipeline = %self.pipeline))]
    pub async fn run_with_cancellation(
        &self,
        execution_date: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> Result<RunReport, EngineError> {
        self.graph.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut state = RunState::Initialized;
        info!(%run_id, %state, "run created with {} tasks", self.graph.len());

        let mut states: HashMap<String, TaskState> = self
            .graph
            .tasks()
            .iter()
            .map(|t| (t.id.clone(), TaskState::Pending))
            .collect();
        let mut records: HashMap<String, TaskRecord> = self
            .graph
            .tasks()
            .iter()
            .map(|t| (t.id.clone(), TaskRecord::default()))
            .collect();

        let ctx = ExecutionContext {
            run_id,
            execution_date,
            resources: Arc::clone(&self.resources),
        };
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<WorkerEvent>();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut cancelled = false;

        state = RunState::Running;
        info!(%run_id, %state, "dispatching ready tasks");
        self.dispatch_ready(&mut states, &ctx, &event_tx, &semaphore, &cancel);

        while states
            .values()
            .any(|s| matches!(s, TaskState::Queued | TaskState::Running))
        {
            tokio::select! {
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    warn!(%run_id, "cancellation requested; skipping tasks that have not started");
                    for state in states.values_mut() {
                        if matches!(state, TaskState::Pending | TaskState::Queued) {
                            *state = TaskState::Skipped;
                        }
                    }
                }
                Some(event) = event_rx.recv() => {
                    let completed = self.apply_event(event, &mut states, &mut records, cancelled);
                    if completed && !cancelled {
                        self.dispatch_ready(&mut states, &ctx, &event_tx, &semaphore, &cancel);
                    }
                }
            }
        }

        let finished_at = Utc::now();
        state = if states.values().all(|s| *s == TaskState::Success) {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        match state {
            RunState::Succeeded => info!(%run_id, "run succeeded"),
            _ => warn!(%run_id, "run failed"),
        }

        let tasks = self
            .graph
            .tasks()
            .iter()
            .map(|task| {
                let record = records.remove(&task.id).unwrap_or_default();
                TaskReport {
                    task_id: task.id.clone(),
                    state: states[&task.id],
                    attempts: record.attempts,
                    started_at: record.started_at,
                    finished_at: record.finished_at,
                    error: record.error,
                }
            })
            .collect();

        Ok(RunReport {
            run_id,
            pipeline: self.pipeline.clone(),
            state,
            execution_date,
            started_at,
            finished_at,
            tasks,
        })
    }

    /// Queue every ready task and hand it to a worker.
    fn dispatch_ready(
        &self,
        states: &mut HashMap<String, TaskState>,
        ctx: &ExecutionContext,
        event_tx: &mpsc::UnboundedSender<WorkerEvent>,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
    ) {
        for task_id in self.graph.ready_set(states) {
            let Some(task) = self.graph.task(&task_id) else {
                continue;
            };
            states.insert(task_id, TaskState::Queued);
            spawn_worker(
                task.clone(),
                ctx.clone(),
                event_tx.clone(),
                Arc::clone(semaphore),
                cancel.clone(),
            );
        }
    }

    /// Fold one worker event into the state tables.  Returns whether a task
    /// reached a terminal state (and downstream work may have unblocked).
    fn apply_event(
        &self,
        event: WorkerEvent,
        states: &mut HashMap<String, TaskState>,
        records: &mut HashMap<String, TaskRecord>,
        cancelled: bool,
    ) -> bool {
        match event {
            WorkerEvent::Started { task_id, attempt } => {
                // The attempt is genuinely executing, even if a cancellation
                // marked the task Skipped a moment ago; the report must carry
                // its real result, not a Skipped that hides side effects.
                states.insert(task_id.clone(), TaskState::Running);
                if let Some(record) = records.get_mut(&task_id) {
                    record.attempts = attempt;
                    record.started_at.get_or_insert_with(Utc::now);
                }
                false
            }
            WorkerEvent::Retrying { task_id } => {
                // A cancelled worker abandons the retry wait and sends no
                // further events, so the task must end Skipped here instead
                // of parking in Queued forever.
                let next = if cancelled {
                    TaskState::Skipped
                } else {
                    TaskState::Queued
                };
                states.insert(task_id, next);
                false
            }
            WorkerEvent::Finished {
                task_id,
                attempts,
                result,
            } => {
                if let Some(record) = records.get_mut(&task_id) {
                    record.attempts = attempts;
                    record.finished_at = Some(Utc::now());
                }
                match result {
                    Ok(()) => {
                        info!(%task_id, "task succeeded after {} attempt(s)", attempts);
                        states.insert(task_id, TaskState::Success);
                    }
                    Err(e) => {
                        error!(%task_id, "task failed permanently after {} attempt(s): {}", attempts, e);
                        if let Some(record) = records.get_mut(&task_id) {
                            record.error = Some(TaskFailure {
                                kind: e.kind().to_owned(),
                                message: e.to_string(),
                            });
                        }
                        states.insert(task_id.clone(), TaskState::Failed);
                        for downstream in self.graph.downstream_closure(&task_id) {
                            if states.get(&downstream) == Some(&TaskState::Pending) {
                                warn!(
                                    "marking '{}' upstream-failed (depends on '{}')",
                                    downstream, task_id
                                );
                                states.insert(downstream, TaskState::UpstreamFailed);
                            }
                        }
                    }
                }
                true
            }
        }
    }
}

/// Execute one task on the pool, reporting progress over the event channel.
///
/// The worker owns the retry loop so a slow retry wait never occupies the
/// control loop; the scheduler sees the wait as the task sitting in Queued.
/// A semaphore permit is held per attempt, not per task — the retry wait
/// releases the slot so long delays cannot starve ready tasks.
fn spawn_worker(
    task: Task,
    ctx: ExecutionContext,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut attempt = 1u32;
        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => return,
                acquired = Arc::clone(&semaphore).acquire_owned() => match acquired {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            if cancel.is_cancelled() {
                return;
            }
            if event_tx
                .send(WorkerEvent::Started {
                    task_id: task.id.clone(),
                    attempt,
                })
                .is_err()
            {
                return;
            }

            let result = task.operation.execute(&ctx).await;
            drop(permit);
            match result {
                Ok(()) => {
                    let _ = event_tx.send(WorkerEvent::Finished {
                        task_id: task.id.clone(),
                        attempts: attempt,
                        result: Ok(()),
                    });
                    return;
                }
                Err(e) => {
                    if attempt >= task.retry.max_attempts {
                        let _ = event_tx.send(WorkerEvent::Finished {
                            task_id: task.id.clone(),
                            attempts: attempt,
                            result: Err(e),
                        });
                        return;
                    }
                    warn!(
                        task_id = %task.id,
                        "attempt {}/{} failed, retrying in {:?}: {}",
                        attempt, task.retry.max_attempts, task.retry.delay, e
                    );
                    if event_tx
                        .send(WorkerEvent::Retrying {
                            task_id: task.id.clone(),
                        })
                        .is_err()
                    {
                        return;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(task.retry.delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    });
}
