//! Integration tests for the scheduler, driven through the in-memory
//! warehouse and object-store doubles — no real warehouse required.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use connections::{
    MemoryWarehouse, ResourceRegistry, StaticStore, StoreCredentials, WarehouseError,
};
use operators::{
    CreateTable, DataQualityCheck, LoadDimension, LoadFact, Operation, QualityCheck,
    StageToWarehouse,
};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, GraphError};
use crate::graph::DependencyGraph;
use crate::models::{RetryPolicy, RunState, Task, TaskState};
use crate::scheduler::{Scheduler, SchedulerConfig};

fn execution_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 11, 3, 7, 0, 0).unwrap()
}

fn fixture() -> (Arc<MemoryWarehouse>, Arc<StaticStore>, Arc<ResourceRegistry>) {
    let warehouse = Arc::new(MemoryWarehouse::new());
    let store = Arc::new(StaticStore::new(StoreCredentials {
        access_key_id: "AKIATEST".into(),
        secret_access_key: "secret".into(),
    }));
    let registry = ResourceRegistry::builder()
        .warehouse("redshift", warehouse.clone())
        .object_store("aws_credentials", store.clone())
        .build();
    (warehouse, store, Arc::new(registry))
}

fn noop(id: &str) -> Task {
    Task::new(id, Operation::NoOp)
}

fn create_table(id: &str, table: &str) -> Task {
    Task::new(
        id,
        Operation::CreateTable(CreateTable {
            warehouse: "redshift".into(),
            table: table.into(),
            ddl: format!("CREATE TABLE IF NOT EXISTS {table} (id int4)"),
        }),
    )
}

fn load_fact(id: &str, table: &str, select: &str) -> Task {
    Task::new(
        id,
        Operation::LoadFact(LoadFact {
            warehouse: "redshift".into(),
            table: table.into(),
            select: select.into(),
        }),
    )
}

fn retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn empty_graph_succeeds_immediately() {
    let (_, _, registry) = fixture();
    let scheduler = Scheduler::new("empty", DependencyGraph::new(), registry);
    let report = scheduler.run(execution_date()).await.unwrap();
    assert_eq!(report.state, RunState::Succeeded);
    assert!(report.tasks.is_empty());
}

#[tokio::test]
async fn chain_runs_in_topological_order() {
    let (warehouse, store, registry) = fixture();
    store.put_object("data-lake", "log_data/2018/11/events.json");
    warehouse.seed_select("SELECT * FROM staging_events", 5);

    let mut graph = DependencyGraph::new();
    graph
        .add_task(create_table("create_staging", "staging_events"))
        .add_task(Task::new(
            "stage_events",
            Operation::StageToWarehouse(StageToWarehouse {
                warehouse: "redshift".into(),
                object_store: "aws_credentials".into(),
                table: "staging_events".into(),
                bucket: "data-lake".into(),
                prefix: "log_data/{year}/{month}".into(),
                format: Default::default(),
            }),
        ))
        .add_task(load_fact("load_songplays", "songplays", "SELECT * FROM staging_events"));
    graph
        .add_dependency("create_staging", "stage_events")
        .add_dependency("stage_events", "load_songplays");

    let scheduler = Scheduler::new("chain", graph, registry);
    let report = scheduler.run(execution_date()).await.unwrap();

    assert_eq!(report.state, RunState::Succeeded);
    assert_eq!(
        warehouse.operations(),
        vec![
            "create:staging_events",
            "copy:staging_events",
            "insert:songplays"
        ]
    );
    // Report lists tasks in declaration order with full bookkeeping.
    let ids: Vec<&str> = report.tasks.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(ids, vec!["create_staging", "stage_events", "load_songplays"]);
    for task in &report.tasks {
        assert_eq!(task.state, TaskState::Success);
        assert_eq!(task.attempts, 1);
        assert!(task.started_at.is_some());
        assert!(task.finished_at.is_some());
        assert!(task.error.is_none());
    }
}

#[tokio::test]
async fn independent_branches_both_complete() {
    let (warehouse, store, registry) = fixture();
    store.put_object("data-lake", "log_data/events.json");
    store.put_object("data-lake", "song_data/song.json");

    let stage = |id: &str, table: &str, prefix: &str| {
        Task::new(
            id,
            Operation::StageToWarehouse(StageToWarehouse {
                warehouse: "redshift".into(),
                object_store: "aws_credentials".into(),
                table: table.into(),
                bucket: "data-lake".into(),
                prefix: prefix.into(),
                format: Default::default(),
            }),
        )
    };

    let mut graph = DependencyGraph::new();
    graph
        .add_task(noop("begin"))
        .add_task(stage("stage_events", "staging_events", "log_data"))
        .add_task(stage("stage_songs", "staging_songs", "song_data"))
        .add_task(noop("end"));
    graph
        .add_dependency("begin", "stage_events")
        .add_dependency("begin", "stage_songs")
        .add_dependency("stage_events", "end")
        .add_dependency("stage_songs", "end");

    let scheduler = Scheduler::new("branches", graph, registry);
    let report = scheduler.run(execution_date()).await.unwrap();

    assert_eq!(report.state, RunState::Succeeded);
    assert_eq!(warehouse.rows("staging_events"), Some(1));
    assert_eq!(warehouse.rows("staging_songs"), Some(1));
}

#[tokio::test]
async fn invalid_graph_aborts_before_any_task_runs() {
    let (warehouse, _, registry) = fixture();
    let mut graph = DependencyGraph::new();
    graph
        .add_task(create_table("a", "t_a"))
        .add_task(create_table("b", "t_b"));
    graph.add_dependency("a", "b").add_dependency("b", "a");

    let scheduler = Scheduler::new("cyclic", graph, registry);
    let err = scheduler.run(execution_date()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(GraphError::Cycle)
    ));
    assert!(warehouse.operations().is_empty());
}

#[tokio::test]
async fn transient_failure_recovers_within_the_retry_budget() {
    let (warehouse, _, registry) = fixture();
    warehouse.seed_select("SELECT * FROM staging_events", 5);
    warehouse.fail_times("songplays", WarehouseError::Query("deadlock detected".into()), 2);

    let mut graph = DependencyGraph::new();
    graph.add_task(
        load_fact("load_songplays", "songplays", "SELECT * FROM staging_events")
            .with_retry(retry(3)),
    );

    let scheduler = Scheduler::new("flaky", graph, registry);
    let report = scheduler.run(execution_date()).await.unwrap();

    assert_eq!(report.state, RunState::Succeeded);
    let task = report.task("load_songplays").unwrap();
    assert_eq!(task.state, TaskState::Success);
    assert_eq!(task.attempts, 3);
    // The two failed attempts inserted nothing.
    assert_eq!(warehouse.rows("songplays"), Some(5));
}

#[tokio::test]
async fn exhausted_retries_fail_the_task_permanently() {
    let (_, _, registry) = fixture();
    let mut graph = DependencyGraph::new();
    // Unseeded select: every attempt is a query error.
    graph.add_task(
        load_fact("load_songplays", "songplays", "SELECT * FROM missing").with_retry(retry(3)),
    );

    let scheduler = Scheduler::new("exhausted", graph, registry);
    let report = scheduler.run(execution_date()).await.unwrap();

    assert_eq!(report.state, RunState::Failed);
    let task = report.task("load_songplays").unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.attempts, 3);
    let failure = task.error.as_ref().unwrap();
    assert_eq!(failure.kind, "query");
    assert!(failure.message.contains("missing"));
}

#[tokio::test]
async fn permanent_failure_cascades_but_spares_other_branches() {
    let (warehouse, _, registry) = fixture();
    //   begin → broken → never
    //   begin → survivor
    let mut graph = DependencyGraph::new();
    graph
        .add_task(noop("begin"))
        .add_task(load_fact("broken", "songplays", "SELECT * FROM missing").with_retry(retry(2)))
        .add_task(create_table("never", "never_table"))
        .add_task(create_table("survivor", "survivor_table"));
    graph
        .add_dependency("begin", "broken")
        .add_dependency("broken", "never")
        .add_dependency("begin", "survivor");

    let scheduler = Scheduler::new("cascade", graph, registry);
    let report = scheduler.run(execution_date()).await.unwrap();

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.task_state("begin"), Some(TaskState::Success));
    assert_eq!(report.task_state("broken"), Some(TaskState::Failed));
    assert_eq!(report.task_state("never"), Some(TaskState::UpstreamFailed));
    assert_eq!(report.task_state("survivor"), Some(TaskState::Success));

    // The cascaded task's operator was never invoked.
    assert!(!warehouse.touched("never_table"));
    assert!(warehouse.touched("survivor_table"));
    assert_eq!(report.task("never").unwrap().attempts, 0);
}

#[tokio::test]
async fn quality_failure_is_fatal_for_the_run() {
    let (warehouse, _, registry) = fixture();
    warehouse.seed_table("songplays", 0);

    let mut graph = DependencyGraph::new();
    graph
        .add_task(Task::new(
            "quality",
            Operation::DataQualityCheck(DataQualityCheck {
                warehouse: "redshift".into(),
                checks: vec![QualityCheck {
                    table: "songplays".into(),
                    not_null: None,
                }],
            }),
        ))
        .add_task(noop("end"));
    graph.add_dependency("quality", "end");

    let scheduler = Scheduler::new("quality-gate", graph, registry);
    let report = scheduler.run(execution_date()).await.unwrap();

    assert_eq!(report.state, RunState::Failed);
    let quality = report.task("quality").unwrap();
    assert_eq!(quality.state, TaskState::Failed);
    assert_eq!(quality.error.as_ref().unwrap().kind, "data_quality");
    assert_eq!(report.task_state("end"), Some(TaskState::UpstreamFailed));
}

/// The full star-schema scenario: A(create) → B(stage) → C(fact) → {D,E}
/// (dimensions) → F(quality), with B failing after one retry because its
/// source prefix matches nothing.
#[tokio::test]
async fn failing_stage_reports_the_full_cascade() {
    let (warehouse, _, registry) = fixture();

    let mut graph = DependencyGraph::new();
    graph
        .add_task(create_table("a_create", "songplays"))
        .add_task(
            Task::new(
                "b_stage",
                Operation::StageToWarehouse(StageToWarehouse {
                    warehouse: "redshift".into(),
                    object_store: "aws_credentials".into(),
                    table: "staging_events".into(),
                    bucket: "data-lake".into(),
                    prefix: "log_data/{ds}".into(),
                    format: Default::default(),
                }),
            )
            .with_retry(retry(2)), // one retry
        )
        .add_task(load_fact("c_fact", "songplays", "SELECT * FROM staging_events"))
        .add_task(Task::new(
            "d_users",
            Operation::LoadDimension(LoadDimension {
                warehouse: "redshift".into(),
                table: "users".into(),
                select: "SELECT DISTINCT userid FROM staging_events".into(),
                truncate_table: true,
            }),
        ))
        .add_task(Task::new(
            "e_artists",
            Operation::LoadDimension(LoadDimension {
                warehouse: "redshift".into(),
                table: "artists".into(),
                select: "SELECT DISTINCT artistid FROM staging_songs".into(),
                truncate_table: true,
            }),
        ))
        .add_task(Task::new(
            "f_quality",
            Operation::DataQualityCheck(DataQualityCheck {
                warehouse: "redshift".into(),
                checks: vec![QualityCheck {
                    table: "songplays".into(),
                    not_null: Some("playid".into()),
                }],
            }),
        ));
    graph
        .add_dependency("a_create", "b_stage")
        .add_dependency("b_stage", "c_fact")
        .add_dependency("c_fact", "d_users")
        .add_dependency("c_fact", "e_artists")
        .add_dependency("d_users", "f_quality")
        .add_dependency("e_artists", "f_quality");

    let scheduler = Scheduler::new("star-schema", graph, registry);
    let report = scheduler.run(execution_date()).await.unwrap();

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.task_state("a_create"), Some(TaskState::Success));

    let stage = report.task("b_stage").unwrap();
    assert_eq!(stage.state, TaskState::Failed);
    assert_eq!(stage.attempts, 2);
    assert_eq!(stage.error.as_ref().unwrap().kind, "source_not_found");

    for downstream in ["c_fact", "d_users", "e_artists", "f_quality"] {
        assert_eq!(
            report.task_state(downstream),
            Some(TaskState::UpstreamFailed),
            "{downstream} should be upstream-failed"
        );
        assert_eq!(report.task(downstream).unwrap().attempts, 0);
    }

    // Only the create-table operator ever reached the warehouse.
    assert_eq!(warehouse.operations(), vec!["create:songplays"]);
}

#[tokio::test]
async fn precancelled_run_skips_every_task() {
    let (warehouse, _, registry) = fixture();
    let mut graph = DependencyGraph::new();
    graph
        .add_task(create_table("a", "t_a"))
        .add_task(create_table("b", "t_b"));
    graph.add_dependency("a", "b");

    let cancel = CancellationToken::new();
    cancel.cancel();

    let scheduler = Scheduler::new("cancelled", graph, registry);
    let report = scheduler
        .run_with_cancellation(execution_date(), cancel)
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Failed);
    for task in &report.tasks {
        assert_eq!(task.state, TaskState::Skipped);
        assert_eq!(task.attempts, 0);
        assert!(task.started_at.is_none());
    }
    assert!(warehouse.operations().is_empty());
}

#[tokio::test]
async fn cancellation_during_a_running_attempt_still_terminates_the_run() {
    let (warehouse, _, registry) = fixture();
    warehouse.set_latency(Duration::from_millis(300));

    // Every attempt fails, so the cancel lands while an attempt is Running
    // and retries still remain.
    let mut graph = DependencyGraph::new();
    graph.add_task(
        load_fact("mid_flight", "songplays", "SELECT * FROM missing").with_retry(RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(60),
        }),
    );

    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        let scheduler = Scheduler::new("mid-flight", graph, registry);
        tokio::spawn(async move {
            scheduler
                .run_with_cancellation(execution_date(), cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let report = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run did not terminate after cancellation")
        .unwrap()
        .unwrap();

    assert_eq!(report.state, RunState::Failed);
    let task = report.task("mid_flight").unwrap();
    assert_eq!(task.state, TaskState::Skipped);
    assert_eq!(task.attempts, 1);
}

#[tokio::test]
async fn task_finishing_after_cancellation_reports_its_real_result() {
    let (warehouse, _, registry) = fixture();
    warehouse.set_latency(Duration::from_millis(300));
    warehouse.seed_select("SELECT * FROM staging_events", 5);

    let mut graph = DependencyGraph::new();
    graph
        .add_task(load_fact("in_flight", "songplays", "SELECT * FROM staging_events"))
        .add_task(create_table("follow_up", "never_table"));
    graph.add_dependency("in_flight", "follow_up");

    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        let scheduler = Scheduler::new("in-flight", graph, registry);
        tokio::spawn(async move {
            scheduler
                .run_with_cancellation(execution_date(), cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let report = handle.await.unwrap().unwrap();

    // The in-flight attempt ran to completion; the report shows its real
    // outcome and side effects, never a Skipped that hides the insert.
    assert_eq!(report.state, RunState::Failed);
    let in_flight = report.task("in_flight").unwrap();
    assert_eq!(in_flight.state, TaskState::Success);
    assert_eq!(in_flight.attempts, 1);
    assert!(in_flight.finished_at.is_some());
    assert_eq!(warehouse.rows("songplays"), Some(5));

    assert_eq!(report.task_state("follow_up"), Some(TaskState::Skipped));
    assert!(!warehouse.touched("never_table"));
}

#[tokio::test(start_paused = true)]
async fn retry_waits_do_not_hold_worker_slots() {
    let (warehouse, _, registry) = fixture();
    let mut graph = DependencyGraph::new();
    for table in ["songplays", "users", "artists", "songs"] {
        warehouse.seed_select(format!("SELECT * FROM staging_{table}"), 1);
        warehouse.fail_times(table, WarehouseError::Query("transient".into()), 1);
        graph.add_task(
            load_fact(
                &format!("load_{table}"),
                table,
                &format!("SELECT * FROM staging_{table}"),
            )
            .with_retry(RetryPolicy {
                max_attempts: 2,
                delay: Duration::from_secs(60),
            }),
        );
    }

    let scheduler = Scheduler::new("retry-waits", graph, registry)
        .with_config(SchedulerConfig { max_concurrency: 1 });
    let begin = tokio::time::Instant::now();
    let report = scheduler.run(execution_date()).await.unwrap();

    assert_eq!(report.state, RunState::Succeeded);
    for task in &report.tasks {
        assert_eq!(task.attempts, 2);
    }
    // The four 60s waits overlap on the single slot instead of serializing
    // into four minutes.
    assert!(begin.elapsed() < Duration::from_secs(120));
}

#[tokio::test]
async fn cancellation_during_retry_wait_skips_the_task() {
    let (_, _, registry) = fixture();
    let mut graph = DependencyGraph::new();
    graph.add_task(
        load_fact("stuck", "songplays", "SELECT * FROM missing").with_retry(RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(60),
        }),
    );

    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        let scheduler = Scheduler::new("stuck", graph, registry);
        tokio::spawn(async move {
            scheduler
                .run_with_cancellation(execution_date(), cancel)
                .await
        })
    };

    // Let the first attempt fail and enter its retry wait, then cancel.
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    let report = handle.await.unwrap().unwrap();

    assert_eq!(report.state, RunState::Failed);
    let task = report.task("stuck").unwrap();
    assert_eq!(task.state, TaskState::Skipped);
    assert_eq!(task.attempts, 1);
}
