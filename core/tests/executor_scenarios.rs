mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use tokio::sync::Barrier;

use collector_core::executor::read_summary;
use collector_core::{
    run_steps, ExecutionOpts, ExecutorError, GraphError, Step, StepContext, StepError,
    StepHandler, StepResultStatus,
};

use common::{init_tracing, new_store, CallLog};

fn recording(log: &CallLog, id: &'static str) -> impl StepHandler + 'static {
    let log = log.clone();
    move |_ctx: StepContext| {
        let log = log.clone();
        async move {
            log.push(id);
            Ok::<(), StepError>(())
        }
    }
}

fn failing(log: &CallLog, id: &'static str, error: fn() -> StepError) -> impl StepHandler + 'static {
    let log = log.clone();
    move |_ctx: StepContext| {
        let log = log.clone();
        async move {
            log.push(id);
            Err(error())
        }
    }
}

#[tokio::test]
async fn failure_cascades_as_partial_success() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();

    let steps = vec![
        Step::new("a", "A", recording(&log, "a")).declared_types(["t_a"]),
        Step::new("b", "B", failing(&log, "b", || StepError::failed("oops")))
            .depends_on(["a"])
            .declared_types(["t_b"]),
        Step::new("c", "C", recording(&log, "c"))
            .depends_on(["b"])
            .declared_types(["t_c"]),
        Step::new("d", "D", recording(&log, "d"))
            .depends_on(["a"])
            .declared_types(["t_d"]),
    ];

    let result = tokio_test::assert_ok!(
        run_steps(steps, new_store(dir.path()), &ExecutionOpts::default()).await
    );

    let entries = log.entries();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0], "a");
    let position = |id: &str| entries.iter().position(|e| e == id).unwrap();
    assert!(position("b") < position("c"));
    assert_eq!(result.get("a").unwrap().status, StepResultStatus::Success);
    assert_eq!(result.get("b").unwrap().status, StepResultStatus::Failure);
    assert_eq!(
        result.get("c").unwrap().status,
        StepResultStatus::PartialSuccessDueToDependencyFailure
    );
    // A branch that does not depend on the failure is untouched.
    assert_eq!(result.get("d").unwrap().status, StepResultStatus::Success);
    assert_eq!(result.partial_datasets.types, vec!["t_b", "t_c"]);

    let summary = read_summary(dir.path()).await.unwrap();
    assert_eq!(summary.integration_step_results, result.step_results);
    assert_eq!(summary.metadata.partial_datasets, result.partial_datasets);
}

#[tokio::test]
async fn independent_leaves_all_start_before_any_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let leaves = 50;
    let barrier = Arc::new(Barrier::new(leaves));
    let started = Arc::new(AtomicUsize::new(0));

    let steps: Vec<Step> = (0..leaves)
        .map(|i| {
            let barrier = barrier.clone();
            let started = started.clone();
            Step::new(format!("leaf-{i}"), format!("Leaf {i}"), move |_ctx: StepContext| {
                let barrier = barrier.clone();
                let started = started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    // Nobody passes until all fifty are running.
                    barrier.wait().await;
                    Ok::<(), StepError>(())
                }
            })
        })
        .collect();

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        run_steps(steps, new_store(dir.path()), &ExecutionOpts::default()),
    )
    .await
    .expect("leaf steps were not executed concurrently")
    .unwrap();

    assert_eq!(started.load(Ordering::SeqCst), leaves);
    assert_eq!(result.count(StepResultStatus::Success), leaves);
}

#[tokio::test]
async fn steps_start_after_their_dependencies_complete() {
    let dir = tempfile::tempdir().unwrap();
    let timings: Arc<Mutex<HashMap<String, (DateTime<Utc>, DateTime<Utc>)>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let timed = |id: &'static str, delay_ms: u64| {
        let timings = timings.clone();
        move |_ctx: StepContext| {
            let timings = timings.clone();
            async move {
                let start = Utc::now();
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let end = Utc::now();
                timings.lock().unwrap().insert(id.to_string(), (start, end));
                Ok::<(), StepError>(())
            }
        }
    };

    // Diamond: a -> {b, c} -> d
    let steps = vec![
        Step::new("a", "A", timed("a", 20)),
        Step::new("b", "B", timed("b", 5)).depends_on(["a"]),
        Step::new("c", "C", timed("c", 30)).depends_on(["a"]),
        Step::new("d", "D", timed("d", 1)).depends_on(["b", "c"]),
    ];

    let result = run_steps(steps, new_store(dir.path()), &ExecutionOpts::default())
        .await
        .unwrap();
    assert_eq!(result.count(StepResultStatus::Success), 4);

    let timings = timings.lock().unwrap();
    let start = |id: &str| timings[id].0;
    let end = |id: &str| timings[id].1;
    assert!(start("b") >= end("a"));
    assert!(start("c") >= end("a"));
    assert!(start("d") >= end("b"));
    assert!(start("d") >= end("c"));
}

#[tokio::test]
async fn disabling_a_step_disables_its_dependants_only() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();

    let steps = vec![
        Step::new("x", "X", recording(&log, "x")).declared_types(["t_x"]),
        Step::new("y", "Y", recording(&log, "y"))
            .depends_on(["x"])
            .declared_types(["t_y"]),
        Step::new("z", "Z", recording(&log, "z")).depends_on(["y"]),
        Step::new("other", "Other", recording(&log, "other")),
    ];

    let opts = ExecutionOpts::default().disable("x");
    let result = run_steps(steps, new_store(dir.path()), &opts).await.unwrap();

    assert_eq!(log.entries(), vec!["other"]);
    for id in ["x", "y", "z"] {
        assert_eq!(result.get(id).unwrap().status, StepResultStatus::Disabled);
    }
    assert_eq!(result.get("other").unwrap().status, StepResultStatus::Success);
    assert!(result.partial_datasets.is_empty());
}

#[tokio::test]
async fn fatal_error_rejects_the_run_without_waiting_for_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();

    let slow_sibling = {
        let log = log.clone();
        move |_ctx: StepContext| {
            let log = log.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                log.push("sibling");
                Ok::<(), StepError>(())
            }
        }
    };

    let steps = vec![
        Step::new("fatal", "Fatal", failing(&log, "fatal", || StepError::fatal("boom"))),
        Step::new("after", "After", recording(&log, "after")).depends_on(["fatal"]),
        Step::new("sibling", "Sibling", slow_sibling),
    ];

    let rejected = tokio::time::timeout(
        Duration::from_millis(500),
        run_steps(steps, new_store(dir.path()), &ExecutionOpts::default()),
    )
    .await
    .expect("fatal error waited for the running sibling");
    let err = tokio_test::assert_err!(rejected);

    match err {
        ExecutorError::FatalStep { step_id, source } => {
            assert_eq!(step_id, "fatal");
            assert!(source.is_fatal());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(log.entries(), vec!["fatal"]);
    assert!(read_summary(dir.path()).await.is_err());

    // The sibling is detached, not cancelled.
    tokio::time::timeout(Duration::from_secs(5), async {
        while !log.entries().contains(&"sibling".to_string()) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("running sibling was cancelled");
    assert!(!log.entries().contains(&"after".to_string()));
}

#[tokio::test]
async fn graph_errors_are_raised_before_any_step_runs() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();

    let cyclic = vec![
        Step::new("a", "A", recording(&log, "a")).depends_on(["b"]),
        Step::new("b", "B", recording(&log, "b")).depends_on(["a"]),
        Step::new("c", "C", recording(&log, "c")),
    ];
    let err = run_steps(cyclic, new_store(dir.path()), &ExecutionOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Graph(GraphError::Cycle(_))));

    let dangling = vec![Step::new("a", "A", recording(&log, "a")).depends_on(["ghost"])];
    let err = run_steps(dangling, new_store(dir.path()), &ExecutionOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExecutorError::Graph(GraphError::UnknownDependency { ref missing_dep, .. })
            if missing_dep == "ghost"
    ));

    assert!(log.entries().is_empty());
}
