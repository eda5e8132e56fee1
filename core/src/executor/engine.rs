use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::{ExecutorError, GraphError, StepError};
use crate::storage::{GraphObjectStore, TypeDiff, TypeTracker};

use super::context::StepContext;
use super::graph::StepGraph;
use super::progress::ProgressMonitor;
use super::summary::{write_summary, ExecutionSummary};
use super::types::{
    ExecutionOpts, ExecutionResult, PartialDatasets, Step, StepResult, StepResultStatus,
};

/// What a finished step hands back to the scheduling loop.
struct StepOutcome {
    step_id: String,
    encountered_types: Vec<String>,
    type_diff: TypeDiff,
    duration_ms: u64,
    result: Result<(), StepError>,
}

impl StepOutcome {
    /// Outcome for a step whose task ended without reporting back.
    fn lost(step_id: String, err: &dyn std::fmt::Display) -> Self {
        Self {
            step_id,
            encountered_types: Vec::new(),
            type_diff: TypeDiff::default(),
            duration_ms: 0,
            result: Err(StepError::failed(format!("step task ended unexpectedly: {err}"))),
        }
    }
}

/// Execution engine for step dependency graphs
///
/// Every ready step runs concurrently with no cap; a step becomes ready once
/// each of its dependencies has a terminal status and has flushed its output.
pub struct ExecutionEngine {
    store: Arc<GraphObjectStore>,
    opts: ExecutionOpts,
}

impl ExecutionEngine {
    pub fn new(store: Arc<GraphObjectStore>, opts: ExecutionOpts) -> Self {
        Self { store, opts }
    }

    pub fn store(&self) -> &Arc<GraphObjectStore> {
        &self.store
    }

    /// Steps that never run: explicitly disabled ones and everything
    /// downstream of them.
    fn disabled_steps(&self, graph: &StepGraph<Step>) -> Result<HashSet<String>, GraphError> {
        let mut disabled = HashSet::new();
        for id in graph.overall_order()? {
            let Some(step) = graph.get(&id) else {
                continue;
            };
            let explicit = step.disabled || self.opts.disabled_steps.contains(&id);
            let upstream = graph
                .direct_dependencies_of(&id)
                .iter()
                .any(|dep| disabled.contains(dep));
            if explicit || upstream {
                disabled.insert(id);
            }
        }
        Ok(disabled)
    }

    /// Execute every enabled step of a validated graph.
    ///
    /// Returns one result per step in insertion order. Each step runs as its
    /// own task. A fatal step error rejects the run with
    /// [`ExecutorError::FatalStep`] at once; steps already running are left
    /// to finish in the background and their results are discarded.
    pub async fn execute(&self, graph: &StepGraph<Step>) -> Result<Vec<StepResult>, ExecutorError> {
        let mut working = graph.clone();
        let disabled = self.disabled_steps(graph)?;

        let mut results: HashMap<String, StepResult> = graph
            .nodes
            .values()
            .map(|step| (step.id.clone(), StepResult::pending(step)))
            .collect();
        for id in &disabled {
            if let Some(result) = results.get_mut(id) {
                result.status = StepResultStatus::Disabled;
            }
            info!(target: "collector.executor", step_id = %id, "Step disabled");
        }

        let progress = ProgressMonitor::new(graph.len(), self.opts.progress_bar);
        progress.skip(disabled.len());

        let mut in_flight = FuturesUnordered::new();

        loop {
            for step in take_ready(&mut working, graph, &disabled, &results) {
                progress.step_started(&step.id);
                let step_id = step.id.clone();
                let handle = tokio::spawn(run_step(self.store.clone(), step));
                in_flight.push(handle.map(move |joined| (step_id, joined)));
            }

            let Some((step_id, joined)) = in_flight.next().await else {
                break;
            };
            let outcome = joined.unwrap_or_else(|err| StepOutcome::lost(step_id, &err));

            let step_id = outcome.step_id.clone();
            let duration_ms = outcome.duration_ms;
            match resolve_outcome(graph, &mut results, outcome) {
                Ok(status) => progress.step_finished(&step_id, status, duration_ms),
                Err(err) => {
                    progress.step_finished(&step_id, StepResultStatus::Failure, duration_ms);
                    progress.finish(failed_count(&results));
                    // Dropping the join handles detaches the running steps.
                    warn!(
                        target: "collector.executor",
                        step_id = %step_id,
                        detached = in_flight.len(),
                        "Fatal step error; rejecting the run without waiting for running steps"
                    );
                    return Err(err);
                }
            }
        }

        progress.finish(failed_count(&results));

        let mut ordered = Vec::with_capacity(results.len());
        for id in graph.node_ids() {
            if let Some(result) = results.remove(id) {
                ordered.push(result);
            }
        }
        Ok(ordered)
    }
}

async fn run_step(store: Arc<GraphObjectStore>, step: Step) -> StepOutcome {
    let started = Instant::now();
    let type_tracker = Arc::new(TypeTracker::new());
    let ctx = StepContext::new(step.id.as_str(), store.clone(), type_tracker.clone());

    info!(target: "collector.executor", step_id = %step.id, name = %step.name, "Starting step");

    let mut result = match AssertUnwindSafe(step.handler.execute(ctx))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(StepError::failed(format!(
            "step handler panicked: {}",
            panic_message(panic.as_ref())
        ))),
    };

    let is_fatal = matches!(&result, Err(err) if err.is_fatal());
    if !is_fatal {
        if let Err(err) = store.flush(Some(&step.id)).await {
            error!(
                target: "collector.executor",
                step_id = %step.id,
                error = %err,
                "Failed to flush step output"
            );
            if result.is_ok() {
                result = Err(StepError::Storage(err));
            }
        }
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    debug!(target: "collector.executor", step_id = %step.id, duration_ms, "Step finished");

    StepOutcome {
        type_diff: type_tracker.diff(&step.declared_types),
        encountered_types: type_tracker.encountered(),
        step_id: step.id,
        duration_ms,
        result,
    }
}

/// Remove and return every step whose dependencies all reached a terminal
/// status. Removal guarantees each step is dispatched once.
fn take_ready(
    working: &mut StepGraph<Step>,
    canonical: &StepGraph<Step>,
    disabled: &HashSet<String>,
    results: &HashMap<String, StepResult>,
) -> Vec<Step> {
    let ready: Vec<String> = working
        .node_ids()
        .filter(|id| !disabled.contains(*id))
        .filter(|id| {
            canonical
                .direct_dependencies_of(id)
                .iter()
                .all(|dep| results.get(dep).is_some_and(|r| r.status.is_terminal()))
        })
        .cloned()
        .collect();

    ready
        .into_iter()
        .filter_map(|id| working.remove_node(&id))
        .collect()
}

fn failed_count(results: &HashMap<String, StepResult>) -> usize {
    results.values().filter(|r| r.status.is_failure()).count()
}

fn resolve_outcome(
    graph: &StepGraph<Step>,
    results: &mut HashMap<String, StepResult>,
    outcome: StepOutcome,
) -> Result<StepResultStatus, ExecutorError> {
    let StepOutcome {
        step_id,
        encountered_types,
        type_diff,
        result,
        ..
    } = outcome;

    let status = match result {
        Ok(()) => {
            let upstream_failed = graph
                .direct_dependencies_of(&step_id)
                .iter()
                .any(|dep| results.get(dep).is_some_and(|r| r.status.is_failure()));
            if upstream_failed {
                StepResultStatus::PartialSuccessDueToDependencyFailure
            } else {
                if !type_diff.is_empty() {
                    warn!(
                        target: "collector.executor",
                        step_id = %step_id,
                        undeclared = ?type_diff.undeclared,
                        unencountered = ?type_diff.unencountered,
                        "Declared types do not match encountered types"
                    );
                }
                StepResultStatus::Success
            }
        }
        Err(err) if err.is_fatal() => {
            error!(target: "collector.executor", step_id = %step_id, error = %err, "Step failed fatally");
            if let Some(entry) = results.get_mut(&step_id) {
                entry.status = StepResultStatus::Failure;
                entry.encountered_types = encountered_types;
            }
            return Err(ExecutorError::FatalStep {
                step_id,
                source: err,
            });
        }
        Err(err) => {
            error!(target: "collector.executor", step_id = %step_id, error = %err, "Step failed");
            StepResultStatus::Failure
        }
    };

    if let Some(entry) = results.get_mut(&step_id) {
        entry.status = status;
        entry.encountered_types = encountered_types;
    }
    Ok(status)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Build the graph, execute it, flush, and write `summary.json`.
pub async fn run_steps(
    steps: Vec<Step>,
    store: Arc<GraphObjectStore>,
    opts: &ExecutionOpts,
) -> Result<ExecutionResult, ExecutorError> {
    let started_at = Utc::now();
    let start = Instant::now();

    let graph = StepGraph::from_tasks(&steps)?;
    info!(
        target: "collector.executor",
        steps = graph.len(),
        root = %store.root().display(),
        "Executing step graph"
    );

    let engine = ExecutionEngine::new(store.clone(), opts.clone());
    let step_results = engine.execute(&graph).await?;

    store.flush(None).await?;

    let partial_datasets = PartialDatasets::from_results(&step_results);
    if !partial_datasets.is_empty() {
        warn!(
            target: "collector.executor",
            types = ?partial_datasets.types,
            "Some types are partial because the steps producing them did not succeed"
        );
    }

    let summary = ExecutionSummary::new(step_results.clone(), partial_datasets.clone());
    write_summary(store.root(), &summary)
        .await
        .map_err(ExecutorError::Summary)?;

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(target: "collector.executor", duration_ms, "Step graph finished");

    Ok(ExecutionResult {
        step_results,
        partial_datasets,
        started_at,
        duration_ms,
    })
}
