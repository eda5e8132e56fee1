//! Run an integration's steps and synchronize their output in one go.
//!
//! Integration binaries call [`run_integration`] with their own steps; the
//! store, executor options and API client all come from [`AppConfig`].
use std::sync::Arc;

use collector_core::config::AppConfig;
use collector_core::executor::{ExecutionOpts, Step};
use collector_core::storage::{GraphObjectStore, KeyUniquenessTracker};
use collector_core::sync::JobSource;
use collector_plugins::sync::{HttpSynchronizationClient, RunOutcome, SyncService};

use crate::error::CliError;

pub async fn run_integration(
    steps: Vec<Step>,
    cfg: &AppConfig,
    source: &JobSource,
) -> Result<RunOutcome, CliError> {
    let store = Arc::new(GraphObjectStore::from_config(
        &cfg.storage,
        Arc::new(KeyUniquenessTracker::new()),
    ));
    let opts = ExecutionOpts::from_config(&cfg.executor);
    let client = HttpSynchronizationClient::from_config(&cfg.sync)
        .map_err(|e| CliError::Config(format!("invalid sync configuration: {e}")))?;
    let service = SyncService::new(Arc::new(client), cfg.sync.upload_concurrency);

    let outcome = service
        .run_and_synchronize(steps, store, &opts, source)
        .await?;
    tracing::info!(
        job_id = %outcome.sync.job.id,
        steps = outcome.execution.step_results.len(),
        batches = outcome.sync.upload.batches,
        "integration run synchronized"
    );
    Ok(outcome)
}
