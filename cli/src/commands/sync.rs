//! `collector sync`: upload a finished run and finalize its job
use std::path::Path;
use std::sync::Arc;

use collector_core::config::SyncConfig;
use collector_core::executor::read_summary;
use collector_core::sync::JobSource;
use collector_plugins::sync::{HttpSynchronizationClient, SyncService};

use crate::commands::cli::SyncArgs;
use crate::error::CliError;

pub fn job_source(args: &SyncArgs) -> Result<JobSource, CliError> {
    match (&args.instance_id, &args.scope) {
        (Some(id), None) => Ok(JobSource::IntegrationInstance(id.clone())),
        (None, Some(scope)) => Ok(JobSource::Api {
            scope: scope.clone(),
        }),
        _ => Err(CliError::Command(
            "exactly one of --instance-id or --scope is required".to_string(),
        )),
    }
}

pub async fn handle_sync(args: SyncArgs, cfg: &SyncConfig, root: &Path) -> Result<i32, CliError> {
    let source = job_source(&args)?;

    // The run's summary carries the partial datasets finalize must report.
    let summary = read_summary(root).await?;
    let partial = summary.metadata.partial_datasets;

    let client = Arc::new(
        HttpSynchronizationClient::from_config(cfg)
            .map_err(|e| CliError::Config(format!("invalid sync configuration: {e}")))?,
    );
    let service = SyncService::new(client.clone(), cfg.upload_concurrency);

    let outcome = service.synchronize(&source, root, &partial).await?;
    println!(
        "job {} {} ({} batches, {} entities, {} relationships)",
        outcome.job.id,
        outcome.job.status,
        outcome.upload.batches,
        outcome.upload.entities,
        outcome.upload.relationships
    );

    if args.wait {
        let job = client.wait_for_completion(&outcome.job).await?;
        println!("job {} {}", job.id, job.status);
    }

    if !partial.is_empty() {
        tracing::warn!(types = ?partial.types, "synchronized with partial datasets");
    }
    Ok(0)
}
