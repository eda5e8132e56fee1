use std::path::{Path, PathBuf};
use std::sync::Arc;

use collector_core::error::{ExecutorError, SynchronizationError};
use collector_core::executor::scheduler::execute_bounded;
use collector_core::executor::{run_steps, ExecutionOpts, ExecutionResult, PartialDatasets, Step};
use collector_core::storage::{BatchFile, GraphObjectStore, RecordKind, GRAPH_DIR};
use collector_core::sync::{JobSource, SyncPhase, SynchronizationClient, SynchronizationJob};
use thiserror::Error;

/// Counts of what one upload pass sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub batches: usize,
    pub entities: usize,
    pub relationships: usize,
}

impl UploadReport {
    fn record(&mut self, kind: RecordKind, records: usize) {
        self.batches += 1;
        match kind {
            RecordKind::Entities => self.entities += records,
            RecordKind::Relationships => self.relationships += records,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub job: SynchronizationJob,
    pub phase: SyncPhase,
    pub upload: UploadReport,
}

/// A run that executed its steps and synchronized their output.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub execution: ExecutionResult,
    pub sync: SyncOutcome,
}

/// Failure of [`SyncService::run_and_synchronize`]. The job, when one was
/// created, has already been aborted.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Sync(#[from] SynchronizationError),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Executor(e) => e.exit_code(),
            Self::Sync(e) => e.exit_code(),
        }
    }
}

/// Uploads the durable output of a run directory through a
/// [`SynchronizationClient`], then finalizes or aborts the job.
pub struct SyncService {
    client: Arc<dyn SynchronizationClient>,
    upload_concurrency: usize,
}

impl SyncService {
    pub fn new(client: Arc<dyn SynchronizationClient>, upload_concurrency: usize) -> Self {
        Self {
            client,
            upload_concurrency: upload_concurrency.max(1),
        }
    }

    /// Every batch file under `<root>/graph`, sorted.
    pub fn discover_batches(root: &Path) -> Result<Vec<PathBuf>, SynchronizationError> {
        let graph_dir = root.join(GRAPH_DIR);
        let pattern = format!(
            "{}/**/*.json",
            glob::Pattern::escape(&graph_dir.to_string_lossy())
        );
        let entries = glob::glob(&pattern).map_err(|err| SynchronizationError::InvalidBatch {
            path: graph_dir.clone(),
            reason: err.to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => paths.push(path),
                Ok(_) => {}
                Err(err) => {
                    let path = err.path().to_path_buf();
                    return Err(SynchronizationError::Io {
                        path,
                        source: err.into_error(),
                    });
                }
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn upload_file(
        &self,
        job: &SynchronizationJob,
        path: &Path,
    ) -> Result<(RecordKind, usize), SynchronizationError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| SynchronizationError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let batch: BatchFile =
            serde_json::from_slice(&bytes).map_err(|err| SynchronizationError::InvalidBatch {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        let kind = batch.kind().ok_or_else(|| SynchronizationError::InvalidBatch {
            path: path.to_path_buf(),
            reason: "expected exactly one of 'entities' or 'relationships'".to_string(),
        })?;
        let records = batch.into_records(kind).len();

        tracing::debug!(
            target: "collector.sync",
            job_id = %job.id,
            path = %path.display(),
            kind = %kind,
            records,
            "uploading batch"
        );
        self.client.upload_batch(job, kind, bytes).await?;
        Ok((kind, records))
    }

    /// Upload every durable batch of `root`, one request per batch file.
    ///
    /// All uploads are attempted; the first failure is returned.
    pub async fn upload(
        &self,
        job: &SynchronizationJob,
        root: &Path,
    ) -> Result<UploadReport, SynchronizationError> {
        let paths = Self::discover_batches(root)?;
        tracing::info!(
            target: "collector.sync",
            job_id = %job.id,
            batches = paths.len(),
            "uploading collected data"
        );

        let outcomes = execute_bounded(paths, self.upload_concurrency, |path| async move {
            self.upload_file(job, &path).await
        })
        .await;

        let mut report = UploadReport::default();
        let mut first_err = None;
        for outcome in outcomes {
            match outcome {
                Ok((kind, records)) => report.record(kind, records),
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    pub async fn abort(
        &self,
        job: &SynchronizationJob,
        reason: &str,
    ) -> Result<SynchronizationJob, SynchronizationError> {
        tracing::warn!(target: "collector.sync", job_id = %job.id, reason = %reason, "aborting synchronization job");
        self.client.abort(job, reason).await
    }

    async fn initiate(
        &self,
        source: &JobSource,
        phase: &mut SyncPhase,
    ) -> Result<SynchronizationJob, SynchronizationError> {
        let job = self.client.initiate(source).await?;
        phase.advance(SyncPhase::JobCreated)?;
        tracing::info!(target: "collector.sync", job_id = %job.id, status = %job.status, "synchronization job created");
        Ok(job)
    }

    /// Create a job, upload `root`, then finalize with `partial_datasets`.
    ///
    /// Any failure after the job exists aborts it before the error is
    /// returned.
    pub async fn synchronize(
        &self,
        source: &JobSource,
        root: &Path,
        partial_datasets: &PartialDatasets,
    ) -> Result<SyncOutcome, SynchronizationError> {
        let mut phase = SyncPhase::default();
        let job = self.initiate(source, &mut phase).await?;
        self.upload_and_finalize(job, phase, root, partial_datasets)
            .await
    }

    /// Create a job, execute `steps` into `store`, then upload and finalize.
    ///
    /// A failed execution aborts the job with the executor error as the
    /// reason, and that error is returned.
    pub async fn run_and_synchronize(
        &self,
        steps: Vec<Step>,
        store: Arc<GraphObjectStore>,
        opts: &ExecutionOpts,
        source: &JobSource,
    ) -> Result<RunOutcome, RunError> {
        let mut phase = SyncPhase::default();
        let job = self.initiate(source, &mut phase).await?;

        let execution = match run_steps(steps, store.clone(), opts).await {
            Ok(execution) => execution,
            Err(err) => {
                self.abort_after_error(&job, &mut phase, &err.to_string())
                    .await;
                return Err(err.into());
            }
        };

        let sync = self
            .upload_and_finalize(job, phase, store.root(), &execution.partial_datasets)
            .await?;
        Ok(RunOutcome { execution, sync })
    }

    async fn upload_and_finalize(
        &self,
        job: SynchronizationJob,
        mut phase: SyncPhase,
        root: &Path,
        partial_datasets: &PartialDatasets,
    ) -> Result<SyncOutcome, SynchronizationError> {
        phase.advance(SyncPhase::Uploading)?;
        let upload = match self.upload(&job, root).await {
            Ok(report) => report,
            Err(err) => {
                self.abort_after_error(&job, &mut phase, &err.to_string())
                    .await;
                return Err(err);
            }
        };

        let job = match self.client.finalize(&job, partial_datasets).await {
            Ok(job) => job,
            Err(err) => {
                self.abort_after_error(&job, &mut phase, &err.to_string())
                    .await;
                return Err(err);
            }
        };
        phase.advance(SyncPhase::Finalized)?;

        tracing::info!(
            target: "collector.sync",
            job_id = %job.id,
            status = %job.status,
            batches = upload.batches,
            entities = upload.entities,
            relationships = upload.relationships,
            partial_types = partial_datasets.types.len(),
            "synchronization finalized"
        );

        Ok(SyncOutcome { job, phase, upload })
    }

    async fn abort_after_error(
        &self,
        job: &SynchronizationJob,
        phase: &mut SyncPhase,
        reason: &str,
    ) {
        if let Err(err) = self.abort(job, reason).await {
            tracing::error!(
                target: "collector.sync",
                job_id = %job.id,
                error = %err,
                "failed to abort synchronization job"
            );
            return;
        }
        if let Err(err) = phase.advance(SyncPhase::Aborted) {
            tracing::error!(target: "collector.sync", error = %err, "unexpected phase");
        }
    }
}
