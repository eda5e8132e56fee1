use async_trait::async_trait;

use crate::error::SynchronizationError;
use crate::executor::PartialDatasets;
use crate::storage::RecordKind;

use super::types::{JobSource, SynchronizationJob};

/// Remote synchronization job API.
///
/// Implementations classify server errors into [`SynchronizationError`];
/// a structured "instance not found" answer must surface as
/// [`SynchronizationError::InstanceNotFound`].
#[async_trait]
pub trait SynchronizationClient: Send + Sync {
    async fn initiate(&self, source: &JobSource) -> Result<SynchronizationJob, SynchronizationError>;

    /// Upload one serialized `{kind: records[]}` batch verbatim.
    async fn upload_batch(
        &self,
        job: &SynchronizationJob,
        kind: RecordKind,
        body: Vec<u8>,
    ) -> Result<(), SynchronizationError>;

    async fn finalize(
        &self,
        job: &SynchronizationJob,
        partial_datasets: &PartialDatasets,
    ) -> Result<SynchronizationJob, SynchronizationError>;

    async fn abort(
        &self,
        job: &SynchronizationJob,
        reason: &str,
    ) -> Result<SynchronizationJob, SynchronizationError>;

    async fn get_job(&self, job_id: &str) -> Result<SynchronizationJob, SynchronizationError>;
}
