use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::SUMMARY_FILE;

use super::types::{PartialDatasets, StepResult};

/// Contents of `summary.json` at the root of a run directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub integration_step_results: Vec<StepResult>,
    pub metadata: SummaryMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMetadata {
    pub partial_datasets: PartialDatasets,
}

impl ExecutionSummary {
    pub fn new(step_results: Vec<StepResult>, partial_datasets: PartialDatasets) -> Self {
        Self {
            integration_step_results: step_results,
            metadata: SummaryMetadata { partial_datasets },
        }
    }
}

pub async fn write_summary(root: &Path, summary: &ExecutionSummary) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| StorageError::io(root, e))?;
    let path = root.join(SUMMARY_FILE);
    let bytes = serde_json::to_vec_pretty(summary)?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| StorageError::io(&path, e))
}

pub async fn read_summary(root: &Path) -> Result<ExecutionSummary, StorageError> {
    let path = root.join(SUMMARY_FILE);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| StorageError::io(&path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| StorageError::CorruptBatch { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StepResultStatus;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn summary_round_trips_with_camel_case_layout() {
        let dir = tempfile::tempdir().unwrap();
        let summary = ExecutionSummary::new(
            vec![StepResult {
                id: "fetch-users".to_string(),
                name: "Fetch users".to_string(),
                depends_on: vec![],
                declared_types: vec!["acme_user".to_string()],
                encountered_types: vec![],
                status: StepResultStatus::Failure,
            }],
            PartialDatasets {
                types: vec!["acme_user".to_string()],
            },
        );

        write_summary(dir.path(), &summary).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(
            raw["metadata"]["partialDatasets"]["types"][0],
            "acme_user"
        );
        assert_eq!(raw["integrationStepResults"][0]["status"], "FAILURE");

        assert_eq!(read_summary(dir.path()).await.unwrap(), summary);
    }

    #[tokio::test]
    async fn missing_summary_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_summary(dir.path()).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
