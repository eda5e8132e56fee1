use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-side status of a synchronization job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    AwaitingUploads,
    FinalizePending,
    FinalizingEntities,
    FinalizingRelationships,
    Finished,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// No further state change will happen on the server.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingUploads => "AWAITING_UPLOADS",
            Self::FinalizePending => "FINALIZE_PENDING",
            Self::FinalizingEntities => "FINALIZING_ENTITIES",
            Self::FinalizingRelationships => "FINALIZING_RELATIONSHIPS",
            Self::Finished => "FINISHED",
            Self::Aborted => "ABORTED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote synchronization job as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationJob {
    pub id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub num_entities_uploaded: u64,
    #[serde(default)]
    pub num_relationships_uploaded: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_on: Option<i64>,
}

/// Who a job synchronizes on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    /// Data collected for a configured integration instance.
    IntegrationInstance(String),
    /// Data pushed through the API under a caller-chosen scope.
    Api { scope: String },
}

impl JobSource {
    /// Request body for job creation.
    pub fn to_request_body(&self) -> serde_json::Value {
        match self {
            Self::IntegrationInstance(id) => serde_json::json!({
                "source": "integration-managed",
                "integrationInstanceId": id,
            }),
            Self::Api { scope } => serde_json::json!({
                "source": "api",
                "scope": scope,
            }),
        }
    }
}
