use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::Step;

/// Step status state machine.
///
/// Every step starts in `PendingEvaluation` and moves exactly once to one of
/// the terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepResultStatus {
    PendingEvaluation,
    Disabled,
    Success,
    Failure,
    PartialSuccessDueToDependencyFailure,
}

impl StepResultStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::PendingEvaluation)
    }

    /// Statuses whose output must be treated as incomplete downstream.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Failure | Self::PartialSuccessDueToDependencyFailure
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingEvaluation => "PENDING_EVALUATION",
            Self::Disabled => "DISABLED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::PartialSuccessDueToDependencyFailure => {
                "PARTIAL_SUCCESS_DUE_TO_DEPENDENCY_FAILURE"
            }
        }
    }
}

impl fmt::Display for StepResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub declared_types: Vec<String>,
    #[serde(default)]
    pub encountered_types: Vec<String>,
    pub status: StepResultStatus,
}

impl StepResult {
    pub fn pending(step: &Step) -> Self {
        Self {
            id: step.id.clone(),
            name: step.name.clone(),
            depends_on: step.depends_on.clone(),
            declared_types: step.declared_types.clone(),
            encountered_types: Vec::new(),
            status: StepResultStatus::PendingEvaluation,
        }
    }
}

/// Types known to be incomplete because the steps producing them failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDatasets {
    pub types: Vec<String>,
}

impl PartialDatasets {
    /// Declared types of every step that ended in `FAILURE` or
    /// `PARTIAL_SUCCESS_DUE_TO_DEPENDENCY_FAILURE`, sorted and deduplicated.
    pub fn from_results(results: &[StepResult]) -> Self {
        let types: BTreeSet<&String> = results
            .iter()
            .filter(|r| r.status.is_failure())
            .flat_map(|r| r.declared_types.iter())
            .collect();
        Self {
            types: types.into_iter().cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Result of executing a step graph
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// One result per step, in registration order
    pub step_results: Vec<StepResult>,

    pub partial_datasets: PartialDatasets,

    /// Wall-clock time the run started
    pub started_at: DateTime<Utc>,

    /// Total execution duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn get(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.id == step_id)
    }

    pub fn count(&self, status: StepResultStatus) -> usize {
        self.step_results
            .iter()
            .filter(|r| r.status == status)
            .count()
    }
}
