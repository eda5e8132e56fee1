use std::fmt;

use thiserror::Error;

use super::storage::StorageError;

/// Structural errors raised while building the step dependency graph.
///
/// These are detected before any step runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate step ID: {0}")]
    DuplicateStepId(String),

    #[error("Unknown dependency: step '{step_id}' depends on '{missing_dep}'")]
    UnknownDependency { step_id: String, missing_dep: String },

    #[error("Dependency cycle detected: {0}")]
    Cycle(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),
}

/// Error returned by a step handler.
///
/// `Failed` is contained to the step (it resolves to `FAILURE`); `Fatal`
/// stops all further scheduling and rejects the run.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("step handler failed: {0:#}")]
    Failed(anyhow::Error),

    #[error("fatal step error: {0:#}")]
    Fatal(anyhow::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StepError {
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(anyhow::anyhow!(message.to_string()))
    }

    pub fn fatal(message: impl fmt::Display) -> Self {
        Self::Fatal(anyhow::anyhow!(message.to_string()))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(err)
    }
}

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("step '{step_id}' aborted the run: {source}")]
    FatalStep {
        step_id: String,
        #[source]
        source: StepError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to write run summary: {0}")]
    Summary(#[source] StorageError),
}

impl ExecutorError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Graph(_) | Self::FatalStep { .. } => super::exit_code::GRAPH,
            Self::Storage(e) | Self::Summary(e) => e.exit_code(),
        }
    }
}
