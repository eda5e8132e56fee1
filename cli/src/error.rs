use collector_core::error::{exit_code, ExecutorError, StorageError, SynchronizationError};
use collector_plugins::sync::RunError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sync(#[from] SynchronizationError),

    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<RunError> for CliError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Executor(e) => Self::Executor(e),
            RunError::Sync(e) => Self::Sync(e),
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_code::CONFIG,
            Self::Logging(_) => exit_code::IO,
            Self::Executor(e) => e.exit_code(),
            Self::Storage(e) => e.exit_code(),
            Self::Sync(e) => e.exit_code(),
            Self::Command(_) | Self::Anyhow(_) => exit_code::INTERNAL,
        }
    }
}
