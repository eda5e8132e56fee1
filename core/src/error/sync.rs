use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while synchronizing collected data with the remote job API.
#[derive(Error, Debug)]
pub enum SynchronizationError {
    /// The server reported that the target integration instance does not exist.
    #[error("integration instance not found (code={code}): {message}")]
    InstanceNotFound { code: String, message: String },

    /// Any other structured error reported by the server.
    #[error("synchronization error (code={code}): {message}")]
    Server { code: String, message: String },

    /// Non-success response without a structured error body.
    #[error("synchronization http error status={status} url={url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("synchronization transport error url={url}: {message}")]
    Transport { url: String, message: String },

    #[error("failed to decode synchronization response url={url}: {message}")]
    Decode { url: String, message: String },

    #[error("failed to read batch file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid batch file {path}: {reason}")]
    InvalidBatch { path: PathBuf, reason: String },

    #[error("invalid synchronization transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("timed out waiting for synchronization job {job_id}")]
    Timeout { job_id: String },
}

impl SynchronizationError {
    /// Transport failures, throttling and 5xx responses are worth retrying.
    /// Structured server errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { .. } => super::exit_code::IO,
            _ => super::exit_code::SYNC,
        }
    }
}
