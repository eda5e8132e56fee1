use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the graph object store and the key tracker.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Duplicate _key detected (_key={key}, first seen with _type={existing_type})")]
    DuplicateKey { key: String, existing_type: String },

    #[error("Record {key} sets reserved field {field} as a property")]
    ReservedProperty { key: String, field: String },

    #[error("Corrupt batch file {path}: {source}")]
    CorruptBatch {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DuplicateKey { .. } | Self::ReservedProperty { .. } => super::exit_code::GRAPH,
            Self::CorruptBatch { .. } | Self::Io { .. } => super::exit_code::IO,
            Self::Serialize(_) | Self::Unavailable(_) => super::exit_code::INTERNAL,
        }
    }
}
