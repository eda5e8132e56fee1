//! Core of the graph collector: step graph scheduling, durable graph object
//! storage and the synchronization job model.

pub mod config;
pub mod error;
pub mod executor;
pub mod storage;
pub mod sync;

pub use error::{ExecutorError, GraphError, StepError, StorageError, SynchronizationError};
pub use executor::{
    run_steps, ExecutionEngine, ExecutionOpts, ExecutionResult, PartialDatasets, Step,
    StepContext, StepGraph, StepHandler, StepRegistry, StepResult, StepResultStatus,
};
pub use storage::{
    Entity, GraphObjectStore, KeyUniquenessTracker, Record, RecordKind, Relationship,
    TypeTracker,
};
