//! Step dependency graph execution
//!
//! ```text
//! Vec<Step>
//!   ↓
//! StepGraph::from_tasks()  → validate(): unknown dependencies, cycles
//!   ↓
//! ExecutionEngine::execute() → ready steps dispatched concurrently,
//!                              each flushed before its dependants start
//!   ↓
//! run_steps() → PartialDatasets + summary.json → ExecutionResult
//! ```

mod context;
mod engine;
mod graph;
mod progress;
mod registry;
pub mod scheduler;
mod summary;
pub mod types;

pub use context::StepContext;
pub use engine::{run_steps, ExecutionEngine};
pub use graph::StepGraph;
pub use progress::ProgressMonitor;
pub use registry::StepRegistry;
pub use summary::{read_summary, write_summary, ExecutionSummary, SummaryMetadata};
pub use types::{
    ExecutionOpts, ExecutionResult, PartialDatasets, Step, StepHandler, StepResult,
    StepResultStatus, TaskLike,
};
