pub mod executor;
pub mod storage;
pub mod sync;

pub use executor::{ExecutorError, GraphError, StepError};
pub use storage::StorageError;
pub use sync::SynchronizationError;

/// Process exit codes surfaced by the CLI.
///
/// 0: success
/// 11: config error
/// 20: storage / IO error
/// 30: graph structure or fatal step error
/// 40: synchronization error
/// 50: internal/uncategorized
pub mod exit_code {
    pub const CONFIG: i32 = 11;
    pub const IO: i32 = 20;
    pub const GRAPH: i32 = 30;
    pub const SYNC: i32 = 40;
    pub const INTERNAL: i32 = 50;
}
