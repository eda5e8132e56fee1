//! Synchronization job model shared by every synchronization client.

mod client;
mod phase;
mod types;

pub use client::SynchronizationClient;
pub use phase::SyncPhase;
pub use types::{JobSource, JobStatus, SynchronizationJob};
