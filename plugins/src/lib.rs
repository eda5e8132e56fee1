//! Remote synchronization for collector runs.

pub mod sync;
