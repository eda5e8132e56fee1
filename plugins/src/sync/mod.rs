mod http_client;
mod retry;
mod service;

pub use http_client::{HttpSynchronizationClient, INSTANCE_NOT_FOUND_CODE};
pub use retry::{FixedDelayRetry, RetryPolicy};
pub use service::{RunError, RunOutcome, SyncOutcome, SyncService, UploadReport};
