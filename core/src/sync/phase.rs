use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SynchronizationError;

/// Client-side progress of one synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    #[default]
    NotStarted,
    JobCreated,
    Uploading,
    Finalized,
    Aborted,
}

impl SyncPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Aborted)
    }

    pub fn can_transition_to(self, to: SyncPhase) -> bool {
        match (self, to) {
            (Self::NotStarted, Self::JobCreated) => true,
            (Self::JobCreated, Self::Uploading) => true,
            (Self::Uploading, Self::Finalized) => true,
            (Self::JobCreated | Self::Uploading, Self::Aborted) => true,
            _ => false,
        }
    }

    /// Move to `to`, rejecting anything outside the allowed transitions.
    pub fn advance(&mut self, to: SyncPhase) -> Result<(), SynchronizationError> {
        if !self.can_transition_to(to) {
            return Err(SynchronizationError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        *self = to;
        Ok(())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::JobCreated => "JOB_CREATED",
            Self::Uploading => "UPLOADING",
            Self::Finalized => "FINALIZED",
            Self::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
