use std::collections::HashSet;

use crate::config::ExecutorConfig;

/// Execution options for one run of the step graph.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOpts {
    /// Enable visual progress bar
    pub progress_bar: bool,

    /// Steps disabled on top of each step's own `disabled` flag
    pub disabled_steps: HashSet<String>,
}

impl ExecutionOpts {
    pub fn from_config(cfg: &ExecutorConfig) -> Self {
        Self {
            progress_bar: cfg.progress_bar,
            disabled_steps: cfg.disabled_steps.iter().cloned().collect(),
        }
    }

    pub fn disable(mut self, step_id: impl Into<String>) -> Self {
        self.disabled_steps.insert(step_id.into());
        self
    }
}
