use std::collections::HashSet;

use crate::error::GraphError;

use super::types::Step;

/// Statically typed collection of the steps making up an integration.
#[derive(Debug, Default, Clone)]
pub struct StepRegistry {
    steps: Vec<Step>,
    ids: HashSet<String>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step: Step) -> Result<&mut Self, GraphError> {
        if !self.ids.insert(step.id.clone()) {
            return Err(GraphError::DuplicateStepId(step.id));
        }
        self.steps.push(step);
        Ok(self)
    }

    pub fn with_step(mut self, step: Step) -> Result<Self, GraphError> {
        self.register(step)?;
        Ok(self)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}
