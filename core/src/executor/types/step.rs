use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StepError;
use crate::executor::context::StepContext;

/// Common node interface for dependency graph handling.
pub trait TaskLike: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

/// Work performed by a step.
///
/// Any `Fn(StepContext) -> impl Future<Output = Result<(), StepError>>`
/// closure is a handler.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, ctx: StepContext) -> Result<(), StepError>;
}

#[async_trait]
impl<F, Fut> StepHandler for F
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StepError>> + Send + 'static,
{
    async fn execute(&self, ctx: StepContext) -> Result<(), StepError> {
        (self)(ctx).await
    }
}

/// A unit of work with declared dependencies and produced types.
///
/// Immutable once scheduling begins.
#[derive(Clone)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub depends_on: Vec<String>,
    pub declared_types: Vec<String>,
    pub disabled: bool,
    pub handler: Arc<dyn StepHandler>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        handler: impl StepHandler + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            depends_on: Vec::new(),
            declared_types: Vec::new(),
            disabled: false,
            handler: Arc::new(handler),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn declared_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("declared_types", &self.declared_types)
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

impl TaskLike for Step {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}
