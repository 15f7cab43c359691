use std::sync::Arc;

use async_trait::async_trait;

use crate::context::BotContext;
use crate::error::ActionError;

/// The executable body of a compiled [`Step`]. Each `Action` variant's
/// `build` pushes one implementor onto the builder's step list; composite
/// actions capture their already-built nested Steps by value, never
/// rebuilding them on a later iteration.
#[async_trait]
pub trait StepExec: Send + Sync {
    /// Runs this step's body against the given bot.
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError>;
}

/// A single compiled, executable unit bound to a bot at execution time.
///
/// `issue` carries a validation error that was deferred to first execution
/// (an Action built anyway despite a nested validation failure, for
/// diagnostics); if set, `execute` reports it instead of running `exec`.
#[derive(Clone)]
pub struct Step {
    name: String,
    exec: Arc<dyn StepExec>,
    issue: Option<ActionError>,
}

impl Step {
    /// Creates a step with no deferred issue.
    pub fn new(name: impl Into<String>, exec: Arc<dyn StepExec>) -> Self {
        Self {
            name: name.into(),
            exec,
            issue: None,
        }
    }

    /// Attaches a deferred validation issue, reported on first execution.
    #[must_use]
    pub fn with_issue(mut self, issue: ActionError) -> Self {
        self.issue = Some(issue);
        self
    }

    /// This step's diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The deferred validation issue, if any.
    #[must_use]
    pub fn issue(&self) -> Option<&ActionError> {
        self.issue.as_ref()
    }

    /// Runs this step: reports a deferred issue if present, else executes
    /// the compiled body.
    pub async fn execute(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        if let Some(issue) = &self.issue {
            return Err(ActionError::StepIssue {
                step: self.name.clone(),
                cause: issue.to_string(),
            });
        }
        self.exec.run(bot).await
    }
}
