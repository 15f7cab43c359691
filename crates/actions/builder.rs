use std::sync::Arc;

use crate::error::ActionError;
use crate::step::{Step, StepExec};
use crate::template::TemplateRegistry;

/// Accumulates compiled [`Step`]s for one Action tree. Composite actions
/// open a disposable sub-builder over the same template registry to
/// compile their nested children once, then capture the resulting step
/// list by value — nested steps are never rebuilt on a later loop
/// iteration.
pub struct StepBuilder<'a> {
    steps: Vec<Step>,
    templates: &'a TemplateRegistry,
    ignore_errors: bool,
}

impl<'a> StepBuilder<'a> {
    /// Creates an empty builder over the given template registry.
    #[must_use]
    pub fn new(templates: &'a TemplateRegistry) -> Self {
        Self {
            steps: Vec::new(),
            templates,
            ignore_errors: false,
        }
    }

    /// The template registry steps resolve match parameters against.
    #[must_use]
    pub fn templates(&self) -> &TemplateRegistry {
        self.templates
    }

    /// Whether the top-level executor should swallow a Step's error and
    /// continue, per the loader's `ignoreErrors` flag.
    #[must_use]
    pub fn ignore_errors(&self) -> bool {
        self.ignore_errors
    }

    /// Sets the `ignoreErrors` flag for this builder.
    pub fn set_ignore_errors(&mut self, ignore: bool) {
        self.ignore_errors = ignore;
    }

    /// Appends a compiled step.
    pub fn push(&mut self, name: impl Into<String>, exec: Arc<dyn StepExec>) {
        self.steps.push(Step::new(name, exec));
    }

    /// Appends a step wrapping a deferred build-time issue, reported on
    /// first execution rather than aborting the whole build.
    pub fn push_with_issue(
        &mut self,
        name: impl Into<String>,
        exec: Arc<dyn StepExec>,
        issue: ActionError,
    ) {
        self.steps.push(Step::new(name, exec).with_issue(issue));
    }

    /// Attaches step-level metadata (timeout/max_attempts/retry_delay) to
    /// the last-appended Step, per the loader's metadata-wrapping rule.
    pub fn wrap_last_with_metadata(&mut self, metadata: StepMetadata) {
        if let Some(last) = self.steps.pop() {
            let wrapped = Arc::new(MetadataStep {
                inner: last,
                metadata,
            });
            self.steps.push(Step::new(wrapped.inner.name().to_string(), wrapped));
        }
    }

    /// Compiles a nested action list into its own captured step list,
    /// using a disposable sub-builder over the same template registry.
    pub fn build_nested<F>(&self, mut build_one: F) -> Result<Vec<Step>, ActionError>
    where
        F: FnMut(&mut StepBuilder<'a>) -> Result<(), ActionError>,
    {
        let mut sub_builder = StepBuilder::new(self.templates);
        build_one(&mut sub_builder)?;
        Ok(sub_builder.into_steps())
    }

    /// Consumes the builder, returning its compiled step list.
    #[must_use]
    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// The compiled step list so far.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Step-level metadata attached to any action in its source-level
/// representation: `timeout`, `max_attempts`, `retry_delay`.
#[derive(Debug, Clone, Copy)]
pub struct StepMetadata {
    /// Maximum time allowed for one execution attempt, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Maximum number of attempts before giving up (0 = unbounded).
    pub max_attempts: u32,
    /// Delay between retry attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for StepMetadata {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            max_attempts: 1,
            retry_delay_ms: 0,
        }
    }
}

struct MetadataStep {
    inner: Step,
    metadata: StepMetadata,
}

#[async_trait::async_trait]
impl StepExec for MetadataStep {
    async fn run(&self, bot: &dyn crate::context::BotContext) -> Result<(), ActionError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = match self.metadata.timeout_ms {
                Some(ms) => {
                    let duration = std::time::Duration::from_millis(ms);
                    match tokio::time::timeout(duration, self.inner.execute(bot)).await {
                        Ok(result) => result,
                        Err(_) => Err(ActionError::Timeout(self.inner.name().to_string())),
                    }
                }
                None => self.inner.execute(bot).await,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(err) if err.is_break() || err.is_stopped_by_controller() => return Err(err),
                Err(err) => {
                    let bounded = self.metadata.max_attempts > 0;
                    if bounded && attempt >= self.metadata.max_attempts {
                        return Err(err);
                    }
                    if self.metadata.retry_delay_ms > 0 {
                        tokio::time::sleep(std::time::Duration::from_millis(
                            self.metadata.retry_delay_ms,
                        ))
                        .await;
                    }
                }
            }
        }
    }
}
