use async_trait::async_trait;
use indexmap::IndexMap;
use routine_controller::RoutineController;
use routine_interfaces::{Adb, AccountPoolHandle, Cv, Database};
use routine_variables::VariableStore;

use crate::error::ActionError;
use crate::template::TemplateRegistry;

/// Everything `Validate` may consult: the action's own fields and the
/// surrounding build-time context. Never reads device state.
pub struct BuildContext<'a> {
    templates: &'a TemplateRegistry,
}

impl<'a> BuildContext<'a> {
    /// Creates a build context over a template registry.
    #[must_use]
    pub fn new(templates: &'a TemplateRegistry) -> Self {
        Self { templates }
    }

    /// The template registry, for name-existence checks.
    #[must_use]
    pub fn templates(&self) -> &TemplateRegistry {
        self.templates
    }
}

/// Everything a compiled Step needs at execution time. No `Action` holds a
/// bot reference at build time; the bot is threaded through `execute`.
/// `manager::Bot` is the production implementor; tests implement a minimal
/// local context over the `routine-interfaces` fakes.
#[async_trait]
pub trait BotContext: Send + Sync {
    /// This bot's variable store.
    fn variables(&self) -> &VariableStore;
    /// The device-input channel.
    fn adb(&self) -> &dyn Adb;
    /// The visual-matching engine.
    fn cv(&self) -> &dyn Cv;
    /// This bot's cooperative execution gate.
    fn controller(&self) -> &RoutineController;
    /// The template catalog, for resolving match parameters at execution
    /// time (mirrors the one consulted by `Validate`).
    fn templates(&self) -> &TemplateRegistry;
    /// True if this Step is executing as part of a sentry tick rather than
    /// the bot's main routine; sentry executions bypass the pause gate.
    fn sentry_originated(&self) -> bool;
    /// This bot's stable instance identifier, for logging and metrics.
    fn bot_instance(&self) -> &str;
    /// The enclosing restart-runner's execution id, if one was set.
    fn execution_id(&self) -> Option<&str>;
    /// The shared account pool, if the manager was configured with one.
    fn account_pool(&self) -> Option<&dyn AccountPoolHandle>;
    /// The shared database handle, if the manager was configured with one.
    fn database(&self) -> Option<&dyn Database>;
    /// The bot's configured per-unit delay, consulted by `Delay{count}`
    /// (`count * delay_between_actions_ms`).
    fn delay_between_actions_ms(&self) -> u64;
    /// The bot's configured fallback confidence threshold, used when
    /// neither a `FindImage`-family action nor its target template pin one
    /// down.
    fn default_template_threshold(&self) -> f32;
    /// The screen resolution routine coordinates were authored against;
    /// scaling to a device's actual resolution is the concrete `Adb`
    /// implementor's concern, not this crate's.
    fn reference_resolution(&self) -> (u32, u32);
    /// The bot's configured fallback for `InjectNextAccount`'s checkout
    /// retry bound when a routine doesn't declare its own `maxAttempts`.
    fn max_account_retries(&self) -> u32;
    /// Resolves `routine` against the shared routine registry, seeds
    /// `overrides` into the bot's variable store for declared config
    /// params, and executes it to completion.
    async fn run_sub_routine(
        &self,
        routine: &str,
        overrides: &IndexMap<String, String>,
    ) -> Result<(), ActionError>;
}
