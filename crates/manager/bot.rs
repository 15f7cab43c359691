use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use routine_actions::{ActionError, BotContext, TemplateRegistry};
use routine_controller::RoutineController;
use routine_interfaces::{AccountPoolHandle, Adb, Cv, Database};
use routine_loader::{CompiledRoutine, ConfigParam, RoutineRegistry};
use routine_sentry::SentryManager;
use routine_variables::VariableStore;

use crate::error::ManagerError;

/// The production [`BotContext`] implementor: one instance per registered
/// bot, cheap to clone since every field is itself `Arc`- or
/// `Arc<RwLock<_>>`-backed.
#[derive(Clone)]
pub struct Bot {
    instance_id: String,
    adb: Arc<dyn Adb>,
    cv: Arc<dyn Cv>,
    variables: VariableStore,
    controller: Arc<RoutineController>,
    sentries: Arc<SentryManager>,
    routine_registry: Arc<RoutineRegistry>,
    template_registry: Arc<TemplateRegistry>,
    account_pool: Option<Arc<dyn AccountPoolHandle>>,
    database: Option<Arc<dyn Database>>,
    delay_between_actions_ms: u64,
    default_template_threshold: f32,
    reference_resolution: (u32, u32),
    max_account_retries: u32,
    execution_id: Option<String>,
    sentry_originated: bool,
}

/// Everything a fresh [`Bot`] needs beyond its instance id; grouped so
/// `Manager::create_bot_with_config` doesn't need an ever-growing argument
/// list.
pub struct BotDeps {
    /// Device-input channel.
    pub adb: Arc<dyn Adb>,
    /// Visual-matching engine.
    pub cv: Arc<dyn Cv>,
    /// Shared routine catalog.
    pub routine_registry: Arc<RoutineRegistry>,
    /// Shared template catalog.
    pub template_registry: Arc<TemplateRegistry>,
    /// Shared account pool, if this deployment uses one.
    pub account_pool: Option<Arc<dyn AccountPoolHandle>>,
    /// Shared database handle, if this deployment uses one.
    pub database: Option<Arc<dyn Database>>,
    /// Per-unit delay for `Delay{count}` steps.
    pub delay_between_actions_ms: u64,
    /// Fallback confidence threshold for template matches.
    pub default_template_threshold: f32,
    /// The screen resolution routine coordinates were authored against.
    pub reference_resolution: (u32, u32),
    /// Fallback checkout retry bound for `InjectNextAccount`.
    pub max_account_retries: u32,
}

impl Bot {
    pub(crate) fn new(instance_id: impl Into<String>, deps: BotDeps) -> Self {
        Self {
            instance_id: instance_id.into(),
            adb: deps.adb,
            cv: deps.cv,
            variables: VariableStore::new(),
            controller: RoutineController::new(),
            sentries: Arc::new(SentryManager::new()),
            routine_registry: deps.routine_registry,
            template_registry: deps.template_registry,
            account_pool: deps.account_pool,
            database: deps.database,
            delay_between_actions_ms: deps.delay_between_actions_ms,
            default_template_threshold: deps.default_template_threshold,
            reference_resolution: deps.reference_resolution,
            max_account_retries: deps.max_account_retries,
            execution_id: None,
            sentry_originated: false,
        }
    }

    /// This bot's stable identifier.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// This bot's cooperative execution gate, for the manager to drive
    /// pause/resume/force-stop from outside a running routine.
    #[must_use]
    pub fn controller(&self) -> &Arc<RoutineController> {
        &self.controller
    }

    /// This bot's sentry table, for the manager to stop at shutdown.
    #[must_use]
    pub(crate) fn sentries(&self) -> &Arc<SentryManager> {
        &self.sentries
    }

    /// A clone of this bot carrying the given top-level execution id,
    /// seeded by `Manager::execute_internal` before each run. Also seeds
    /// the `execution_id` reserved variable so routines can interpolate
    /// `${execution_id}`; the variable store is shared with the original
    /// bot, so this is visible to its sentries too.
    #[must_use]
    pub(crate) fn with_execution_id(&self, execution_id: impl Into<String>) -> Self {
        let execution_id = execution_id.into();
        let mut clone = self.clone();
        clone.variables.seed_reserved([("execution_id".to_string(), execution_id.clone())]);
        clone.execution_id = Some(execution_id);
        clone
    }

    /// A clone of this bot flagged as sentry-originated, handed to
    /// [`SentryManager::register`] so a routine's own declared sentries
    /// tick against the same shared variable store and controller without
    /// the bot needing a self-referential `Arc<Self>`.
    #[must_use]
    pub(crate) fn for_sentry(&self) -> Self {
        let mut clone = self.clone();
        clone.sentry_originated = true;
        clone
    }

    /// Resolves `routine_name`, seeds `overrides` and reserved names into
    /// the variable store, registers its declared sentries, runs its
    /// compiled steps honoring `ignore_errors`, then always unregisters
    /// the sentries it registered — the single code path shared by
    /// top-level execution and `RunRoutine`/sentry-tick sub-execution.
    pub(crate) async fn execute_routine(
        &self,
        routine_name: &str,
        overrides: &IndexMap<String, String>,
    ) -> Result<(), ManagerError> {
        let routine = self.routine_registry.get(routine_name)?;

        self.seed_config(&routine.config, overrides)?;

        let registered = self.register_sentries(&routine)?;
        let result = self.run_steps(&routine).await;
        for name in registered {
            self.sentries.unregister(&name).await;
        }
        result
    }

    fn seed_config(&self, params: &[ConfigParam], overrides: &IndexMap<String, String>) -> Result<(), ManagerError> {
        for param in params {
            let value = overrides
                .get(&param.name)
                .cloned()
                .or_else(|| param.default.clone());
            match value {
                Some(value) => {
                    if param.persist {
                        self.variables.set_persistent(param.name.clone(), value);
                    } else {
                        self.variables.set(param.name.clone(), value);
                    }
                }
                None if param.required => return Err(ManagerError::MissingConfig(param.name.clone())),
                None => {}
            }
        }
        for (name, value) in overrides {
            if !params.iter().any(|p| p.name == *name) {
                self.variables.set(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn run_steps(&self, routine: &Arc<CompiledRoutine>) -> Result<(), ManagerError> {
        for step in &routine.steps {
            match step.execute(self).await {
                Ok(()) => {}
                Err(err) if err.is_stopped_by_controller() => return Err(err.into()),
                Err(err) if routine.ignore_errors => {
                    tracing::warn!(
                        instance = %self.instance_id,
                        step = step.name(),
                        error = %err,
                        "step failed, continuing (ignore_errors)"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn register_sentries(&self, routine: &Arc<CompiledRoutine>) -> Result<Vec<String>, ManagerError> {
        let mut registered = Vec::with_capacity(routine.sentries.len());
        for record in &routine.sentries {
            let target_name = record.routine_name.clone().unwrap_or_else(|| routine.name.clone());
            let target = if record.routine_name.is_some() {
                self.routine_registry.get(&target_name)?
            } else {
                routine.clone()
            };
            self.sentries.register(
                record,
                target,
                self.controller.clone(),
                Arc::new(self.for_sentry()),
            );
            registered.push(target_name);
        }
        Ok(registered)
    }
}

#[async_trait]
impl BotContext for Bot {
    fn variables(&self) -> &VariableStore {
        &self.variables
    }

    fn adb(&self) -> &dyn Adb {
        self.adb.as_ref()
    }

    fn cv(&self) -> &dyn Cv {
        self.cv.as_ref()
    }

    fn controller(&self) -> &RoutineController {
        &self.controller
    }

    fn templates(&self) -> &TemplateRegistry {
        &self.template_registry
    }

    fn sentry_originated(&self) -> bool {
        self.sentry_originated
    }

    fn bot_instance(&self) -> &str {
        &self.instance_id
    }

    fn execution_id(&self) -> Option<&str> {
        self.execution_id.as_deref()
    }

    fn account_pool(&self) -> Option<&dyn AccountPoolHandle> {
        self.account_pool.as_deref()
    }

    fn database(&self) -> Option<&dyn Database> {
        self.database.as_deref()
    }

    fn delay_between_actions_ms(&self) -> u64 {
        self.delay_between_actions_ms
    }

    fn default_template_threshold(&self) -> f32 {
        self.default_template_threshold
    }

    fn reference_resolution(&self) -> (u32, u32) {
        self.reference_resolution
    }

    fn max_account_retries(&self) -> u32 {
        self.max_account_retries
    }

    async fn run_sub_routine(
        &self,
        routine: &str,
        overrides: &IndexMap<String, String>,
    ) -> Result<(), ActionError> {
        self.execute_routine(routine, overrides).await.map_err(|err| match err {
            ManagerError::Action(err) => err,
            other => ActionError::Validation(other.to_string()),
        })
    }
}
