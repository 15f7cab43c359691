//! A minimal [`crate::context::BotContext`] implementation over the
//! `routine-interfaces` fakes, shared by this crate's own test modules.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use routine_controller::RoutineController;
use routine_interfaces::{Adb, AccountPoolHandle, Cv, Database, FakeAdb, FakeCv};
use routine_variables::VariableStore;

use crate::context::BotContext;
use crate::error::ActionError;
use crate::template::TemplateRegistry;

/// A bot context built from fakes, for use by this crate's own tests.
pub struct TestBotContext {
    variables: VariableStore,
    adb: Arc<dyn Adb>,
    cv: Arc<dyn Cv>,
    controller: Arc<RoutineController>,
    templates: TemplateRegistry,
    sentry_originated: bool,
    delay_between_actions_ms: u64,
    default_template_threshold: f32,
    reference_resolution: (u32, u32),
    max_account_retries: u32,
    account_pool: Option<Arc<dyn AccountPoolHandle>>,
    database: Option<Arc<dyn Database>>,
}

impl TestBotContext {
    /// Creates a context with default fakes and an empty template
    /// registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            variables: VariableStore::new(),
            adb: Arc::new(FakeAdb::new()),
            cv: Arc::new(FakeCv::new()),
            controller: RoutineController::new(),
            templates: TemplateRegistry::new(),
            sentry_originated: false,
            delay_between_actions_ms: 0,
            default_template_threshold: 0.8,
            reference_resolution: (1080, 1920),
            max_account_retries: 10,
            account_pool: None,
            database: None,
        }
    }

    /// Replaces the fake ADB handle.
    #[must_use]
    pub fn with_adb(mut self, adb: Arc<dyn Adb>) -> Self {
        self.adb = adb;
        self
    }

    /// Replaces the fake CV handle.
    #[must_use]
    pub fn with_cv(mut self, cv: Arc<dyn Cv>) -> Self {
        self.cv = cv;
        self
    }

    /// Replaces the template registry.
    #[must_use]
    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    /// Seeds a variable before execution.
    #[must_use]
    pub fn with_variable(self, name: &str, value: &str) -> Self {
        self.variables.set(name, value);
        self
    }

    /// Sets the fake account-pool handle.
    #[must_use]
    pub fn with_account_pool(mut self, pool: Arc<dyn AccountPoolHandle>) -> Self {
        self.account_pool = Some(pool);
        self
    }

    /// Sets the fake database handle.
    #[must_use]
    pub fn with_database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// The underlying controller, for asserting state after execution.
    #[must_use]
    pub fn controller_handle(&self) -> Arc<RoutineController> {
        self.controller.clone()
    }
}

impl Default for TestBotContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BotContext for TestBotContext {
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
        &self.templates
    }

    fn sentry_originated(&self) -> bool {
        self.sentry_originated
    }

    fn bot_instance(&self) -> &str {
        "test-bot"
    }

    fn execution_id(&self) -> Option<&str> {
        None
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
        _overrides: &IndexMap<String, String>,
    ) -> Result<(), ActionError> {
        Err(ActionError::SubRoutine {
            routine: routine.to_string(),
            cause: "sub-routine execution is not wired in TestBotContext".to_string(),
        })
    }
}
