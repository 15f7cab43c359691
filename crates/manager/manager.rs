use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use routine_accounts::AccountPool;
use routine_actions::{ActionRegistry, TemplateRegistry};
use routine_interfaces::{AccountPoolHandle, Adb, Cv, Database};
use routine_loader::RoutineRegistry;
use shared_event_bus::EventPublisher;
use shared_logging::JsonLogger;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bot::{Bot, BotDeps};
use crate::config::{BotConfig, RestartPolicy, RetryState};
use crate::error::ManagerError;
use crate::events::Telemetry;

struct BotInstance {
    bot: Bot,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<(), ManagerError>>>>,
}

/// Multiplexes many bots over shared template/routine registries and an
/// optional account pool and database, the process-wide singletons per
/// the shared-vs-per-bot state split.
pub struct Manager {
    routine_registry: Arc<RoutineRegistry>,
    template_registry: Arc<TemplateRegistry>,
    account_pool: Option<Arc<AccountPool>>,
    owns_pool: bool,
    database: Option<Arc<dyn Database>>,
    default_config: BotConfig,
    instances: RwLock<IndexMap<String, Arc<BotInstance>>>,
    retry_state: Mutex<HashMap<(String, String), RetryState>>,
    root_cancel: CancellationToken,
    telemetry: Telemetry,
}

impl Manager {
    /// Builds fresh registries from `routines_dir` and wraps them, with no
    /// account pool or database.
    #[must_use]
    pub fn new(
        routines_dir: impl Into<std::path::PathBuf>,
        actions: &ActionRegistry,
        templates: TemplateRegistry,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let routine_registry = Arc::new(RoutineRegistry::load(routines_dir, actions, &templates));
        Self::new_with_registries(routine_registry, Arc::new(templates), None, false, None, events, None, BotConfig::default())
    }

    /// Shares already-built registries (and optionally a pool/database)
    /// across more than one `Manager`, per `NewManagerWithRegistries`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new_with_registries(
        routine_registry: Arc<RoutineRegistry>,
        template_registry: Arc<TemplateRegistry>,
        account_pool: Option<Arc<AccountPool>>,
        owns_pool: bool,
        database: Option<Arc<dyn Database>>,
        events: Arc<dyn EventPublisher>,
        logger: Option<Arc<JsonLogger>>,
        default_config: BotConfig,
    ) -> Self {
        Self {
            routine_registry,
            template_registry,
            account_pool,
            owns_pool,
            database,
            default_config,
            instances: RwLock::new(IndexMap::new()),
            retry_state: Mutex::new(HashMap::new()),
            root_cancel: CancellationToken::new(),
            telemetry: Telemetry::new(events, logger),
        }
    }

    /// Re-walks the routine directory backing this manager's registry.
    pub fn reload_routines(&self, actions: &ActionRegistry) {
        self.routine_registry.reload(actions, &self.template_registry);
    }

    /// Adds a bot inheriting this manager's shared registries, pool, and
    /// database, under the manager's default [`BotConfig`].
    pub fn create_bot(&self, instance_id: impl Into<String>, adb: Arc<dyn Adb>, cv: Arc<dyn Cv>) -> Result<(), ManagerError> {
        self.create_bot_with_config(instance_id, adb, cv, self.default_config)
    }

    /// Like [`Manager::create_bot`] but overriding the per-bot config.
    pub fn create_bot_with_config(
        &self,
        instance_id: impl Into<String>,
        adb: Arc<dyn Adb>,
        cv: Arc<dyn Cv>,
        config: BotConfig,
    ) -> Result<(), ManagerError> {
        let instance_id = instance_id.into();
        let mut instances = self.instances.write();
        if instances.contains_key(&instance_id) {
            return Err(ManagerError::InstanceAlreadyExists(instance_id));
        }

        let account_pool = self.account_pool.clone().map(|pool| pool as Arc<dyn AccountPoolHandle>);
        let bot = Bot::new(
            instance_id.clone(),
            BotDeps {
                adb,
                cv,
                routine_registry: self.routine_registry.clone(),
                template_registry: self.template_registry.clone(),
                account_pool,
                database: self.database.clone(),
                delay_between_actions_ms: config.delay_between_actions_ms,
                default_template_threshold: config.default_template_threshold,
                reference_resolution: config.reference_resolution,
                max_account_retries: config.max_account_retries,
            },
        );
        let instance = Arc::new(BotInstance {
            bot,
            cancel: self.root_cancel.child_token(),
            task: Mutex::new(None),
        });
        instances.insert(instance_id, instance);
        Ok(())
    }

    /// Removes a bot's registration; does not stop an in-flight task, the
    /// caller must `shutdown_all` or drop the handle returned by `spawn`
    /// first.
    pub fn remove_bot(&self, instance_id: &str) -> Result<(), ManagerError> {
        self.instances
            .write()
            .shift_remove(instance_id)
            .map(|_| ())
            .ok_or_else(|| ManagerError::InstanceNotFound(instance_id.to_string()))
    }

    /// Drives a bot's controller directly, without running a routine.
    pub fn pause(&self, instance_id: &str) -> Result<(), ManagerError> {
        self.get_instance(instance_id)?.bot.controller().pause();
        Ok(())
    }

    /// Resumes a paused bot.
    pub fn resume(&self, instance_id: &str) -> Result<(), ManagerError> {
        self.get_instance(instance_id)?.bot.controller().resume();
        Ok(())
    }

    /// Force-stops a bot's controller; the next checkpoint aborts.
    pub fn force_stop(&self, instance_id: &str) -> Result<(), ManagerError> {
        self.get_instance(instance_id)?.bot.controller().force_stop();
        Ok(())
    }

    fn get_instance(&self, instance_id: &str) -> Result<Arc<BotInstance>, ManagerError> {
        self.instances
            .read()
            .get(instance_id)
            .cloned()
            .ok_or_else(|| ManagerError::InstanceNotFound(instance_id.to_string()))
    }

    /// Runs `routine_name` once against `instance_id` to completion,
    /// seeding a fresh `execution_id` for the run.
    pub async fn execute(&self, instance_id: &str, routine_name: &str) -> Result<(), ManagerError> {
        self.execute_internal(instance_id, routine_name, &IndexMap::new()).await
    }

    async fn execute_internal(
        &self,
        instance_id: &str,
        routine_name: &str,
        overrides: &IndexMap<String, String>,
    ) -> Result<(), ManagerError> {
        let instance = self.get_instance(instance_id)?;
        let execution_id = uuid::Uuid::new_v4().to_string();
        let bot = instance.bot.with_execution_id(execution_id.clone());

        instance.bot.controller().set_running();
        self.telemetry
            .emit(
                instance_id,
                "execution.started",
                serde_json::json!({"routine": routine_name, "execution_id": execution_id}),
            )
            .await;

        let result = bot.execute_routine(routine_name, overrides).await;

        match &result {
            Ok(()) => {
                instance.bot.controller().set_completed();
                self.telemetry
                    .emit(instance_id, "execution.succeeded", serde_json::json!({"routine": routine_name}))
                    .await;
            }
            Err(err) => {
                self.telemetry
                    .emit(
                        instance_id,
                        "execution.failed",
                        serde_json::json!({"routine": routine_name, "error": err.to_string()}),
                    )
                    .await;
            }
        }
        instance.bot.controller().reset();
        result
    }

    /// Runs `routine_name` against `instance_id`, retrying failures under
    /// `policy`'s exponential backoff. A bounded call: returns on the
    /// first success or once `policy.max_retries` additional attempts
    /// have all failed. Consecutive-failure state persists across
    /// separate calls for the same `(instance, routine)` pair unless
    /// `policy.reset_on_success` clears it on a later success.
    pub async fn execute_with_restart(
        &self,
        instance_id: &str,
        routine_name: &str,
        policy: RestartPolicy,
    ) -> Result<(), ManagerError> {
        let instance = self.get_instance(instance_id)?;
        let key = (instance_id.to_string(), routine_name.to_string());
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.execute_internal(instance_id, routine_name, &IndexMap::new()).await {
                Ok(()) => {
                    if policy.reset_on_success {
                        self.retry_state.lock().remove(&key);
                    }
                    return Ok(());
                }
                Err(err) => {
                    if !policy.enabled || attempt > policy.max_retries {
                        self.telemetry
                            .emit(
                                instance_id,
                                "restart.exhausted",
                                serde_json::json!({"routine": routine_name, "attempts": attempt}),
                            )
                            .await;
                        return Err(ManagerError::RestartExhausted {
                            attempts: attempt,
                            cause: Box::new(err),
                        });
                    }

                    let consecutive = {
                        let mut state = self.retry_state.lock();
                        let entry = state.entry(key.clone()).or_default();
                        let current = entry.consecutive_failures;
                        entry.consecutive_failures += 1;
                        current
                    };
                    let delay = policy.delay_for(consecutive);
                    self.telemetry
                        .emit(
                            instance_id,
                            "restart.scheduled",
                            serde_json::json!({"routine": routine_name, "attempt": attempt, "delay_ms": delay.as_millis()}),
                        )
                        .await;

                    tokio::select! {
                        () = instance.cancel.cancelled() => return Err(err),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Spawns `execute_with_restart` as a background task tracked against
    /// `instance_id`, so `shutdown_all` can join it.
    pub fn spawn(self: &Arc<Self>, instance_id: &str, routine_name: &str, policy: RestartPolicy) -> Result<(), ManagerError> {
        let instance = self.get_instance(instance_id)?;
        let manager = self.clone();
        let instance_id = instance_id.to_string();
        let routine_name = routine_name.to_string();
        let handle = tokio::spawn(async move { manager.execute_with_restart(&instance_id, &routine_name, policy).await });
        *instance.task.lock() = Some(handle);
        Ok(())
    }

    /// Cancels every bot's controller and cancellation token, stops every
    /// bot's sentry manager, joins every spawned task, then closes the
    /// account pool if this manager owns it.
    pub async fn shutdown_all(&self) {
        self.root_cancel.cancel();

        let instances: Vec<Arc<BotInstance>> = self.instances.read().values().cloned().collect();
        for instance in &instances {
            instance.bot.controller().force_stop();
            instance.cancel.cancel();
        }
        for instance in &instances {
            instance.bot.sentries().stop_all().await;
        }
        for instance in &instances {
            let handle = instance.task.lock().take();
            if let Some(handle) = handle {
                let _ = handle.await;
            }
        }

        if self.owns_pool {
            if let Some(pool) = &self.account_pool {
                pool.close();
            }
        }

        self.telemetry.emit("manager", "shutdown.complete", serde_json::json!({})).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routine_interfaces::{FakeAdb, FakeCv};
    use shared_event_bus::MemoryEventBus;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_routine(dir: &std::path::Path, name: &str, contents: &str) {
        let path = dir.join(name);
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    fn make_manager(dir: &std::path::Path) -> Arc<Manager> {
        let actions = ActionRegistry::with_builtins();
        let templates = TemplateRegistry::new();
        let events: Arc<dyn EventPublisher> = Arc::new(MemoryEventBus::new(64));
        Arc::new(Manager::new(dir, &actions, templates, events))
    }

    #[tokio::test]
    async fn execute_runs_a_simple_routine_to_completion() {
        let dir = tempdir().unwrap();
        write_routine(
            dir.path(),
            "click.yaml",
            r#"
routine_name: "Click Once"
steps:
  - action: Click
    x: 10
    y: 20
"#,
        );
        let manager = make_manager(dir.path());
        manager.create_bot("bot-1", Arc::new(FakeAdb::new()), Arc::new(FakeCv::new())).unwrap();

        manager.execute("bot-1", "click").await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_instance_id_is_rejected() {
        let dir = tempdir().unwrap();
        let manager = make_manager(dir.path());
        manager.create_bot("bot-1", Arc::new(FakeAdb::new()), Arc::new(FakeCv::new())).unwrap();
        let err = manager
            .create_bot("bot-1", Arc::new(FakeAdb::new()), Arc::new(FakeCv::new()))
            .unwrap_err();
        assert!(matches!(err, ManagerError::InstanceAlreadyExists(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn execute_with_restart_exhausts_after_max_retries() {
        let dir = tempdir().unwrap();
        write_routine(
            dir.path(),
            "failing.yaml",
            r#"
routine_name: "Failing"
steps:
  - action: GetVariable
    name: "undefined_variable_xyz"
    saveAs: "never"
"#,
        );
        let manager = make_manager(dir.path());
        manager.create_bot("bot-1", Arc::new(FakeAdb::new()), Arc::new(FakeCv::new())).unwrap();

        let policy = RestartPolicy {
            enabled: true,
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
            reset_on_success: true,
        };

        let err = manager.execute_with_restart("bot-1", "failing", policy).await.unwrap_err();
        match err {
            ManagerError::RestartExhausted { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected RestartExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_all_closes_owned_pool() {
        let dir = tempdir().unwrap();
        let pool = AccountPool::new(Vec::new(), routine_accounts::PoolConfig::default());
        let actions = ActionRegistry::with_builtins();
        let templates = Arc::new(TemplateRegistry::new());
        let routine_registry = Arc::new(RoutineRegistry::load(dir.path(), &actions, &templates));
        let events: Arc<dyn EventPublisher> = Arc::new(MemoryEventBus::new(16));
        let manager = Arc::new(Manager::new_with_registries(
            routine_registry,
            templates,
            Some(pool.clone()),
            true,
            None,
            events,
            None,
            BotConfig::default(),
        ));

        manager.shutdown_all().await;
        let err = pool.get_next().await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
