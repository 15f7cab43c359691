#![deny(clippy::all, missing_docs, rust_2018_idioms)]

//! Background health-check tickers: routines re-run on a fixed interval
//! against a bot's shared context, pausing/resuming/stopping it as their
//! run health changes.

/// Sentry-local error type.
#[path = "../error.rs"]
pub mod error;

/// Running health and timing accumulator for one ticking sentry.
#[path = "../metrics.rs"]
pub mod metrics;

/// The per-routine ticking executor.
#[path = "../engine.rs"]
pub mod engine;

/// The ref-counted, keyed table of active sentries.
#[path = "../manager.rs"]
pub mod manager;

pub use engine::{SentryConfig, SentryEngine};
pub use error::SentryError;
pub use manager::SentryManager;
pub use metrics::SentryMetrics;

#[cfg(test)]
mod tests {
    use super::*;
    use routine_actions::{BotContext, TemplateRegistry};
    use routine_controller::RoutineController;
    use routine_interfaces::{FakeAdb, FakeCv};
    use routine_loader::{ActionRegistry, CompiledRoutine, SentryAction, SentryRecord, SentrySeverity};
    use routine_variables::VariableStore;
    use std::sync::Arc;

    struct TestBot {
        variables: VariableStore,
        adb: FakeAdb,
        cv: FakeCv,
        controller: Arc<RoutineController>,
        templates: TemplateRegistry,
    }

    #[async_trait::async_trait]
    impl BotContext for TestBot {
        fn variables(&self) -> &VariableStore {
            &self.variables
        }
        fn adb(&self) -> &dyn routine_interfaces::Adb {
            &self.adb
        }
        fn cv(&self) -> &dyn routine_interfaces::Cv {
            &self.cv
        }
        fn controller(&self) -> &RoutineController {
            &self.controller
        }
        fn templates(&self) -> &TemplateRegistry {
            &self.templates
        }
        fn sentry_originated(&self) -> bool {
            true
        }
        fn bot_instance(&self) -> &str {
            "test-bot"
        }
        fn execution_id(&self) -> Option<&str> {
            None
        }
        fn account_pool(&self) -> Option<&dyn routine_interfaces::AccountPoolHandle> {
            None
        }
        fn database(&self) -> Option<&dyn routine_interfaces::Database> {
            None
        }
        fn delay_between_actions_ms(&self) -> u64 {
            0
        }
        fn default_template_threshold(&self) -> f32 {
            0.8
        }
        fn reference_resolution(&self) -> (u32, u32) {
            (1080, 1920)
        }
        fn max_account_retries(&self) -> u32 {
            10
        }
        async fn run_sub_routine(
            &self,
            _routine: &str,
            _overrides: &indexmap::IndexMap<String, String>,
        ) -> Result<(), routine_actions::ActionError> {
            Ok(())
        }
    }

    fn compiled_routine(yaml: &str) -> Arc<CompiledRoutine> {
        let file: routine_loader::RoutineFile = serde_yaml::from_str(yaml).unwrap();
        let actions = ActionRegistry::with_builtins();
        let templates = TemplateRegistry::new();
        Arc::new(routine_loader::compile_routine_file(&file, &actions, &templates).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn engine_ticks_and_resumes_on_success() {
        let routine = compiled_routine(
            r#"
routine_name: "Heartbeat"
steps:
  - action: SetVariable
    name: "pinged"
    value: "yes"
"#,
        );
        let controller = RoutineController::new();
        controller.set_running();
        controller.pause();

        let bot: Arc<dyn BotContext> = Arc::new(TestBot {
            variables: VariableStore::new(),
            adb: FakeAdb::default(),
            cv: FakeCv::default(),
            controller: controller.clone(),
            templates: TemplateRegistry::new(),
        });

        let config = SentryConfig {
            routine_name: "Heartbeat".into(),
            frequency_seconds: 1,
            severity: SentrySeverity::Medium,
            on_success: SentryAction::Resume,
            on_failure: SentryAction::Pause,
            config: indexmap::IndexMap::new(),
        };
        let engine = SentryEngine::spawn(config, routine, controller.clone(), bot);

        tokio::time::advance(std::time::Duration::from_millis(1100)).await;
        tokio::task::yield_now().await;

        assert_eq!(controller.state(), routine_controller::RoutineState::Running);
        engine.stop().await;
    }

    #[tokio::test]
    async fn manager_ref_counts_shared_registrations() {
        let manager = SentryManager::new();
        let routine = compiled_routine(
            r#"
routine_name: "Heartbeat"
steps:
  - action: SetVariable
    name: "pinged"
    value: "yes"
"#,
        );
        let controller = RoutineController::new();
        controller.set_running();
        let bot: Arc<dyn BotContext> = Arc::new(TestBot {
            variables: VariableStore::new(),
            adb: FakeAdb::default(),
            cv: FakeCv::default(),
            controller: controller.clone(),
            templates: TemplateRegistry::new(),
        });

        let record = SentryRecord {
            routine_name: Some("Heartbeat".into()),
            frequency_seconds: 5,
            severity: SentrySeverity::Medium,
            on_success: SentryAction::Resume,
            on_failure: SentryAction::ForceStop,
            config: indexmap::IndexMap::new(),
        };

        manager.register(&record, routine.clone(), controller.clone(), bot.clone());
        manager.register(&record, routine, controller, bot);
        assert_eq!(manager.active_routines(), vec!["Heartbeat".to_string()]);

        manager.unregister("Heartbeat").await;
        assert_eq!(manager.active_routines(), vec!["Heartbeat".to_string()]);
        manager.unregister("Heartbeat").await;
        assert!(manager.active_routines().is_empty());
    }
}
