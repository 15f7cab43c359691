use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use routine_actions::BotContext;
use routine_controller::RoutineController;
use routine_loader::{CompiledRoutine, SentryAction, SentrySeverity};
use tokio::task::JoinHandle;

use crate::metrics::SentryMetrics;

const DEFAULT_HEALTH_THRESHOLD: u32 = 3;

/// The resolved, immutable configuration one ticking engine runs under.
#[derive(Clone)]
pub struct SentryConfig {
    /// The routine this sentry re-runs on every tick.
    pub routine_name: String,
    /// Tick interval.
    pub frequency_seconds: u64,
    /// Reporting severity, carried through to logging/metrics only.
    pub severity: SentrySeverity,
    /// Controller action applied after a healthy tick.
    pub on_success: SentryAction,
    /// Controller action applied once `consecutive_errors` reaches the
    /// health threshold.
    pub on_failure: SentryAction,
    /// Variable-store overrides seeded before every tick's routine runs,
    /// mirroring `RunRoutine`'s config-override seeding.
    pub config: IndexMap<String, String>,
}

/// One routine's background health-check ticker: runs the compiled routine
/// on a fixed interval against a shared bot, applying `on_success`/
/// `on_failure` to the bot's controller as its run health changes.
pub struct SentryEngine {
    config: SentryConfig,
    metrics: Arc<Mutex<SentryMetrics>>,
    tick_task: JoinHandle<()>,
}

impl SentryEngine {
    /// Spawns the tick loop. `sentry_originated` checkpoints let the tick
    /// proceed even while the bot's main routine is paused.
    pub fn spawn(config: SentryConfig, routine: Arc<CompiledRoutine>, controller: Arc<RoutineController>, bot: Arc<dyn BotContext>) -> Self {
        let metrics = Arc::new(Mutex::new(SentryMetrics::new()));
        let tick_metrics = metrics.clone();
        let tick_config = config.clone();
        let interval = Duration::from_secs(config.frequency_seconds.max(1));

        let tick_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if controller.checkpoint(true).is_err() {
                    return;
                }
                run_tick(&tick_config, &routine, &controller, bot.as_ref(), &tick_metrics).await;
            }
        });

        Self {
            config,
            metrics,
            tick_task,
        }
    }

    /// The routine name this engine ticks.
    #[must_use]
    pub fn routine_name(&self) -> &str {
        &self.config.routine_name
    }

    /// This engine's configured tick interval.
    #[must_use]
    pub fn frequency_seconds(&self) -> u64 {
        self.config.frequency_seconds
    }

    /// A snapshot of this engine's accumulated metrics.
    #[must_use]
    pub fn metrics(&self) -> SentryMetrics {
        self.metrics.lock().clone()
    }

    /// True if the engine's consecutive-failure streak is under the
    /// default health threshold.
    #[must_use]
    pub fn health(&self) -> bool {
        self.metrics.lock().healthy(DEFAULT_HEALTH_THRESHOLD)
    }

    /// Aborts the tick task and waits for it to unwind.
    pub async fn stop(self) {
        self.tick_task.abort();
        let _ = self.tick_task.await;
    }
}

async fn run_tick(
    config: &SentryConfig,
    routine: &CompiledRoutine,
    controller: &RoutineController,
    bot: &dyn BotContext,
    metrics: &Mutex<SentryMetrics>,
) {
    let start = Instant::now();
    for (name, value) in &config.config {
        bot.variables().set_persistent(name.clone(), value.clone());
    }

    let mut step_names = Vec::with_capacity(routine.steps.len());
    let mut outcome = Ok(());

    for step in &routine.steps {
        step_names.push(step.name().to_string());
        if let Err(err) = step.execute(bot).await {
            outcome = Err(err);
            break;
        }
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let ok = outcome.is_ok();
    {
        let mut metrics = metrics.lock();
        match outcome {
            Ok(()) => metrics.record_success(elapsed_ms, &step_names),
            Err(err) => metrics.record_failure(elapsed_ms, err.to_string(), &step_names),
        }
    }

    // The controller action follows this tick's own outcome, not the
    // accumulated health streak — health is a separate reported metric.
    let action = if ok { config.on_success } else { config.on_failure };
    apply_controller_action(controller, action);
}

fn apply_controller_action(controller: &RoutineController, action: SentryAction) {
    match action {
        SentryAction::Resume => controller.resume(),
        SentryAction::Pause => controller.pause(),
        // RoutineController models a single hard-stop transition; both
        // `Stop` and `ForceStop` map to it.
        SentryAction::Stop | SentryAction::ForceStop => controller.force_stop(),
    }
}
