use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use routine_actions::BotContext;
use routine_controller::RoutineController;
use routine_loader::{CompiledRoutine, SentryRecord};
use tracing::debug;

use crate::engine::{SentryConfig, SentryEngine};
use crate::metrics::SentryMetrics;

struct ActiveSentry {
    engine: SentryEngine,
    ref_count: u32,
    frequency: u64,
}

/// Per-bot keyed table of active sentries, reference-counted so the same
/// routine can be registered by more than one caller (e.g. a parent
/// routine and a sub-routine both wanting the same health check) without
/// running duplicate tickers.
///
/// Re-registering an already-active routine at a stricter (lower) tick
/// frequency than it's currently running at restarts the engine at the
/// new frequency; a looser frequency is ignored, so the table always runs
/// at the strictest frequency any registrant asked for.
#[derive(Default)]
pub struct SentryManager {
    active: Mutex<IndexMap<String, ActiveSentry>>,
}

impl SentryManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sentry for `routine_name`, spawning its ticker if this
    /// is the first registration, or bumping the ref count (and, if
    /// stricter, the frequency) if one is already active.
    pub fn register(
        &self,
        record: &SentryRecord,
        routine: Arc<CompiledRoutine>,
        controller: Arc<RoutineController>,
        bot: Arc<dyn BotContext>,
    ) {
        let routine_name = record.routine_name.clone().unwrap_or_else(|| routine.name.clone());
        let frequency = record.frequency_seconds.max(1);

        let mut active = self.active.lock();
        if let Some(existing) = active.get_mut(&routine_name) {
            existing.ref_count += 1;
            if frequency < existing.frequency {
                debug!(routine = %routine_name, old = existing.frequency, new = frequency, "tightening sentry frequency");
                let replaced = active.shift_remove(&routine_name).expect("just matched");
                drop(active);
                let new_entry = spawn_entry(record, frequency, routine, controller, bot, replaced.ref_count);
                // `stop` is async; fire-and-forget the old tick task's abort.
                tokio::spawn(replaced.engine.stop());
                self.active.lock().insert(routine_name, new_entry);
            }
            return;
        }

        let entry = spawn_entry(record, frequency, routine, controller, bot, 1);
        active.insert(routine_name, entry);
    }

    /// Decrements the ref count for `routine_name`, stopping and removing
    /// its engine once it reaches zero.
    pub async fn unregister(&self, routine_name: &str) {
        let removed = {
            let mut active = self.active.lock();
            if let Some(existing) = active.get_mut(routine_name) {
                existing.ref_count = existing.ref_count.saturating_sub(1);
                if existing.ref_count == 0 {
                    active.shift_remove(routine_name)
                } else {
                    None
                }
            } else {
                None
            }
        };
        if let Some(entry) = removed {
            entry.engine.stop().await;
        }
    }

    /// Stops and removes every active sentry, regardless of ref count.
    pub async fn stop_all(&self) {
        let entries: Vec<ActiveSentry> = {
            let mut active = self.active.lock();
            active.drain(..).map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.engine.stop().await;
        }
    }

    /// The metrics for a named active sentry, if one is registered.
    #[must_use]
    pub fn metrics(&self, routine_name: &str) -> Option<SentryMetrics> {
        self.active.lock().get(routine_name).map(|entry| entry.engine.metrics())
    }

    /// Every currently active routine name.
    #[must_use]
    pub fn active_routines(&self) -> Vec<String> {
        self.active.lock().keys().cloned().collect()
    }
}

fn spawn_entry(
    record: &SentryRecord,
    frequency: u64,
    routine: Arc<CompiledRoutine>,
    controller: Arc<RoutineController>,
    bot: Arc<dyn BotContext>,
    ref_count: u32,
) -> ActiveSentry {
    let config = SentryConfig {
        routine_name: record.routine_name.clone().unwrap_or_else(|| routine.name.clone()),
        frequency_seconds: frequency,
        severity: record.severity,
        on_success: record.on_success,
        on_failure: record.on_failure,
        config: record.config.clone(),
    };
    let engine = SentryEngine::spawn(config, routine, controller, bot);
    ActiveSentry {
        engine,
        ref_count,
        frequency,
    }
}
