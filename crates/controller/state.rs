use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::ControllerError;

/// A bot's cooperative execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineState {
    /// No routine is running.
    Idle,
    /// A routine is actively executing.
    Running,
    /// Execution is suspended at the next checkpoint.
    Paused,
    /// Execution must terminate at the next checkpoint.
    Stopped,
    /// The routine ran to completion.
    Completed,
}

/// What a checkpoint should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Execution may proceed.
    Continue,
    /// Execution must stop; the caller should return `StoppedByController`.
    Stop,
}

struct Inner {
    state: RoutineState,
}

/// Per-bot cooperative gate around Step dispatch and loop iteration.
///
/// Every blocking wait is woken by `Resume` or `ForceStop`; a
/// sentry-originated checkpoint (see `check_sentry`) never blocks on pause,
/// matching sentries' need to keep ticking while the main routine is
/// paused.
pub struct RoutineController {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl RoutineController {
    /// Creates a controller in the `Idle` state.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: RoutineState::Idle,
            }),
            condvar: Condvar::new(),
        })
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> RoutineState {
        self.inner.lock().state
    }

    /// `Idle|Paused|Completed -> Running`.
    pub fn set_running(&self) {
        let mut inner = self.inner.lock();
        inner.state = RoutineState::Running;
        self.condvar.notify_all();
    }

    /// `Running -> Paused`. Subsequent checkpoints block until woken.
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.state == RoutineState::Running {
            inner.state = RoutineState::Paused;
        }
    }

    /// `Paused -> Running`, waking every blocked checkpoint.
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        if inner.state == RoutineState::Paused {
            inner.state = RoutineState::Running;
        }
        self.condvar.notify_all();
    }

    /// Any state `-> Stopped`. The next checkpoint aborts execution.
    pub fn force_stop(&self) {
        let mut inner = self.inner.lock();
        inner.state = RoutineState::Stopped;
        self.condvar.notify_all();
    }

    /// `Running -> Completed`.
    pub fn set_completed(&self) {
        let mut inner = self.inner.lock();
        inner.state = RoutineState::Completed;
        self.condvar.notify_all();
    }

    /// Any state `-> Idle`, clearing prior completion/stop state.
    pub fn set_idle(&self) {
        let mut inner = self.inner.lock();
        inner.state = RoutineState::Idle;
        self.condvar.notify_all();
    }

    /// Alias for `set_idle`, used between routine iterations on the same
    /// controller instance.
    pub fn reset(&self) {
        self.set_idle();
    }

    /// The main-routine checkpoint: blocks while paused, returns `Stop`
    /// once the controller has been force-stopped.
    pub fn check_execution_state(&self) -> CheckOutcome {
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                RoutineState::Paused => {
                    self.condvar.wait(&mut inner);
                }
                RoutineState::Stopped => return CheckOutcome::Stop,
                _ => return CheckOutcome::Continue,
            }
        }
    }

    /// The sentry-originated checkpoint: bypasses `Paused` entirely but
    /// still honors `Stopped`, per the sentry-bypass rule.
    pub fn check_sentry_execution_state(&self) -> CheckOutcome {
        match self.inner.lock().state {
            RoutineState::Stopped => CheckOutcome::Stop,
            _ => CheckOutcome::Continue,
        }
    }

    /// Convenience wrapper returning `ControllerError::StoppedByController`
    /// instead of the raw [`CheckOutcome`].
    pub fn checkpoint(&self, sentry_originated: bool) -> Result<(), ControllerError> {
        let outcome = if sentry_originated {
            self.check_sentry_execution_state()
        } else {
            self.check_execution_state()
        };
        match outcome {
            CheckOutcome::Continue => Ok(()),
            CheckOutcome::Stop => Err(ControllerError::StoppedByController),
        }
    }

    /// Blocks the calling thread until woken or `timeout` elapses, without
    /// inspecting state; used by `Sleep`/`Delay` Steps so a `ForceStop`
    /// during a sleep returns promptly instead of running to completion.
    pub fn wait_timeout_or_stop(&self, timeout: Duration) -> CheckOutcome {
        let mut inner = self.inner.lock();
        if inner.state == RoutineState::Stopped {
            return CheckOutcome::Stop;
        }
        let result = self.condvar.wait_for(&mut inner, timeout);
        if !result.timed_out() && inner.state == RoutineState::Stopped {
            return CheckOutcome::Stop;
        }
        CheckOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration as StdDuration;

    #[test]
    fn pause_blocks_until_resume() {
        let controller = RoutineController::new();
        controller.set_running();
        controller.pause();

        let waiter = {
            let controller = controller.clone();
            thread::spawn(move || controller.check_execution_state())
        };

        thread::sleep(StdDuration::from_millis(20));
        controller.resume();
        assert_eq!(waiter.join().unwrap(), CheckOutcome::Continue);
    }

    #[test]
    fn force_stop_wakes_paused_waiter() {
        let controller = RoutineController::new();
        controller.set_running();
        controller.pause();

        let waiter = {
            let controller = controller.clone();
            thread::spawn(move || controller.check_execution_state())
        };

        thread::sleep(StdDuration::from_millis(20));
        controller.force_stop();
        assert_eq!(waiter.join().unwrap(), CheckOutcome::Stop);
    }

    #[test]
    fn sentry_checkpoint_ignores_pause() {
        let controller = RoutineController::new();
        controller.set_running();
        controller.pause();
        assert_eq!(
            controller.check_sentry_execution_state(),
            CheckOutcome::Continue
        );
    }

    #[test]
    fn checkpoint_after_stop_returns_stopped_error() {
        let controller = RoutineController::new();
        controller.set_running();
        controller.force_stop();
        assert_eq!(
            controller.checkpoint(false),
            Err(ControllerError::StoppedByController)
        );
    }
}
