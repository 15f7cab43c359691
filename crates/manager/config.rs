use std::time::Duration;

/// Per-bot tunables that don't come from a routine file.
#[derive(Debug, Clone, Copy)]
pub struct BotConfig {
    /// Milliseconds a `Delay{count}` Step sleeps per unit, per
    /// spec-reserved `delay_between_actions_ms` semantics.
    pub delay_between_actions_ms: u64,
    /// Fallback confidence threshold for a `FindImage`-family action whose
    /// target template doesn't pin down its own.
    pub default_template_threshold: f32,
    /// The `(width, height)` screen resolution routine coordinates were
    /// authored against; scaling to a device's actual resolution is left
    /// to the concrete `Adb` implementor.
    pub reference_resolution: (u32, u32),
    /// Fallback bound on `InjectNextAccount` checkout attempts when a
    /// routine doesn't declare its own `maxAttempts`.
    pub max_account_retries: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            delay_between_actions_ms: 200,
            default_template_threshold: 0.8,
            reference_resolution: (1080, 1920),
            max_account_retries: 10,
        }
    }
}

/// Exponential-backoff retry policy for `Manager::execute_with_restart`.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    /// If false, any failure returns immediately with no retry.
    pub enabled: bool,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound every computed delay is clamped to.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed retry.
    pub backoff_factor: f64,
    /// Whether a successful execution clears this instance/routine's
    /// accumulated consecutive-failure count, so a later failing run
    /// starts its backoff over from `initial_delay` rather than
    /// continuing where the last failing streak left off.
    pub reset_on_success: bool,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            reset_on_success: true,
        }
    }
}

impl RestartPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// `min(initial_delay * backoff_factor^consecutive_failures, max_delay)`,
    /// per the restart-policy backoff formula.
    #[must_use]
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(consecutive_failures as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// Accumulated consecutive-failure count for one (instance, routine) pair,
/// carried across separate `execute_with_restart` calls so a policy's
/// backoff continues where a prior failing streak left off unless
/// `RestartPolicy::reset_on_success` clears it.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RetryState {
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_geometrically_and_clamps() {
        let policy = RestartPolicy {
            enabled: true,
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
            reset_on_success: true,
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
    }
}
