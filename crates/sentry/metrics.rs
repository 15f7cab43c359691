use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// Running health and timing statistics for one ticking sentry.
///
/// Duration min/max/avg are accumulated with a Welford-style running mean
/// so the engine never retains per-tick samples.
#[derive(Debug, Clone)]
pub struct SentryMetrics {
    /// Total ticks run so far.
    pub ticks: u64,
    /// Ticks that completed without error.
    pub successes: u64,
    /// Ticks that returned an error.
    pub failures: u64,
    /// Consecutive failures since the last success; reset to 0 on success.
    pub consecutive_errors: u32,
    /// The most recent failure's message, if any.
    pub last_error: Option<String>,
    /// When the most recent failure was recorded.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Shortest tick duration observed.
    pub min_duration_ms: Option<u64>,
    /// Longest tick duration observed.
    pub max_duration_ms: Option<u64>,
    /// Running mean tick duration.
    pub avg_duration_ms: f64,
    /// How many times each step name has run across every tick.
    pub step_counts: IndexMap<String, u64>,
}

impl Default for SentryMetrics {
    fn default() -> Self {
        Self {
            ticks: 0,
            successes: 0,
            failures: 0,
            consecutive_errors: 0,
            last_error: None,
            last_error_at: None,
            min_duration_ms: None,
            max_duration_ms: None,
            avg_duration_ms: 0.0,
            step_counts: IndexMap::new(),
        }
    }
}

impl SentryMetrics {
    /// Creates an empty metrics accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record_duration(&mut self, duration_ms: u64) {
        self.ticks += 1;
        self.min_duration_ms = Some(self.min_duration_ms.map_or(duration_ms, |m| m.min(duration_ms)));
        self.max_duration_ms = Some(self.max_duration_ms.map_or(duration_ms, |m| m.max(duration_ms)));
        // Welford's running mean: avg' = avg + (x - avg) / n
        self.avg_duration_ms += (duration_ms as f64 - self.avg_duration_ms) / self.ticks as f64;
    }

    /// Records a successful tick, clearing the consecutive-failure streak.
    pub fn record_success(&mut self, duration_ms: u64, step_names: &[String]) {
        self.record_duration(duration_ms);
        self.successes += 1;
        self.consecutive_errors = 0;
        for name in step_names {
            *self.step_counts.entry(name.clone()).or_insert(0) += 1;
        }
    }

    /// Records a failed tick, extending the consecutive-failure streak.
    pub fn record_failure(&mut self, duration_ms: u64, error: String, step_names: &[String]) {
        self.record_duration(duration_ms);
        self.failures += 1;
        self.consecutive_errors += 1;
        self.last_error_at = Some(Utc::now());
        self.last_error = Some(error);
        for name in step_names {
            *self.step_counts.entry(name.clone()).or_insert(0) += 1;
        }
    }

    /// True if the consecutive-failure streak hasn't reached `threshold`.
    #[must_use]
    pub fn healthy(&self, threshold: u32) -> bool {
        self.consecutive_errors < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_errors_reset_on_success() {
        let mut metrics = SentryMetrics::new();
        metrics.record_failure(10, "boom".into(), &[]);
        metrics.record_failure(10, "boom".into(), &[]);
        assert_eq!(metrics.consecutive_errors, 2);
        assert!(!metrics.healthy(2));
        metrics.record_success(10, &[]);
        assert_eq!(metrics.consecutive_errors, 0);
        assert!(metrics.healthy(2));
    }

    #[test]
    fn running_average_tracks_min_max() {
        let mut metrics = SentryMetrics::new();
        metrics.record_success(10, &[]);
        metrics.record_success(30, &[]);
        assert_eq!(metrics.min_duration_ms, Some(10));
        assert_eq!(metrics.max_duration_ms, Some(30));
        assert!((metrics.avg_duration_ms - 20.0).abs() < f64::EPSILON);
    }
}
