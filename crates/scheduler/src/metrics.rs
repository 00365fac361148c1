use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cadence_core::RuleKey;

/// Scheduler operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Ticks processed by the dispatcher since start.
    pub ticks: u64,
    /// Timestamp of the last processed tick.
    pub last_tick: Option<DateTime<Utc>>,
    /// Routines currently registered.
    pub active_routines: usize,
    /// Completed evaluations by rule key (`org/uid`).
    pub evaluations: HashMap<String, u64>,
    /// Average evaluation duration by rule key.
    pub avg_eval_duration: HashMap<String, Duration>,
    /// Last evaluated tick timestamp by rule key.
    pub last_eval: HashMap<String, DateTime<Utc>>,
    /// Evaluations that failed after every attempt.
    pub evaluation_failures: u64,
    /// Ticks dropped because the rule was still evaluating.
    pub ticks_skipped: u64,
    /// Routines stopped by deletion or pause.
    pub routines_stopped: u64,
    /// Ticks that fell back to the previous definition snapshot.
    pub store_refresh_failures: u64,
}

impl SchedulerMetrics {
    /// Record a processed tick.
    pub fn record_tick(&mut self, at: DateTime<Utc>, active_routines: usize) {
        self.ticks += 1;
        self.last_tick = Some(at);
        self.active_routines = active_routines;
    }

    /// Record a finished evaluation.
    pub fn record_evaluation(&mut self, key: &RuleKey, at: DateTime<Utc>, duration: Duration) {
        let name = key.to_string();
        let count = {
            let c = self.evaluations.entry(name.clone()).or_default();
            *c += 1;
            *c
        };
        self.last_eval.insert(name.clone(), at);

        let prev_avg = self
            .avg_eval_duration
            .get(&name)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_eval_duration.insert(name, new_avg);
    }

    /// Number of completed evaluations for a rule.
    pub fn evaluations_for(&self, key: &RuleKey) -> u64 {
        self.evaluations.get(&key.to_string()).copied().unwrap_or(0)
    }
}
