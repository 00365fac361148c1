use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use cadence_core::config::SchedulerSettings;
use cadence_core::RuleKey;
use cadence_store::Store;

use crate::clock::{Clock, SystemClock};
use crate::error::SchedulerError;
use crate::evaluator::Evaluator;
use crate::hooks::Hooks;
use crate::metrics::SchedulerMetrics;
use crate::registry::Registry;
use crate::routine::RoutineContext;

use super::Scheduler;

/// Programmatic scheduler configuration.
///
/// ```ignore
/// let scheduler = Scheduler::builder(store, Arc::new(StaticEvaluator))
///     .base_interval(Duration::from_secs(10))
///     .on_stop_applied(|key| tracing::info!(rule = %key, "stopped"))
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    store: Arc<dyn Store>,
    evaluator: Arc<dyn Evaluator>,
    clock: Arc<dyn Clock>,
    base_interval: Duration,
    max_attempts: u32,
    eval_timeout: Duration,
    hooks: Hooks,
}

impl SchedulerBuilder {
    pub fn new(store: Arc<dyn Store>, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            store,
            evaluator,
            clock: Arc::new(SystemClock),
            hooks: Hooks::default(),
            base_interval: Duration::ZERO,
            max_attempts: 0,
            eval_timeout: Duration::ZERO,
        }
        .settings(&SchedulerSettings::default())
    }

    /// Take base interval, attempts, and timeout from environment settings.
    pub fn settings(self, settings: &SchedulerSettings) -> Self {
        self.base_interval(settings.base_interval())
            .max_attempts(settings.max_attempts)
            .eval_timeout(settings.eval_timeout())
    }

    pub fn base_interval(mut self, interval: Duration) -> Self {
        self.base_interval = interval;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn eval_timeout(mut self, timeout: Duration) -> Self {
        self.eval_timeout = timeout;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Called with the rule key and tick timestamp after each processed evaluation.
    pub fn on_eval_applied(
        mut self,
        f: impl Fn(&RuleKey, DateTime<Utc>) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.eval_applied = Some(Arc::new(f));
        self
    }

    /// Called once per routine stopped by deletion or pause.
    pub fn on_stop_applied(mut self, f: impl Fn(&RuleKey) + Send + Sync + 'static) -> Self {
        self.hooks.stop_applied = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        if self.base_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "base interval must be greater than zero".into(),
            ));
        }
        if self.base_interval.subsec_nanos() != 0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "base interval must be a whole number of seconds, got {:?}",
                self.base_interval
            )));
        }
        if self.max_attempts == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max attempts must be at least 1".into(),
            ));
        }
        if self.eval_timeout.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "evaluation timeout must be greater than zero".into(),
            ));
        }

        let metrics = Arc::new(RwLock::new(SchedulerMetrics::default()));
        let routine_ctx = Arc::new(RoutineContext {
            store: Arc::clone(&self.store),
            evaluator: self.evaluator,
            hooks: self.hooks,
            metrics: Arc::clone(&metrics),
            max_attempts: self.max_attempts,
            eval_timeout: self.eval_timeout,
        });

        Ok(Scheduler {
            base_interval: self.base_interval,
            base_interval_seconds: self.base_interval.as_secs(),
            clock: self.clock,
            store: self.store,
            registry: Registry::default(),
            routine_ctx,
            metrics,
        })
    }
}
