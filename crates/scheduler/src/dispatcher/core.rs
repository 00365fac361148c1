use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use cadence_store::Store;

use crate::clock::Clock;
use crate::evaluator::Evaluator;
use crate::metrics::SchedulerMetrics;
use crate::registry::Registry;
use crate::routine::RoutineContext;

use super::SchedulerBuilder;

/// The alert scheduler. Ticks every base interval, keeps one routine per
/// live rule, and hands each due rule its tick.
///
/// Built with [`SchedulerBuilder`]; driven by [`Scheduler::run`].
pub struct Scheduler {
    pub(super) base_interval: Duration,
    pub(super) base_interval_seconds: u64,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) store: Arc<dyn Store>,
    /// Running routines by rule key.
    pub(super) registry: Registry,
    /// Collaborators handed to every routine.
    pub(super) routine_ctx: Arc<RoutineContext>,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
}

impl Scheduler {
    /// Start configuring a scheduler over `store` and `evaluator`.
    pub fn builder(store: Arc<dyn Store>, evaluator: Arc<dyn Evaluator>) -> SchedulerBuilder {
        SchedulerBuilder::new(store, evaluator)
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        match self.metrics.read() {
            Ok(m) => m.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Get an Arc to the metrics (for external reads without cloning).
    pub fn metrics_handle(&self) -> Arc<RwLock<SchedulerMetrics>> {
        Arc::clone(&self.metrics)
    }

    /// Routines currently registered.
    pub fn active_routines(&self) -> usize {
        self.registry.len()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("base_interval", &self.base_interval)
            .field("max_attempts", &self.routine_ctx.max_attempts)
            .field("eval_timeout", &self.routine_ctx.eval_timeout)
            .field("hooks", &self.routine_ctx.hooks)
            .field("active_routines", &self.registry.len())
            .finish()
    }
}
