//! Per-rule run loop.
//!
//! A routine owns one rule for as long as the rule stays live. It receives
//! ticks from the dispatcher over a single-slot channel and processes them
//! strictly in order. The dispatcher sets the shared `busy` flag when it
//! hands over a tick and refuses further ticks until the routine clears it,
//! so a rule never has two evaluations in flight and never catches up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadence_core::{AlertDefinition, AlertInstance, InstanceLabels, InstanceState, RuleKey};
use cadence_store::{Store, StoreError};

use crate::evaluator::{EvalError, EvalResult, Evaluator};
use crate::hooks::Hooks;
use crate::metrics::SchedulerMetrics;

/// A tick handed to a due routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TickContext {
    pub tick: u64,
    pub at: DateTime<Utc>,
    /// Definition version the dispatcher saw on this tick.
    pub version: u64,
}

/// Collaborators shared by every routine of a scheduler.
pub(crate) struct RoutineContext {
    pub store: Arc<dyn Store>,
    pub evaluator: Arc<dyn Evaluator>,
    pub hooks: Hooks,
    pub metrics: Arc<RwLock<SchedulerMetrics>>,
    pub max_attempts: u32,
    pub eval_timeout: Duration,
}

pub(crate) struct Routine {
    key: RuleKey,
    ctx: Arc<RoutineContext>,
    busy: Arc<AtomicBool>,
    /// Last full definition read from the store.
    cached: Option<AlertDefinition>,
}

impl Routine {
    pub(crate) fn new(key: RuleKey, ctx: Arc<RoutineContext>, busy: Arc<AtomicBool>) -> Self {
        Self {
            key,
            ctx,
            busy,
            cached: None,
        }
    }

    /// Run until cancelled or until the dispatcher drops the sender.
    pub(crate) async fn run(mut self, mut ticks: mpsc::Receiver<TickContext>, cancel: CancellationToken) {
        debug!(rule = %self.key, "routine started");

        loop {
            let tick = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = ticks.recv() => match next {
                    Some(tick) => tick,
                    None => break,
                },
            };

            // Cancellation abandons the evaluation; whatever the store already holds stays.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.process(tick) => {}
            }

            // Released before the hook so the next tick is accepted as soon as
            // observers see this one applied.
            self.busy.store(false, Ordering::Release);
            self.ctx.hooks.eval_applied(&self.key, tick.at);
        }

        info!(rule = %self.key, "routine stopped");
    }

    async fn process(&mut self, tick: TickContext) {
        let def = match self.definition(tick.version).await {
            Ok(def) => def,
            Err(e) if e.is_not_found() => {
                // The dispatcher stops this routine on its next reconciliation.
                debug!(rule = %self.key, tick = tick.tick, "definition gone, skipping evaluation");
                return;
            }
            Err(e) => {
                warn!(rule = %self.key, tick = tick.tick, error = %e, "failed to load alert definition");
                return;
            }
        };

        debug!(rule = %self.key, tick = tick.tick, version = def.version, "evaluating");
        let started = Instant::now();
        let outcome = self.evaluate(&def, tick.at).await;
        let elapsed = started.elapsed();

        let results = match outcome {
            Ok(results) if results.is_empty() => vec![EvalResult::new(
                InstanceLabels::new(),
                InstanceState::NoData,
            )],
            Ok(results) => results,
            Err(e) => {
                warn!(
                    rule = %self.key,
                    tick = tick.tick,
                    attempts = self.ctx.max_attempts,
                    error = %e,
                    "evaluation failed"
                );
                if let Ok(mut m) = self.ctx.metrics.write() {
                    m.evaluation_failures += 1;
                }
                vec![EvalResult {
                    labels: InstanceLabels::new(),
                    state: InstanceState::Error,
                    error: Some(e.to_string()),
                }]
            }
        };

        for result in results {
            self.persist(result, tick.at).await;
        }

        if let Ok(mut m) = self.ctx.metrics.write() {
            m.record_evaluation(&self.key, tick.at, elapsed);
        }
    }

    /// Full definition for `version`, re-read from the store only when the version moved.
    async fn definition(&mut self, version: u64) -> Result<AlertDefinition, StoreError> {
        if let Some(def) = self.cached.as_ref().filter(|d| d.version == version) {
            return Ok(def.clone());
        }
        let def = self.ctx.store.get_by_key(&self.key).await?;
        if self.cached.is_some() {
            debug!(rule = %self.key, version = def.version, "alert definition refreshed");
        }
        self.cached = Some(def.clone());
        Ok(def)
    }

    async fn evaluate(
        &self,
        def: &AlertDefinition,
        at: DateTime<Utc>,
    ) -> Result<Vec<EvalResult>, EvalError> {
        let timeout = self.ctx.eval_timeout;
        let mut last_err = EvalError::Query("no evaluation attempted".into());

        for attempt in 1..=self.ctx.max_attempts {
            match tokio::time::timeout(timeout, self.ctx.evaluator.evaluate(def, at)).await {
                Ok(Ok(results)) => return Ok(results),
                Ok(Err(e)) => last_err = e,
                Err(_) => last_err = EvalError::Timeout(timeout),
            }
            debug!(rule = %self.key, attempt, error = %last_err, "evaluation attempt failed");
        }

        Err(last_err)
    }

    async fn persist(&self, result: EvalResult, at: DateTime<Utc>) {
        let labels_hash = result.labels.fingerprint();

        // State-since only moves when the state changes.
        let since = match self.ctx.store.get_instance(&self.key, &labels_hash).await {
            Ok(prev) if prev.current_state == result.state => prev.current_state_since,
            _ => at,
        };

        let instance = AlertInstance {
            key: self.key.clone(),
            labels: result.labels,
            labels_hash,
            current_state: result.state,
            current_state_since: since,
            last_eval_time: at,
            error: result.error,
        };

        if let Err(e) = self.ctx.store.save_instance(instance).await {
            warn!(rule = %self.key, error = %e, "failed to save alert instance");
        }
    }
}
