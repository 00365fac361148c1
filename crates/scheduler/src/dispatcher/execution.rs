use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cadence_core::{DefinitionSummary, RuleKey};

use crate::registry::{Delivery, LiveRule, RoutineHandle};
use crate::routine::{Routine, TickContext};

use super::Scheduler;

/// Dispatcher state carried from one tick to the next.
struct TickState {
    tick: u64,
    /// Last definition set read successfully from the store.
    snapshot: Vec<DefinitionSummary>,
    /// Keys already reported with a misaligned interval.
    misaligned: HashSet<RuleKey>,
    /// Cancelled routines that may still be finishing.
    retired: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Run the tick loop until `shutdown` is cancelled.
    ///
    /// Store and evaluation errors are logged and never end the loop; a store
    /// that cannot be read at startup is retried on every tick. On shutdown
    /// every routine is cancelled and awaited before this returns.
    pub async fn run(&self, shutdown: CancellationToken) {
        let snapshot = match self.store.list_all().await {
            Ok(defs) => defs,
            Err(e) => {
                warn!(error = %e, "failed to read alert definitions at startup, retrying on next tick");
                if let Ok(mut m) = self.metrics.write() {
                    m.store_refresh_failures += 1;
                }
                Vec::new()
            }
        };
        info!(
            base_interval_seconds = self.base_interval_seconds,
            definitions = snapshot.len(),
            "scheduler starting"
        );

        let mut ticker = self.clock.ticker(self.base_interval);
        let mut state = TickState {
            tick: 0,
            snapshot,
            misaligned: HashSet::new(),
            retired: Vec::new(),
        };

        loop {
            let at = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = ticker.tick() => match next {
                    Some(at) => at,
                    None => {
                        warn!("clock stopped ticking");
                        break;
                    }
                },
            };

            state.tick += 1;
            self.process_tick(&mut state, at, &shutdown).await;
        }

        self.stop_all(state.retired).await;
        info!(ticks = state.tick, "scheduler stopped");
    }

    async fn process_tick(
        &self,
        state: &mut TickState,
        at: DateTime<Utc>,
        shutdown: &CancellationToken,
    ) {
        let tick = state.tick;

        match self.store.list_all().await {
            Ok(defs) => state.snapshot = defs,
            Err(e) => {
                warn!(tick, error = %e, "failed to refresh alert definitions, using previous snapshot");
                if let Ok(mut m) = self.metrics.write() {
                    m.store_refresh_failures += 1;
                }
            }
        }

        let live = self.live_rules(&state.snapshot, &mut state.misaligned);
        let outcome = self
            .registry
            .reconcile(&live, |key, rule| self.spawn_routine(key, rule, shutdown));

        for key in &outcome.started {
            debug!(rule = %key, tick, "routine registered");
        }
        for key in &outcome.changed {
            info!(rule = %key, tick, "alert definition updated");
        }

        let stopped = outcome.stopped.len() as u64;
        for (key, handle) in outcome.stopped {
            debug!(rule = %key, tick, "routine cancelled");
            self.routine_ctx.hooks.stop_applied(&key);
            state.retired.push(handle.join);
        }
        state.retired.retain(|join| !join.is_finished());

        let due = self.due_rules(tick, &state.snapshot, &live);
        debug!(tick, due = due.len(), live = live.len(), "tick");

        let mut skipped = 0u64;
        for def in due {
            let ctx = TickContext {
                tick,
                at,
                version: def.version,
            };
            match self.registry.deliver(&def.key, ctx) {
                Delivery::Delivered => {}
                Delivery::Busy => {
                    warn!(rule = %def.key, tick, "tick skipped, previous evaluation still running");
                    skipped += 1;
                }
                Delivery::Closed => {
                    // Re-registered on the next tick.
                    error!(rule = %def.key, tick, "routine exited unexpectedly");
                    if let Some(handle) = self.registry.forget(&def.key) {
                        state.retired.push(handle.join);
                    }
                }
                Delivery::Missing => {
                    debug!(rule = %def.key, tick, "no routine registered for due rule");
                }
            }
        }

        if let Ok(mut m) = self.metrics.write() {
            m.routines_stopped += stopped;
            m.ticks_skipped += skipped;
            m.record_tick(at, self.registry.len());
        }
    }

    fn spawn_routine(
        &self,
        key: &RuleKey,
        rule: LiveRule,
        shutdown: &CancellationToken,
    ) -> RoutineHandle {
        let (tx, rx) = mpsc::channel(1);
        let cancel = shutdown.child_token();
        let busy = Arc::new(AtomicBool::new(false));
        let routine = Routine::new(key.clone(), Arc::clone(&self.routine_ctx), Arc::clone(&busy));
        let join = tokio::spawn(routine.run(rx, cancel.clone()));
        RoutineHandle {
            tx,
            cancel,
            busy,
            rule,
            join,
        }
    }

    /// Cancel every routine and wait for all of them to exit.
    async fn stop_all(&self, retired: Vec<JoinHandle<()>>) {
        let handles = self.registry.drain();
        info!(routines = handles.len(), "stopping routines");

        for (_, handle) in &handles {
            handle.cancel.cancel();
        }
        for (key, handle) in handles {
            if let Err(e) = handle.join.await {
                warn!(rule = %key, error = %e, "routine task failed");
            }
        }
        for join in retired {
            if let Err(e) = join.await {
                warn!(error = %e, "routine task failed");
            }
        }

        if let Ok(mut m) = self.metrics.write() {
            m.active_routines = 0;
        }
    }
}
