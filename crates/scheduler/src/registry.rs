use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cadence_core::RuleKey;

use crate::routine::TickContext;

/// Identity of one rule lifecycle as seen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LiveRule {
    /// Store row id; a new id under the same key is a new lifecycle.
    pub id: i64,
    pub version: u64,
}

/// Handle to a running routine.
#[derive(Debug)]
pub(crate) struct RoutineHandle {
    pub tx: mpsc::Sender<TickContext>,
    pub cancel: CancellationToken,
    /// Set by the dispatcher when it hands over a tick, cleared by the
    /// routine once that tick is processed.
    pub busy: Arc<AtomicBool>,
    pub rule: LiveRule,
    pub join: JoinHandle<()>,
}

/// Result of one reconciliation pass.
#[derive(Debug, Default)]
pub(crate) struct ReconcileOutcome {
    pub started: Vec<RuleKey>,
    /// Routines cancelled because their rule left the live set (or was recreated).
    pub stopped: Vec<(RuleKey, RoutineHandle)>,
    /// Live routines whose definition version moved.
    pub changed: Vec<RuleKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// The routine has not finished its previous tick yet.
    Busy,
    /// The routine exited on its own.
    Closed,
    Missing,
}

/// RuleKey -> running routine. Only the dispatcher mutates it, one pass at a time.
#[derive(Default)]
pub(crate) struct Registry {
    routines: Mutex<HashMap<RuleKey, RoutineHandle>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<RuleKey, RoutineHandle>> {
        self.routines.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Align running routines with `live`.
    ///
    /// Missing keys are started through `start`; keys no longer live are
    /// cancelled and removed. A version bump only updates the remembered
    /// version. A changed row id stops the old routine and starts a new one.
    pub(crate) fn reconcile(
        &self,
        live: &HashMap<RuleKey, LiveRule>,
        mut start: impl FnMut(&RuleKey, LiveRule) -> RoutineHandle,
    ) -> ReconcileOutcome {
        let mut routines = self.lock();
        let mut outcome = ReconcileOutcome::default();

        let stale: Vec<RuleKey> = routines
            .iter()
            .filter(|(key, handle)| !live.get(*key).is_some_and(|rule| rule.id == handle.rule.id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            if let Some(handle) = routines.remove(&key) {
                handle.cancel.cancel();
                outcome.stopped.push((key, handle));
            }
        }

        for (key, rule) in live {
            match routines.get_mut(key) {
                Some(handle) => {
                    if handle.rule.version != rule.version {
                        debug!(rule = %key, from = handle.rule.version, to = rule.version, "definition version changed");
                        handle.rule.version = rule.version;
                        outcome.changed.push(key.clone());
                    }
                }
                None => {
                    routines.insert(key.clone(), start(key, *rule));
                    outcome.started.push(key.clone());
                }
            }
        }

        outcome.started.sort();
        outcome.stopped.sort_by(|a, b| a.0.cmp(&b.0));
        outcome.changed.sort();
        outcome
    }

    /// Hand a tick to a routine without waiting.
    ///
    /// A routine takes one tick at a time: while it holds an unfinished one
    /// the new tick is refused with [`Delivery::Busy`].
    pub(crate) fn deliver(&self, key: &RuleKey, tick: TickContext) -> Delivery {
        let routines = self.lock();
        let Some(handle) = routines.get(key) else {
            return Delivery::Missing;
        };
        if handle.busy.swap(true, Ordering::AcqRel) {
            return Delivery::Busy;
        }
        match handle.tx.try_send(tick) {
            Ok(()) => Delivery::Delivered,
            // Still owned by the pending tick, which clears it when done.
            Err(TrySendError::Full(_)) => Delivery::Busy,
            Err(TrySendError::Closed(_)) => {
                handle.busy.store(false, Ordering::Release);
                Delivery::Closed
            }
        }
    }

    /// Drop a routine without firing any hook (it already exited).
    pub(crate) fn forget(&self, key: &RuleKey) -> Option<RoutineHandle> {
        self.lock().remove(key)
    }

    /// Remove every routine, e.g. on shutdown.
    pub(crate) fn drain(&self) -> Vec<(RuleKey, RoutineHandle)> {
        self.lock().drain().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &RuleKey) -> bool {
        self.lock().contains_key(key)
    }
}
