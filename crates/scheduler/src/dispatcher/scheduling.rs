use std::collections::{HashMap, HashSet};

use tracing::warn;

use cadence_core::{DefinitionSummary, RuleKey};

use crate::registry::LiveRule;

use super::Scheduler;

/// Base ticks between two evaluations of a rule.
///
/// `None` for rules that never run: a zero interval, or one that is not a
/// whole multiple of the base interval.
pub fn frequency(interval_seconds: u64, base_interval_seconds: u64) -> Option<u64> {
    if interval_seconds == 0
        || base_interval_seconds == 0
        || interval_seconds % base_interval_seconds != 0
    {
        return None;
    }
    Some(interval_seconds / base_interval_seconds)
}

/// Whether a rule with `interval_seconds` is evaluated on tick number `tick`.
pub fn is_due(tick: u64, interval_seconds: u64, base_interval_seconds: u64) -> bool {
    frequency(interval_seconds, base_interval_seconds).is_some_and(|f| tick % f == 0)
}

impl Scheduler {
    /// Rules that keep a routine: not paused, with an interval aligned to the base.
    ///
    /// Zero-interval rules are live but never due.
    pub(crate) fn live_rules(
        &self,
        snapshot: &[DefinitionSummary],
        misaligned: &mut HashSet<RuleKey>,
    ) -> HashMap<RuleKey, LiveRule> {
        let base = self.base_interval_seconds;
        let mut live = HashMap::with_capacity(snapshot.len());

        for def in snapshot {
            if def.paused {
                continue;
            }
            if def.interval_seconds % base != 0 {
                if misaligned.insert(def.key.clone()) {
                    warn!(
                        rule = %def.key,
                        interval_seconds = def.interval_seconds,
                        base_interval_seconds = base,
                        "interval is not a multiple of the base interval, rule not scheduled"
                    );
                }
                continue;
            }
            misaligned.remove(&def.key);
            live.insert(
                def.key.clone(),
                LiveRule {
                    id: def.id,
                    version: def.version,
                },
            );
        }

        live
    }

    /// Live rules due on `tick`, in key order.
    pub(crate) fn due_rules<'a>(
        &self,
        tick: u64,
        snapshot: &'a [DefinitionSummary],
        live: &HashMap<RuleKey, LiveRule>,
    ) -> Vec<&'a DefinitionSummary> {
        let mut due: Vec<_> = snapshot
            .iter()
            .filter(|d| live.contains_key(&d.key))
            .filter(|d| is_due(tick, d.interval_seconds, self.base_interval_seconds))
            .collect();
        due.sort_by(|a, b| a.key.cmp(&b.key));
        due
    }
}
