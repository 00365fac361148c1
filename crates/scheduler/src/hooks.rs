//! Observation hooks invoked from the scheduling path.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use cadence_core::RuleKey;

/// Called by a routine after the evaluation for a tick has been processed.
pub type EvalAppliedFn = Arc<dyn Fn(&RuleKey, DateTime<Utc>) + Send + Sync>;

/// Called by the dispatcher after a routine was stopped by deletion or pause.
pub type StopAppliedFn = Arc<dyn Fn(&RuleKey) + Send + Sync>;

/// Optional hooks; unset hooks are no-ops.
#[derive(Clone, Default)]
pub struct Hooks {
    pub eval_applied: Option<EvalAppliedFn>,
    pub stop_applied: Option<StopAppliedFn>,
}

impl Hooks {
    pub(crate) fn eval_applied(&self, key: &RuleKey, at: DateTime<Utc>) {
        if let Some(f) = &self.eval_applied {
            f(key, at);
        }
    }

    pub(crate) fn stop_applied(&self, key: &RuleKey) {
        if let Some(f) = &self.stop_applied {
            f(key);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("eval_applied", &self.eval_applied.is_some())
            .field("stop_applied", &self.stop_applied.is_some())
            .finish()
    }
}
