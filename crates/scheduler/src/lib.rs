//! Alert definition scheduler.
//!
//! A single dispatcher ticks every base interval, reads the definition set
//! from a [`Store`](cadence_store::Store), keeps one routine per live rule,
//! and hands every due rule its tick. Routines evaluate through an
//! [`Evaluator`] and persist the resulting instances.

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod hooks;
pub mod metrics;
mod registry;
mod routine;

pub use clock::{Clock, MockClock, SystemClock, Ticker};
pub use dispatcher::{frequency, is_due, Scheduler, SchedulerBuilder};
pub use error::SchedulerError;
pub use evaluator::{EvalError, EvalResult, Evaluator, StaticEvaluator};
pub use hooks::{EvalAppliedFn, Hooks, StopAppliedFn};
pub use metrics::SchedulerMetrics;
