//! Tick dispatcher -- the single control loop of the scheduler.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct and accessor methods
//! - `builder`: programmatic configuration and validation
//! - `execution`: the tick loop, routine lifecycle, and shutdown
//! - `scheduling`: live-set and due-set arithmetic in tick units

mod builder;
mod core;
mod execution;
mod scheduling;

pub use self::builder::SchedulerBuilder;
pub use self::core::Scheduler;
pub use self::scheduling::{frequency, is_due};
