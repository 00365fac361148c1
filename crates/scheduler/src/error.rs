/// Errors surfaced by the scheduler itself.
///
/// Only configuration is rejected. Store, evaluation, and refresh failures
/// never show up here; they are logged and recorded while the scheduler runs.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid scheduler config: {0}")]
    InvalidConfig(String),
}
