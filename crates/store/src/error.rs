use cadence_core::RuleKey;
use thiserror::Error;

/// Errors produced by [`Store`](crate::Store) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("alert definition not found: {0}")]
    DefinitionNotFound(RuleKey),

    #[error("alert instance not found: {key} ({labels_hash})")]
    InstanceNotFound { key: RuleKey, labels_hash: String },

    #[error("invalid alert definition: {0}")]
    Validation(String),

    #[error("an alert definition with the title '{0}' already exists")]
    DuplicateTitle(String),

    #[error("failed to generate a unique uid for alert definition '{0}'")]
    UidGeneration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// The backend could not be reached or did not finish the operation.
    /// Callers treat it as transient.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::DefinitionNotFound(_) | StoreError::InstanceNotFound { .. }
        )
    }
}
