//! Save-time checks for alert definitions.
//!
//! Configuration errors are rejected here, synchronously, so they never reach
//! the scheduler.

use cadence_core::AlertDefinition;

use crate::error::StoreError;

/// Longest title accepted (bounded by the narrowest supported SQL dialect).
pub const MAX_TITLE_LENGTH: usize = 190;

/// Validates definitions against the scheduler's base interval.
#[derive(Debug, Clone, Copy)]
pub struct DefinitionValidator {
    base_interval_seconds: u64,
}

impl DefinitionValidator {
    pub fn new(base_interval_seconds: u64) -> Self {
        Self {
            base_interval_seconds: base_interval_seconds.max(1),
        }
    }

    pub fn base_interval_seconds(&self) -> u64 {
        self.base_interval_seconds
    }

    /// Check a definition before it is written.
    ///
    /// `require_data` is set on create; updates may carry over stored data.
    pub fn validate(&self, def: &AlertDefinition, require_data: bool) -> Result<(), StoreError> {
        if require_data && is_empty_data(&def.data) {
            return Err(StoreError::Validation(
                "no queries or expressions are found".into(),
            ));
        }

        if def.title.trim().is_empty() {
            return Err(StoreError::Validation("title is empty".into()));
        }

        if def.title.chars().count() > MAX_TITLE_LENGTH {
            return Err(StoreError::Validation(format!(
                "title is longer than {MAX_TITLE_LENGTH} characters"
            )));
        }

        if def.org_id == 0 {
            return Err(StoreError::Validation("organization id is empty".into()));
        }

        if def.interval_seconds % self.base_interval_seconds != 0 {
            return Err(StoreError::Validation(format!(
                "invalid interval {}s: must be a multiple of the scheduler interval {}s",
                def.interval_seconds, self.base_interval_seconds
            )));
        }

        Ok(())
    }
}

fn is_empty_data(data: &serde_json::Value) -> bool {
    match data {
        serde_json::Value::Null => true,
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
