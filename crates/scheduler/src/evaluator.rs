use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use cadence_core::{AlertDefinition, InstanceLabels, InstanceState};

/// Error type for condition evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Evaluation timed out after {0:?}")]
    Timeout(Duration),
}

/// One labelled outcome of evaluating a rule's condition.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    pub labels: InstanceLabels,
    pub state: InstanceState,
    /// Detail for `error`/`no_data` outcomes.
    pub error: Option<String>,
}

impl EvalResult {
    pub fn new(labels: InstanceLabels, state: InstanceState) -> Self {
        Self {
            labels,
            state,
            error: None,
        }
    }
}

/// Executes a definition's condition for one tick.
///
/// Implementations must not retain per-rule state; the routine retries and
/// times out calls on its own.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        def: &AlertDefinition,
        at: DateTime<Utc>,
    ) -> Result<Vec<EvalResult>, EvalError>;
}

#[async_trait]
impl<T: Evaluator + ?Sized> Evaluator for std::sync::Arc<T> {
    async fn evaluate(
        &self,
        def: &AlertDefinition,
        at: DateTime<Utc>,
    ) -> Result<Vec<EvalResult>, EvalError> {
        (**self).evaluate(def, at).await
    }
}

// ── Static evaluator ────────────────────────────────────────────────

/// Reads fixture outcomes straight from the definition's `data`.
///
/// `data` is an array of queries; the one whose `ref_id` equals the
/// definition's `condition` supplies the result:
///
/// ```json
/// [{"ref_id": "A", "state": "alerting", "labels": {"host": "web-1"}}]
/// ```
///
/// A query may also carry `"error": "..."`, which fails the evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticEvaluator;

#[derive(Debug, Deserialize)]
struct StaticQuery {
    ref_id: String,
    #[serde(default)]
    state: InstanceState,
    #[serde(default)]
    labels: InstanceLabels,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl Evaluator for StaticEvaluator {
    async fn evaluate(
        &self,
        def: &AlertDefinition,
        _at: DateTime<Utc>,
    ) -> Result<Vec<EvalResult>, EvalError> {
        let queries: Vec<StaticQuery> = serde_json::from_value(def.data.clone())
            .map_err(|e| EvalError::Query(format!("unreadable data: {e}")))?;

        let query = queries
            .into_iter()
            .find(|q| q.ref_id == def.condition)
            .ok_or_else(|| {
                EvalError::InvalidCondition(format!(
                    "condition '{}' does not match any query",
                    def.condition
                ))
            })?;

        if let Some(err) = query.error {
            return Err(EvalError::Query(err));
        }

        Ok(vec![EvalResult::new(query.labels, query.state)])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn def(condition: &str, data: serde_json::Value) -> AlertDefinition {
        AlertDefinition {
            id: 1,
            org_id: 1,
            uid: "u1".into(),
            title: "cpu".into(),
            condition: condition.into(),
            data,
            interval_seconds: 10,
            version: 1,
            paused: false,
            updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn picks_query_matching_condition() {
        let d = def(
            "B",
            json!([
                {"ref_id": "A", "state": "normal"},
                {"ref_id": "B", "state": "alerting", "labels": {"host": "web-1"}}
            ]),
        );
        let results = StaticEvaluator.evaluate(&d, Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].state, InstanceState::Alerting);
        assert_eq!(results[0].labels, InstanceLabels::new().with("host", "web-1"));
    }

    #[tokio::test]
    async fn state_defaults_to_normal() {
        let d = def("A", json!([{"ref_id": "A"}]));
        let results = StaticEvaluator.evaluate(&d, Utc::now()).await.unwrap();
        assert_eq!(results[0].state, InstanceState::Normal);
        assert!(results[0].labels.is_empty());
    }

    #[tokio::test]
    async fn unknown_condition_is_invalid() {
        let d = def("Z", json!([{"ref_id": "A"}]));
        let err = StaticEvaluator.evaluate(&d, Utc::now()).await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidCondition(_)));
    }

    #[tokio::test]
    async fn fixture_error_fails_evaluation() {
        let d = def("A", json!([{"ref_id": "A", "error": "datasource down"}]));
        let err = StaticEvaluator.evaluate(&d, Utc::now()).await.unwrap_err();
        assert!(matches!(err, EvalError::Query(ref m) if m == "datasource down"));
    }

    #[tokio::test]
    async fn non_array_data_is_a_query_error() {
        let d = def("A", json!({"ref_id": "A"}));
        let err = StaticEvaluator.evaluate(&d, Utc::now()).await.unwrap_err();
        assert!(matches!(err, EvalError::Query(_)));
    }
}
