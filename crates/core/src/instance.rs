//! Evaluation outcomes persisted per (rule, label set).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::definition::{OrgId, RuleKey};
use crate::error::CadenceError;

/// State of an alert instance after its latest evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    #[default]
    Normal,
    Alerting,
    Pending,
    NoData,
    Error,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Normal => "normal",
            InstanceState::Alerting => "alerting",
            InstanceState::Pending => "pending",
            InstanceState::NoData => "no_data",
            InstanceState::Error => "error",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceState {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(InstanceState::Normal),
            "alerting" => Ok(InstanceState::Alerting),
            "pending" => Ok(InstanceState::Pending),
            "no_data" | "nodata" => Ok(InstanceState::NoData),
            "error" => Ok(InstanceState::Error),
            other => Err(CadenceError::InvalidState(other.to_string())),
        }
    }
}

/// Sorted label set identifying one instance of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceLabels(pub BTreeMap<String, String>);

impl InstanceLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deterministic SHA-256 hex fingerprint of the label set.
    pub fn fingerprint(&self) -> String {
        let joined = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n");
        let digest = Sha256::digest(joined.as_bytes());
        format!("{digest:x}")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InstanceLabels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Latest evaluation outcome for a (rule, label set) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInstance {
    pub key: RuleKey,
    pub labels: InstanceLabels,
    pub labels_hash: String,
    pub current_state: InstanceState,
    /// When the instance entered `current_state`.
    pub current_state_since: DateTime<Utc>,
    pub last_eval_time: DateTime<Utc>,
    /// Evaluation error message, present for `Error` states.
    #[serde(default)]
    pub error: Option<String>,
}

/// Filter for listing instances.
#[derive(Debug, Clone, Default)]
pub struct InstanceQuery {
    pub org_id: OrgId,
    pub uid: Option<String>,
    pub state: Option<InstanceState>,
}

impl InstanceQuery {
    pub fn for_org(org_id: OrgId) -> Self {
        Self {
            org_id,
            ..Default::default()
        }
    }

    pub fn matches(&self, instance: &AlertInstance) -> bool {
        instance.key.org_id == self.org_id
            && self.uid.as_deref().map_or(true, |uid| instance.key.uid == uid)
            && self.state.map_or(true, |s| instance.current_state == s)
    }
}
