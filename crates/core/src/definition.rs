//! Alert definitions, their scheduling projection, and version history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CadenceError;

/// Organization (tenant) identifier.
pub type OrgId = i64;

/// Identity of a rule across the whole system: (organization, rule UID).
///
/// Used as the registry key and correlated between ticks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleKey {
    pub org_id: OrgId,
    pub uid: String,
}

impl RuleKey {
    pub fn new(org_id: OrgId, uid: impl Into<String>) -> Self {
        Self {
            org_id,
            uid: uid.into(),
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org_id, self.uid)
    }
}

/// Parses the `org_id/uid` form produced by [`Display`](fmt::Display).
impl FromStr for RuleKey {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (org, uid) = s
            .split_once('/')
            .ok_or_else(|| CadenceError::InvalidKey(format!("expected org_id/uid, got '{s}'")))?;
        let org_id = org
            .trim()
            .parse()
            .map_err(|_| CadenceError::InvalidKey(format!("invalid org id '{org}'")))?;
        let uid = uid.trim();
        if uid.is_empty() {
            return Err(CadenceError::InvalidKey(format!("empty uid in '{s}'")));
        }
        Ok(Self::new(org_id, uid))
    }
}

/// A rule's full, mutable configuration as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDefinition {
    /// Store-assigned row id.
    pub id: i64,
    pub org_id: OrgId,
    pub uid: String,
    pub title: String,
    /// Reference (query ref id) of the query/expression whose result decides the state.
    pub condition: String,
    /// Serialized queries and expressions.
    pub data: serde_json::Value,
    /// Evaluation interval; a multiple of the scheduler base interval. 0 disables evaluation.
    pub interval_seconds: u64,
    /// Incremented on every update, starting at 1.
    pub version: u64,
    #[serde(default)]
    pub paused: bool,
    pub updated: DateTime<Utc>,
}

impl AlertDefinition {
    pub fn key(&self) -> RuleKey {
        RuleKey::new(self.org_id, self.uid.clone())
    }

    /// Lightweight projection used by the dispatcher on every tick.
    pub fn summary(&self) -> DefinitionSummary {
        DefinitionSummary {
            id: self.id,
            key: self.key(),
            interval_seconds: self.interval_seconds,
            version: self.version,
            paused: self.paused,
        }
    }
}

/// The scheduling-relevant subset of an [`AlertDefinition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionSummary {
    /// Store row id; changes when a key is deleted and created again.
    pub id: i64,
    pub key: RuleKey,
    pub interval_seconds: u64,
    pub version: u64,
    pub paused: bool,
}

/// Immutable snapshot written on every create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDefinitionVersion {
    pub id: i64,
    pub definition_id: i64,
    pub definition_uid: String,
    /// Version this one was derived from; 0 for the initial version.
    pub parent_version: u64,
    pub version: u64,
    pub created: DateTime<Utc>,
    pub title: String,
    pub condition: String,
    pub data: serde_json::Value,
    pub interval_seconds: u64,
}

/// Input for creating a definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAlertDefinition {
    pub org_id: OrgId,
    /// Explicit UID; the store generates one when absent.
    #[serde(default)]
    pub uid: Option<String>,
    pub title: String,
    pub condition: String,
    pub data: serde_json::Value,
    /// Falls back to the store's default interval when absent.
    #[serde(default)]
    pub interval_seconds: Option<u64>,
}

/// Partial update merged into an existing definition.
///
/// `None` (or an empty string) keeps the stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDefinitionUpdate {
    pub key: RuleKey,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub interval_seconds: Option<u64>,
}

impl AlertDefinitionUpdate {
    pub fn for_key(key: RuleKey) -> Self {
        Self {
            key,
            title: None,
            condition: None,
            data: None,
            interval_seconds: None,
        }
    }

    pub fn interval_seconds(mut self, seconds: u64) -> Self {
        self.interval_seconds = Some(seconds);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
