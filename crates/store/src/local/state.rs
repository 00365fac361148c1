//! In-memory tables behind [`LocalStore`](super::LocalStore).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::{
    AlertDefinition, AlertDefinitionUpdate, AlertDefinitionVersion, AlertInstance,
    DefinitionSummary, InstanceQuery, NewAlertDefinition, OrgId, RuleKey,
};

use crate::error::StoreError;
use crate::validation::DefinitionValidator;

/// Attempts at drawing a UID that is unused within the organization.
const UID_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    next_definition_id: i64,
    next_version_id: i64,
    definitions: BTreeMap<RuleKey, AlertDefinition>,
    versions: Vec<AlertDefinitionVersion>,
    instances: BTreeMap<(RuleKey, String), AlertInstance>,
}

/// On-disk form of [`StoreState`]; JSON maps need string keys, so tables are lists.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    #[serde(default)]
    next_definition_id: i64,
    #[serde(default)]
    next_version_id: i64,
    #[serde(default)]
    definitions: Vec<AlertDefinition>,
    #[serde(default)]
    versions: Vec<AlertDefinitionVersion>,
    #[serde(default)]
    instances: Vec<AlertInstance>,
}

impl From<Snapshot> for StoreState {
    fn from(snapshot: Snapshot) -> Self {
        let definitions: BTreeMap<_, _> = snapshot
            .definitions
            .into_iter()
            .map(|d| (d.key(), d))
            .collect();
        let max_def_id = definitions.values().map(|d| d.id).max().unwrap_or(0);
        let max_version_id = snapshot.versions.iter().map(|v| v.id).max().unwrap_or(0);
        Self {
            next_definition_id: snapshot.next_definition_id.max(max_def_id),
            next_version_id: snapshot.next_version_id.max(max_version_id),
            definitions,
            versions: snapshot.versions,
            instances: snapshot
                .instances
                .into_iter()
                .map(|i| ((i.key.clone(), i.labels_hash.clone()), i))
                .collect(),
        }
    }
}

impl From<&StoreState> for Snapshot {
    fn from(state: &StoreState) -> Self {
        Self {
            next_definition_id: state.next_definition_id,
            next_version_id: state.next_version_id,
            definitions: state.definitions.values().cloned().collect(),
            versions: state.versions.clone(),
            instances: state.instances.values().cloned().collect(),
        }
    }
}

impl StoreState {
    // ── Definitions ─────────────────────────────────────────────

    pub(crate) fn list_all(&self) -> Vec<DefinitionSummary> {
        self.definitions.values().map(AlertDefinition::summary).collect()
    }

    pub(crate) fn list_by_org(&self, org_id: OrgId) -> Vec<AlertDefinition> {
        self.definitions
            .values()
            .filter(|d| d.org_id == org_id)
            .cloned()
            .collect()
    }

    pub(crate) fn get(&self, key: &RuleKey) -> Result<AlertDefinition, StoreError> {
        self.definitions
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::DefinitionNotFound(key.clone()))
    }

    pub(crate) fn create(
        &mut self,
        new: NewAlertDefinition,
        validator: &DefinitionValidator,
        default_interval_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<AlertDefinition, StoreError> {
        let uid = match new.uid.filter(|u| !u.trim().is_empty()) {
            Some(uid) => {
                if self.definitions.contains_key(&RuleKey::new(new.org_id, uid.clone())) {
                    return Err(StoreError::Validation(format!(
                        "uid '{uid}' is already in use"
                    )));
                }
                uid
            }
            None => self.generate_uid(new.org_id, &new.title)?,
        };

        let mut def = AlertDefinition {
            id: 0,
            org_id: new.org_id,
            uid,
            title: new.title,
            condition: new.condition,
            data: new.data,
            interval_seconds: new.interval_seconds.unwrap_or(default_interval_seconds),
            version: 1,
            paused: false,
            updated: now,
        };

        validator.validate(&def, true)?;
        self.ensure_unique_title(&def)?;

        self.next_definition_id += 1;
        def.id = self.next_definition_id;

        self.push_version(&def, 0);
        self.definitions.insert(def.key(), def.clone());
        Ok(def)
    }

    pub(crate) fn update(
        &mut self,
        update: AlertDefinitionUpdate,
        validator: &DefinitionValidator,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertDefinition>, StoreError> {
        let Some(existing) = self.definitions.get(&update.key) else {
            return Ok(None);
        };

        let mut def = existing.clone();
        if let Some(title) = update.title.filter(|t| !t.is_empty()) {
            def.title = title;
        }
        if let Some(condition) = update.condition.filter(|c| !c.is_empty()) {
            def.condition = condition;
        }
        if let Some(data) = update.data {
            def.data = data;
        }
        if let Some(interval) = update.interval_seconds {
            def.interval_seconds = interval;
        }

        validator.validate(&def, false)?;
        self.ensure_unique_title(&def)?;

        let parent_version = def.version;
        def.version += 1;
        def.updated = now;

        self.push_version(&def, parent_version);
        self.definitions.insert(def.key(), def.clone());
        Ok(Some(def))
    }

    /// Remove a definition, its versions, and its instances. Returns whether it existed.
    pub(crate) fn delete(&mut self, key: &RuleKey) -> bool {
        let Some(def) = self.definitions.remove(key) else {
            return false;
        };
        self.versions.retain(|v| v.definition_id != def.id);
        self.instances.retain(|(k, _), _| k != key);
        true
    }

    pub(crate) fn set_paused(&mut self, org_id: OrgId, uids: &[String], paused: bool) -> u64 {
        let mut affected = 0;
        for uid in uids {
            if let Some(def) = self.definitions.get_mut(&RuleKey::new(org_id, uid.clone())) {
                def.paused = paused;
                affected += 1;
            }
        }
        affected
    }

    pub(crate) fn versions(&self, key: &RuleKey) -> Result<Vec<AlertDefinitionVersion>, StoreError> {
        let def = self.get(key)?;
        Ok(self
            .versions
            .iter()
            .filter(|v| v.definition_id == def.id)
            .cloned()
            .collect())
    }

    // ── Instances ───────────────────────────────────────────────

    pub(crate) fn get_instance(
        &self,
        key: &RuleKey,
        labels_hash: &str,
    ) -> Result<AlertInstance, StoreError> {
        self.instances
            .get(&(key.clone(), labels_hash.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::InstanceNotFound {
                key: key.clone(),
                labels_hash: labels_hash.to_string(),
            })
    }

    pub(crate) fn list_instances(&self, query: &InstanceQuery) -> Vec<AlertInstance> {
        self.instances
            .values()
            .filter(|i| query.matches(i))
            .cloned()
            .collect()
    }

    /// Upsert an instance. Instances of unknown (e.g. just deleted) rules are rejected.
    pub(crate) fn save_instance(&mut self, instance: AlertInstance) -> Result<(), StoreError> {
        if !self.definitions.contains_key(&instance.key) {
            return Err(StoreError::DefinitionNotFound(instance.key));
        }
        self.instances
            .insert((instance.key.clone(), instance.labels_hash.clone()), instance);
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn push_version(&mut self, def: &AlertDefinition, parent_version: u64) {
        self.next_version_id += 1;
        self.versions.push(AlertDefinitionVersion {
            id: self.next_version_id,
            definition_id: def.id,
            definition_uid: def.uid.clone(),
            parent_version,
            version: def.version,
            created: def.updated,
            title: def.title.clone(),
            condition: def.condition.clone(),
            data: def.data.clone(),
            interval_seconds: def.interval_seconds,
        });
    }

    fn ensure_unique_title(&self, def: &AlertDefinition) -> Result<(), StoreError> {
        let taken = self
            .definitions
            .values()
            .any(|d| d.org_id == def.org_id && d.uid != def.uid && d.title == def.title);
        if taken {
            return Err(StoreError::DuplicateTitle(def.title.clone()));
        }
        Ok(())
    }

    fn generate_uid(&self, org_id: OrgId, title: &str) -> Result<String, StoreError> {
        for _ in 0..UID_ATTEMPTS {
            let uid = short_uid();
            if !self.definitions.contains_key(&RuleKey::new(org_id, uid.clone())) {
                return Ok(uid);
            }
        }
        Err(StoreError::UidGeneration(title.to_string()))
    }
}

fn short_uid() -> String {
    let mut uid = uuid::Uuid::new_v4().simple().to_string();
    uid.truncate(10);
    uid
}
