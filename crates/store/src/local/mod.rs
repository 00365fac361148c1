mod file;
mod state;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use cadence_core::config::{SchedulerSettings, StoreSettings};
use cadence_core::{
    AlertDefinition, AlertDefinitionUpdate, AlertDefinitionVersion, AlertInstance,
    DefinitionSummary, InstanceQuery, NewAlertDefinition, OrgId, RuleKey,
};

use crate::error::StoreError;
use crate::validation::DefinitionValidator;
use crate::Store;

use file::{LockMode, SnapshotFile};
use state::StoreState;

const DEFAULT_INTERVAL_SECONDS: u64 = 60;

/// In-process [`Store`] implementation.
///
/// Without a snapshot path everything lives in memory. With one, the JSON
/// file is the source of truth and may be shared by several processes (a
/// worker and the admin CLI). Each operation locks the file, reloads it if
/// another process wrote it, and rewrites it after a mutation (write to a
/// temporary sibling, then rename). File access runs on the blocking pool.
///
/// ```text
/// data/
///   alert_definitions.json       <- definitions, versions, instances
///   alert_definitions.json.lock  <- flock target, shared or exclusive
///   alert_definitions.json.tmp   <- in-flight write, renamed into place
/// ```
pub struct LocalStore {
    state: Arc<RwLock<StoreState>>,
    file: Option<Arc<SnapshotFile>>,
    validator: DefinitionValidator,
    default_interval_seconds: u64,
}

impl LocalStore {
    /// Create an empty, memory-only store.
    pub fn in_memory(base_interval_seconds: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            file: None,
            validator: DefinitionValidator::new(base_interval_seconds),
            default_interval_seconds: DEFAULT_INTERVAL_SECONDS,
        }
    }

    /// Open a file-backed store, loading the snapshot if it exists.
    pub fn open(path: impl Into<PathBuf>, base_interval_seconds: u64) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = SnapshotFile::new(path);
        let mut state = StoreState::default();
        {
            let _lock = file.lock(LockMode::Shared)?;
            file.refresh(&mut state)?;
        }

        info!(path = %file.path().display(), "opened alert definition store");

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            file: Some(Arc::new(file)),
            validator: DefinitionValidator::new(base_interval_seconds),
            default_interval_seconds: DEFAULT_INTERVAL_SECONDS,
        })
    }

    /// Open the file-backed store described by the environment config.
    pub fn from_settings(
        store: &StoreSettings,
        scheduler: &SchedulerSettings,
    ) -> Result<Self, StoreError> {
        Ok(Self::open(&store.data_path, scheduler.base_interval_seconds)?
            .with_default_interval(store.default_interval_seconds))
    }

    /// Interval assigned to definitions created without one.
    pub fn with_default_interval(mut self, seconds: u64) -> Self {
        self.default_interval_seconds = seconds;
        self
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.file.as_deref().map(SnapshotFile::path)
    }

    /// Run a read against the current tables.
    async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&StoreState) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let Some(file) = self.file.clone() else {
            let guard = state.read().map_err(poisoned)?;
            return f(&guard);
        };

        blocking(move || {
            let _lock = file.lock(LockMode::Shared)?;
            let mut guard = state.write().map_err(poisoned)?;
            file.refresh(&mut guard)?;
            f(&guard)
        })
        .await
    }

    /// Apply a mutation. File-backed stores only commit it once the snapshot is written.
    async fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StoreState) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let Some(file) = self.file.clone() else {
            let mut guard = state.write().map_err(poisoned)?;
            return f(&mut guard);
        };

        blocking(move || {
            let _lock = file.lock(LockMode::Exclusive)?;
            let mut guard = state.write().map_err(poisoned)?;
            file.refresh(&mut guard)?;
            let mut next = guard.clone();
            let out = f(&mut next)?;
            file.write(&next)?;
            *guard = next;
            Ok(out)
        })
        .await
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::LockPoisoned(e.to_string())
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
}

#[async_trait]
impl Store for LocalStore {
    async fn list_all(&self) -> Result<Vec<DefinitionSummary>, StoreError> {
        self.read(|state| Ok(state.list_all())).await
    }

    async fn list_by_org(&self, org_id: OrgId) -> Result<Vec<AlertDefinition>, StoreError> {
        self.read(move |state| Ok(state.list_by_org(org_id))).await
    }

    async fn get_by_key(&self, key: &RuleKey) -> Result<AlertDefinition, StoreError> {
        let key = key.clone();
        self.read(move |state| state.get(&key)).await
    }

    async fn create(&self, new: NewAlertDefinition) -> Result<AlertDefinition, StoreError> {
        let validator = self.validator;
        let default_interval = self.default_interval_seconds;
        let def = self
            .mutate(move |state| state.create(new, &validator, default_interval, Utc::now()))
            .await?;
        info!(rule = %def.key(), interval = def.interval_seconds, "alert definition created");
        Ok(def)
    }

    async fn update(
        &self,
        update: AlertDefinitionUpdate,
    ) -> Result<Option<AlertDefinition>, StoreError> {
        let key = update.key.clone();
        let validator = self.validator;
        let updated = self
            .mutate(move |state| state.update(update, &validator, Utc::now()))
            .await?;
        match &updated {
            Some(def) => info!(rule = %key, version = def.version, "alert definition updated"),
            None => debug!(rule = %key, "update of unknown alert definition ignored"),
        }
        Ok(updated)
    }

    async fn delete_by_key(&self, key: &RuleKey) -> Result<(), StoreError> {
        let target = key.clone();
        if self.mutate(move |state| Ok(state.delete(&target))).await? {
            info!(rule = %key, "alert definition deleted");
        }
        Ok(())
    }

    async fn set_paused(
        &self,
        org_id: OrgId,
        uids: &[String],
        paused: bool,
    ) -> Result<u64, StoreError> {
        if uids.is_empty() {
            return Ok(0);
        }
        let uids = uids.to_vec();
        let affected = self
            .mutate(move |state| Ok(state.set_paused(org_id, &uids, paused)))
            .await?;
        info!(org_id, paused, affected, "alert definitions pause flag updated");
        Ok(affected)
    }

    async fn list_versions(&self, key: &RuleKey) -> Result<Vec<AlertDefinitionVersion>, StoreError> {
        let key = key.clone();
        self.read(move |state| state.versions(&key)).await
    }

    async fn get_instance(
        &self,
        key: &RuleKey,
        labels_hash: &str,
    ) -> Result<AlertInstance, StoreError> {
        let key = key.clone();
        let labels_hash = labels_hash.to_string();
        self.read(move |state| state.get_instance(&key, &labels_hash))
            .await
    }

    async fn list_instances(&self, query: &InstanceQuery) -> Result<Vec<AlertInstance>, StoreError> {
        let query = query.clone();
        self.read(move |state| Ok(state.list_instances(&query))).await
    }

    async fn save_instance(&self, instance: AlertInstance) -> Result<(), StoreError> {
        self.mutate(move |state| state.save_instance(instance)).await
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
