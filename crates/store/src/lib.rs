//! Persistence contract for alert definitions, their version history, and
//! evaluation instances.
//!
//! The scheduler only talks to the [`Store`] trait. [`LocalStore`] is the
//! in-process implementation: purely in memory, or backed by a JSON file
//! that several processes may share.

pub mod error;
pub mod local;
pub mod validation;

use std::sync::Arc;

use async_trait::async_trait;

use cadence_core::{
    AlertDefinition, AlertDefinitionUpdate, AlertDefinitionVersion, AlertInstance,
    DefinitionSummary, InstanceQuery, NewAlertDefinition, OrgId, RuleKey,
};

pub use error::StoreError;
pub use local::LocalStore;
pub use validation::DefinitionValidator;

/// CRUD and query operations consumed by the scheduler and admin tooling.
#[async_trait]
pub trait Store: Send + Sync {
    /// Scheduling projection of every definition, across all organizations.
    async fn list_all(&self) -> Result<Vec<DefinitionSummary>, StoreError>;

    /// Full definitions of one organization.
    async fn list_by_org(&self, org_id: OrgId) -> Result<Vec<AlertDefinition>, StoreError>;

    /// Full definition, or [`StoreError::DefinitionNotFound`].
    async fn get_by_key(&self, key: &RuleKey) -> Result<AlertDefinition, StoreError>;

    /// Validate and insert a definition at version 1, writing its first version row.
    async fn create(&self, new: NewAlertDefinition) -> Result<AlertDefinition, StoreError>;

    /// Merge into an existing definition, bump its version, and write a version row.
    ///
    /// Returns `Ok(None)` when the key is unknown.
    async fn update(
        &self,
        update: AlertDefinitionUpdate,
    ) -> Result<Option<AlertDefinition>, StoreError>;

    /// Delete a definition together with its version history and instances.
    async fn delete_by_key(&self, key: &RuleKey) -> Result<(), StoreError>;

    /// Set the paused flag on the given UIDs of one organization.
    ///
    /// Returns the number of definitions matched.
    async fn set_paused(
        &self,
        org_id: OrgId,
        uids: &[String],
        paused: bool,
    ) -> Result<u64, StoreError>;

    /// Version history of a definition, oldest first.
    async fn list_versions(&self, key: &RuleKey) -> Result<Vec<AlertDefinitionVersion>, StoreError>;

    /// Instance of a rule for one label set, or [`StoreError::InstanceNotFound`].
    async fn get_instance(
        &self,
        key: &RuleKey,
        labels_hash: &str,
    ) -> Result<AlertInstance, StoreError>;

    async fn list_instances(&self, query: &InstanceQuery) -> Result<Vec<AlertInstance>, StoreError>;

    /// Insert or replace the instance identified by (key, labels hash).
    async fn save_instance(&self, instance: AlertInstance) -> Result<(), StoreError>;
}

/// Blanket implementation so `Arc<dyn Store>` can be used directly.
#[async_trait]
impl<T: Store + ?Sized> Store for Arc<T> {
    async fn list_all(&self) -> Result<Vec<DefinitionSummary>, StoreError> {
        (**self).list_all().await
    }

    async fn list_by_org(&self, org_id: OrgId) -> Result<Vec<AlertDefinition>, StoreError> {
        (**self).list_by_org(org_id).await
    }

    async fn get_by_key(&self, key: &RuleKey) -> Result<AlertDefinition, StoreError> {
        (**self).get_by_key(key).await
    }

    async fn create(&self, new: NewAlertDefinition) -> Result<AlertDefinition, StoreError> {
        (**self).create(new).await
    }

    async fn update(
        &self,
        update: AlertDefinitionUpdate,
    ) -> Result<Option<AlertDefinition>, StoreError> {
        (**self).update(update).await
    }

    async fn delete_by_key(&self, key: &RuleKey) -> Result<(), StoreError> {
        (**self).delete_by_key(key).await
    }

    async fn set_paused(
        &self,
        org_id: OrgId,
        uids: &[String],
        paused: bool,
    ) -> Result<u64, StoreError> {
        (**self).set_paused(org_id, uids, paused).await
    }

    async fn list_versions(&self, key: &RuleKey) -> Result<Vec<AlertDefinitionVersion>, StoreError> {
        (**self).list_versions(key).await
    }

    async fn get_instance(
        &self,
        key: &RuleKey,
        labels_hash: &str,
    ) -> Result<AlertInstance, StoreError> {
        (**self).get_instance(key, labels_hash).await
    }

    async fn list_instances(&self, query: &InstanceQuery) -> Result<Vec<AlertInstance>, StoreError> {
        (**self).list_instances(query).await
    }

    async fn save_instance(&self, instance: AlertInstance) -> Result<(), StoreError> {
        (**self).save_instance(instance).await
    }
}
