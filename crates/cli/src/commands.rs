use anyhow::{Context, Result};
use serde_json::{json, Value};

use cadence_core::{AlertDefinitionUpdate, InstanceQuery, NewAlertDefinition};
use cadence_store::Store;

use crate::cli::Command;

/// Run one command against the store and return its JSON output.
pub async fn execute(store: &dyn Store, command: Command) -> Result<Value> {
    let out = match command {
        Command::Create {
            org,
            title,
            condition,
            data,
            interval,
            uid,
        } => {
            let def = store
                .create(NewAlertDefinition {
                    org_id: org,
                    uid,
                    title,
                    condition,
                    data,
                    interval_seconds: interval,
                })
                .await
                .context("failed to create alert definition")?;
            serde_json::to_value(def)?
        }
        Command::Update {
            key,
            title,
            condition,
            data,
            interval,
        } => {
            let update = AlertDefinitionUpdate {
                key: key.clone(),
                title,
                condition,
                data,
                interval_seconds: interval,
            };
            match store
                .update(update)
                .await
                .with_context(|| format!("failed to update {key}"))?
            {
                Some(def) => serde_json::to_value(def)?,
                None => json!({ "updated": false, "key": key.to_string() }),
            }
        }
        Command::Get { key } => {
            let def = store
                .get_by_key(&key)
                .await
                .with_context(|| format!("failed to get {key}"))?;
            serde_json::to_value(def)?
        }
        Command::List { org: None } => serde_json::to_value(store.list_all().await?)?,
        Command::List { org: Some(org) } => serde_json::to_value(store.list_by_org(org).await?)?,
        Command::Delete { key } => {
            store
                .delete_by_key(&key)
                .await
                .with_context(|| format!("failed to delete {key}"))?;
            json!({ "deleted": key.to_string() })
        }
        Command::Pause { org, uids } => {
            let affected = store.set_paused(org, &uids, true).await?;
            json!({ "paused": true, "affected": affected })
        }
        Command::Unpause { org, uids } => {
            let affected = store.set_paused(org, &uids, false).await?;
            json!({ "paused": false, "affected": affected })
        }
        Command::Versions { key } => {
            let versions = store
                .list_versions(&key)
                .await
                .with_context(|| format!("failed to list versions of {key}"))?;
            serde_json::to_value(versions)?
        }
        Command::Instances { org, uid, state } => {
            let query = InstanceQuery {
                org_id: org,
                uid,
                state,
            };
            serde_json::to_value(store.list_instances(&query).await?)?
        }
    };
    Ok(out)
}
