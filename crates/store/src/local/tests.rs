use chrono::Utc;
use serde_json::json;

use cadence_core::{
    AlertDefinitionUpdate, AlertInstance, InstanceLabels, InstanceQuery, InstanceState,
    NewAlertDefinition, RuleKey,
};

use super::LocalStore;
use crate::{Store, StoreError};

fn new_def(title: &str, interval_seconds: Option<u64>) -> NewAlertDefinition {
    NewAlertDefinition {
        org_id: 1,
        uid: None,
        title: title.to_string(),
        condition: "A".to_string(),
        data: json!([{"ref_id": "A", "state": "normal"}]),
        interval_seconds,
    }
}

fn instance(key: &RuleKey, labels: InstanceLabels, state: InstanceState) -> AlertInstance {
    let now = Utc::now();
    AlertInstance {
        key: key.clone(),
        labels_hash: labels.fingerprint(),
        labels,
        current_state: state,
        current_state_since: now,
        last_eval_time: now,
        error: None,
    }
}

// -- create --------------------------------------------------------------

#[tokio::test]
async fn create_assigns_uid_version_and_history() {
    let store = LocalStore::in_memory(1);
    let def = store.create(new_def("cpu", Some(5))).await.unwrap();

    assert!(!def.uid.is_empty());
    assert_eq!(def.version, 1);
    assert_eq!(def.interval_seconds, 5);
    assert!(!def.paused);

    let versions = store.list_versions(&def.key()).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, 1);
    assert_eq!(versions[0].parent_version, 0);
    assert_eq!(versions[0].definition_uid, def.uid);
}

#[tokio::test]
async fn create_uses_default_interval() {
    let store = LocalStore::in_memory(10).with_default_interval(120);
    let def = store.create(new_def("cpu", None)).await.unwrap();
    assert_eq!(def.interval_seconds, 120);
}

#[tokio::test]
async fn create_rejects_misaligned_interval() {
    let store = LocalStore::in_memory(10);
    let err = store.create(new_def("cpu", Some(15))).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_rejects_duplicate_title_within_org() {
    let store = LocalStore::in_memory(1);
    store.create(new_def("cpu", Some(1))).await.unwrap();

    let err = store.create(new_def("cpu", Some(1))).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateTitle(ref t) if t == "cpu"));

    let mut other_org = new_def("cpu", Some(1));
    other_org.org_id = 2;
    assert!(store.create(other_org).await.is_ok());
}

#[tokio::test]
async fn create_with_explicit_uid() {
    let store = LocalStore::in_memory(1);
    let mut new = new_def("cpu", Some(1));
    new.uid = Some("fixed".into());
    let def = store.create(new.clone()).await.unwrap();
    assert_eq!(def.key(), RuleKey::new(1, "fixed"));

    new.title = "other".into();
    assert!(matches!(
        store.create(new).await.unwrap_err(),
        StoreError::Validation(_)
    ));
}

// -- update --------------------------------------------------------------

#[tokio::test]
async fn update_merges_and_bumps_version() {
    let store = LocalStore::in_memory(1);
    let def = store.create(new_def("cpu", Some(1))).await.unwrap();

    let updated = store
        .update(AlertDefinitionUpdate::for_key(def.key()).interval_seconds(3))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.version, 2);
    assert_eq!(updated.interval_seconds, 3);
    assert_eq!(updated.title, "cpu");
    assert_eq!(updated.condition, "A");
    assert_eq!(updated.data, def.data);

    let versions = store.list_versions(&def.key()).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[1].parent_version, 1);
    assert_eq!(versions[1].version, 2);
    assert_eq!(versions[1].interval_seconds, 3);
}

#[tokio::test]
async fn update_with_empty_strings_keeps_stored_values() {
    let store = LocalStore::in_memory(1);
    let def = store.create(new_def("cpu", Some(1))).await.unwrap();

    let updated = store
        .update(AlertDefinitionUpdate::for_key(def.key()).title("").condition(""))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.title, "cpu");
    assert_eq!(updated.condition, "A");
}

#[tokio::test]
async fn update_unknown_key_is_noop() {
    let store = LocalStore::in_memory(1);
    let res = store
        .update(AlertDefinitionUpdate::for_key(RuleKey::new(1, "missing")).interval_seconds(2))
        .await
        .unwrap();
    assert!(res.is_none());
}

#[tokio::test]
async fn update_rejects_taking_another_title() {
    let store = LocalStore::in_memory(1);
    store.create(new_def("cpu", Some(1))).await.unwrap();
    let mem = store.create(new_def("mem", Some(1))).await.unwrap();

    let err = store
        .update(AlertDefinitionUpdate::for_key(mem.key()).title("cpu"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateTitle(_)));
    assert_eq!(store.get_by_key(&mem.key()).await.unwrap().version, 1);
}

// -- delete / pause ------------------------------------------------------

#[tokio::test]
async fn delete_cascades_versions_and_instances() {
    let store = LocalStore::in_memory(1);
    let def = store.create(new_def("cpu", Some(1))).await.unwrap();
    let key = def.key();
    store
        .save_instance(instance(&key, InstanceLabels::new(), InstanceState::Alerting))
        .await
        .unwrap();

    store.delete_by_key(&key).await.unwrap();

    assert!(store.get_by_key(&key).await.unwrap_err().is_not_found());
    assert!(store.list_versions(&key).await.is_err());
    assert!(store
        .list_instances(&InstanceQuery::for_org(1))
        .await
        .unwrap()
        .is_empty());

    // Deleting twice is fine.
    store.delete_by_key(&key).await.unwrap();
}

#[tokio::test]
async fn recreated_key_starts_fresh_history() {
    let store = LocalStore::in_memory(1);
    let mut new = new_def("cpu", Some(1));
    new.uid = Some("same".into());
    let first = store.create(new.clone()).await.unwrap();
    store
        .update(AlertDefinitionUpdate::for_key(first.key()).interval_seconds(2))
        .await
        .unwrap();
    store.delete_by_key(&first.key()).await.unwrap();

    let second = store.create(new).await.unwrap();
    assert_eq!(second.key(), first.key());
    assert_eq!(second.version, 1);
    assert_ne!(second.id, first.id);
    assert_eq!(store.list_versions(&second.key()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn set_paused_reports_affected_count() {
    let store = LocalStore::in_memory(1);
    let a = store.create(new_def("a", Some(1))).await.unwrap();
    let b = store.create(new_def("b", Some(1))).await.unwrap();

    let uids = vec![a.uid.clone(), b.uid.clone(), "missing".to_string()];
    assert_eq!(store.set_paused(1, &uids, true).await.unwrap(), 2);
    assert_eq!(store.set_paused(2, &uids, true).await.unwrap(), 0);
    assert_eq!(store.set_paused(1, &[], true).await.unwrap(), 0);

    let summaries = store.list_all().await.unwrap();
    assert!(summaries.iter().all(|s| s.paused));

    store.set_paused(1, &[a.uid.clone()], false).await.unwrap();
    assert!(!store.get_by_key(&a.key()).await.unwrap().paused);
    // Pausing does not create a new version.
    assert_eq!(store.get_by_key(&a.key()).await.unwrap().version, 1);
}

// -- listing -------------------------------------------------------------

#[tokio::test]
async fn list_all_spans_orgs_and_list_by_org_filters() {
    let store = LocalStore::in_memory(1);
    store.create(new_def("a", Some(1))).await.unwrap();
    let mut other = new_def("b", Some(2));
    other.org_id = 2;
    store.create(other).await.unwrap();

    let all = store.list_all().await.unwrap();
    assert_eq!(all.len(), 2);

    let org2 = store.list_by_org(2).await.unwrap();
    assert_eq!(org2.len(), 1);
    assert_eq!(org2[0].title, "b");
}

// -- instances -----------------------------------------------------------

#[tokio::test]
async fn instances_are_keyed_by_label_fingerprint() {
    let store = LocalStore::in_memory(1);
    let key = store.create(new_def("cpu", Some(1))).await.unwrap().key();

    let host_a = InstanceLabels::new().with("host", "a");
    let host_b = InstanceLabels::new().with("host", "b");
    store
        .save_instance(instance(&key, host_a.clone(), InstanceState::Normal))
        .await
        .unwrap();
    store
        .save_instance(instance(&key, host_b.clone(), InstanceState::Alerting))
        .await
        .unwrap();
    store
        .save_instance(instance(&key, host_a.clone(), InstanceState::Error))
        .await
        .unwrap();

    let a = store.get_instance(&key, &host_a.fingerprint()).await.unwrap();
    assert_eq!(a.current_state, InstanceState::Error);

    let all = store.list_instances(&InstanceQuery::for_org(1)).await.unwrap();
    assert_eq!(all.len(), 2);

    let alerting = store
        .list_instances(&InstanceQuery {
            state: Some(InstanceState::Alerting),
            ..InstanceQuery::for_org(1)
        })
        .await
        .unwrap();
    assert_eq!(alerting.len(), 1);
    assert_eq!(alerting[0].labels, host_b);
}

#[tokio::test]
async fn instance_for_unknown_rule_is_rejected() {
    let store = LocalStore::in_memory(1);
    let key = RuleKey::new(1, "ghost");
    let err = store
        .save_instance(instance(&key, InstanceLabels::new(), InstanceState::Normal))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DefinitionNotFound(_)));
    assert!(store.get_instance(&key, "nope").await.unwrap_err().is_not_found());
}

// -- file-backed ---------------------------------------------------------

#[tokio::test]
async fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("defs.json");

    let key = {
        let store = LocalStore::open(&path, 1).unwrap();
        let def = store.create(new_def("cpu", Some(2))).await.unwrap();
        store
            .update(AlertDefinitionUpdate::for_key(def.key()).interval_seconds(4))
            .await
            .unwrap();
        store.set_paused(1, &[def.uid.clone()], true).await.unwrap();
        store
            .save_instance(instance(&def.key(), InstanceLabels::new(), InstanceState::NoData))
            .await
            .unwrap();
        def.key()
    };

    assert!(path.exists());

    let reopened = LocalStore::open(&path, 1).unwrap();
    let def = reopened.get_by_key(&key).await.unwrap();
    assert_eq!(def.version, 2);
    assert_eq!(def.interval_seconds, 4);
    assert!(def.paused);
    assert_eq!(reopened.list_versions(&key).await.unwrap().len(), 2);
    assert_eq!(
        reopened
            .list_instances(&InstanceQuery::for_org(1))
            .await
            .unwrap()[0]
            .current_state,
        InstanceState::NoData
    );

    // Ids keep increasing after reload.
    let next = reopened.create(new_def("mem", Some(1))).await.unwrap();
    assert!(next.id > def.id);
}

#[tokio::test]
async fn failed_validation_leaves_snapshot_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("defs.json");
    let store = LocalStore::open(&path, 10).unwrap();

    assert!(store.create(new_def("cpu", Some(7))).await.is_err());
    assert!(!path.exists());
}

#[tokio::test]
async fn stores_sharing_a_file_see_each_others_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("defs.json");

    let worker = LocalStore::open(&path, 1).unwrap();
    let a = worker.create(new_def("a", Some(1))).await.unwrap();

    let admin = LocalStore::open(&path, 1).unwrap();
    let b = admin.create(new_def("b", Some(1))).await.unwrap();

    let mut keys: Vec<_> = worker
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.key)
        .collect();
    keys.sort();
    let mut expected = vec![a.key(), b.key()];
    expected.sort();
    assert_eq!(keys, expected);

    // A write from the worker keeps the admin's definition on disk.
    worker
        .save_instance(instance(&a.key(), InstanceLabels::new(), InstanceState::Normal))
        .await
        .unwrap();
    let reopened = LocalStore::open(&path, 1).unwrap();
    assert_eq!(reopened.get_by_key(&b.key()).await.unwrap().title, "b");
    assert_eq!(
        reopened
            .list_instances(&InstanceQuery::for_org(1))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn changes_from_another_store_reach_the_reader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("defs.json");

    let worker = LocalStore::open(&path, 1).unwrap();
    let def = worker.create(new_def("cpu", Some(1))).await.unwrap();
    let admin = LocalStore::open(&path, 1).unwrap();

    admin
        .update(AlertDefinitionUpdate::for_key(def.key()).interval_seconds(5))
        .await
        .unwrap();
    let summary = &worker.list_all().await.unwrap()[0];
    assert_eq!(summary.version, 2);
    assert_eq!(summary.interval_seconds, 5);

    admin.set_paused(1, &[def.uid.clone()], true).await.unwrap();
    assert!(worker.list_all().await.unwrap()[0].paused);

    admin.delete_by_key(&def.key()).await.unwrap();
    assert!(worker.list_all().await.unwrap().is_empty());
    assert!(worker.get_by_key(&def.key()).await.unwrap_err().is_not_found());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_on_one_file_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("defs.json");

    let mut tasks = Vec::new();
    for writer in 0..4 {
        let store = LocalStore::open(&path, 1).unwrap();
        tasks.push(tokio::spawn(async move {
            for n in 0..5 {
                store
                    .create(new_def(&format!("w{writer}-{n}"), Some(1)))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let store = LocalStore::open(&path, 1).unwrap();
    assert_eq!(store.list_all().await.unwrap().len(), 20);
}
