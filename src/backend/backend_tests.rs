use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::*;
use crate::error::AppError;
use crate::storage::{InmemStorage, Storage};

fn stores() -> (Arc<InmemStorage>, ConfigStore, RoleStore) {
    let mem = Arc::new(InmemStorage::new());
    let storage: Arc<dyn Storage> = mem.clone();
    (mem, ConfigStore::new(storage.clone()), RoleStore::new(storage))
}

fn update(v: serde_json::Value) -> RoleUpdate { serde_json::from_value(v).unwrap() }

#[tokio::test]
async fn config_create_read_update_delete_roundtrip() {
    let (_, cfg, _) = stores();
    assert!(cfg.get().await.unwrap().is_none());
    cfg.create(ConfigEntry::new("ocid1.tenancy.oc1..aaa")).await.unwrap();
    assert_eq!(cfg.get().await.unwrap().unwrap().home_tenancy_id, "ocid1.tenancy.oc1..aaa");
    cfg.update(ConfigEntry::new("ocid1.tenancy.oc1..bbb")).await.unwrap();
    assert_eq!(cfg.get().await.unwrap().unwrap().home_tenancy_id, "ocid1.tenancy.oc1..bbb");
    cfg.delete().await.unwrap();
    assert!(cfg.get().await.unwrap().is_none());
    // second delete is a no-op
    cfg.delete().await.unwrap();
}

#[tokio::test]
async fn config_create_twice_is_already_exists() {
    let (_, cfg, _) = stores();
    cfg.create(ConfigEntry::new("t1")).await.unwrap();
    let err = cfg.create(ConfigEntry::new("t2")).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists { .. }));
    assert_eq!(cfg.get().await.unwrap().unwrap().home_tenancy_id, "t1");
}

#[tokio::test]
async fn config_update_missing_is_not_found_and_blank_is_validation() {
    let (mem, cfg, _) = stores();
    assert!(matches!(cfg.update(ConfigEntry::new("t1")).await, Err(AppError::NotFound { .. })));
    assert!(matches!(cfg.create(ConfigEntry::new("   ")).await, Err(AppError::Validation { .. })));
    cfg.create(ConfigEntry::new("t1")).await.unwrap();
    assert!(matches!(cfg.update(ConfigEntry::new("")).await, Err(AppError::Validation { .. })));
    assert_eq!(mem.len(), 1);
}

#[tokio::test]
async fn config_write_dispatches_on_existence() {
    let (_, cfg, _) = stores();
    cfg.write(ConfigEntry::new("t1")).await.unwrap();
    cfg.write(ConfigEntry::new("t2")).await.unwrap();
    assert_eq!(cfg.get().await.unwrap().unwrap(), ConfigEntry::new("t2"));
}

#[tokio::test]
async fn role_create_read_and_response_shape() {
    let (_, _, roles) = stores();
    let created = roles.create_or_update("DevRole", update(json!({
        "description": "My dev role",
        "ocid_list": "ocid1,ocid2",
        "token_policies": "policy1,policy2",
        "token_ttl": 1500
    })), true).await.unwrap();
    assert_eq!(created.role, "devrole");
    let got = roles.get("devrole").await.unwrap().unwrap();
    assert_eq!(got.allowed_group_ids, vec!["ocid1".to_string(), "ocid2".to_string()]);
    assert_eq!(got.token_params.token_ttl, Duration::from_secs(1500));
    let resp = got.to_response();
    assert_eq!(resp["role"], "devrole");
    assert_eq!(resp["allowedGroupIds"], json!(["ocid1", "ocid2"]));
    assert_eq!(resp["token_policies"], json!(["policy1", "policy2"]));
    assert_eq!(resp["token_ttl"], 1500);
}

#[tokio::test]
async fn role_empty_allow_list_reads_as_empty_array() {
    let (_, _, roles) = stores();
    roles.create_or_update("opsrole", update(json!({"ocid_list": "", "token_policies": "policy3"})), true).await.unwrap();
    let resp = roles.get("opsrole").await.unwrap().unwrap().to_response();
    assert_eq!(resp["allowedGroupIds"], json!([]));
}

#[tokio::test]
async fn role_update_missing_is_not_found() {
    let (mem, _, roles) = stores();
    let err = roles.create_or_update("ghost", RoleUpdate::default().with_groups(["g1"]), false).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    assert!(mem.is_empty());
}

#[tokio::test]
async fn role_update_keeps_unspecified_fields() {
    let (_, _, roles) = stores();
    roles.create_or_update("kwrole", update(json!({"allowedGroupIds": ["g1"], "token_policies": ["policy1", "policy5"], "token_ttl": 1000})), true).await.unwrap();
    roles.create_or_update("kwrole", update(json!({"token_ttl": 2000})), false).await.unwrap();
    let r = roles.get("kwrole").await.unwrap().unwrap();
    assert_eq!(r.allowed_group_ids, vec!["g1".to_string()]);
    assert_eq!(r.token_params.token_policies, vec!["policy1".to_string(), "policy5".to_string()]);
    assert_eq!(r.token_params.token_ttl, Duration::from_secs(2000));
}

#[tokio::test]
async fn role_over_limit_is_rejected_and_not_persisted() {
    let (mem, _, roles) = stores();
    let ids: Vec<String> = (0..=MAX_GROUP_IDS_PER_ROLE).map(|i| format!("ocid1.group.{}", i)).collect();
    let err = roles.create_or_update("bigrole", RoleUpdate::default().with_groups(ids.clone()), true).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert!(mem.is_empty());

    // exactly at the limit is fine
    roles.create_or_update("bigrole", RoleUpdate::default().with_groups(ids[..MAX_GROUP_IDS_PER_ROLE].to_vec()), true).await.unwrap();
    // an over-limit update leaves the stored list alone
    assert!(roles.create_or_update("bigrole", RoleUpdate::default().with_groups(ids.clone()), false).await.is_err());
    assert_eq!(roles.get("bigrole").await.unwrap().unwrap().allowed_group_ids.len(), MAX_GROUP_IDS_PER_ROLE);
}

#[tokio::test]
async fn role_invalid_token_params_rejected() {
    let (mem, _, roles) = stores();
    let err = roles.create_or_update("r1", update(json!({"token_ttl": 100, "token_max_ttl": 10})), true).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert!(mem.is_empty());
}

#[tokio::test]
async fn role_names_are_validated() {
    let (_, _, roles) = stores();
    assert!(matches!(roles.get("").await, Err(AppError::Validation { .. })));
    assert!(matches!(roles.get("bad/name").await, Err(AppError::Validation { .. })));
    assert!(matches!(roles.delete("-lead").await, Err(AppError::Validation { .. })));
    assert_eq!(normalize_role_name(" Dev.Role-1 ").unwrap(), "dev.role-1");
}

#[tokio::test]
async fn role_delete_is_idempotent_and_list_returns_names() {
    let (_, _, roles) = stores();
    for n in ["kwrole", "devrole", "opsrole"] {
        roles.create_or_update(n, RoleUpdate::default(), true).await.unwrap();
    }
    assert_eq!(roles.list().await.unwrap(), vec!["devrole", "kwrole", "opsrole"]);
    roles.delete("opsrole").await.unwrap();
    roles.delete("opsrole").await.unwrap();
    assert_eq!(roles.list().await.unwrap(), vec!["devrole", "kwrole"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_role_creation_both_succeed() {
    let (_, _, roles) = stores();
    let roles = Arc::new(roles);
    let (a, b) = {
        let r1 = roles.clone();
        let r2 = roles.clone();
        let t1 = tokio::spawn(async move {
            r1.write("devrole", update(json!({"ocid_list": "g1,g2", "token_policies": "policy1,policy2", "token_ttl": 1500}))).await
        });
        let t2 = tokio::spawn(async move {
            r2.write("kwrole", update(json!({"ocid_list": "g1", "token_policies": "policy1,policy5", "token_ttl": 1000}))).await
        });
        (t1.await.unwrap(), t2.await.unwrap())
    };
    assert!(a.is_ok() && b.is_ok());
    let dev = roles.get("devrole").await.unwrap().unwrap();
    let kw = roles.get("kwrole").await.unwrap().unwrap();
    assert_eq!(dev.token_params.token_ttl, Duration::from_secs(1500));
    assert_eq!(dev.token_params.token_policies, vec!["policy1", "policy2"]);
    assert_eq!(kw.token_params.token_ttl, Duration::from_secs(1000));
    assert_eq!(kw.token_params.token_policies, vec!["policy1", "policy5"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_config_creates_yield_one_winner() {
    let (_, cfg, _) = stores();
    let cfg = Arc::new(cfg);
    let mut handles = Vec::new();
    for i in 0..8 {
        let c = cfg.clone();
        handles.push(tokio::spawn(async move { c.create(ConfigEntry::new(format!("t{}", i))).await }));
    }
    let results = futures::future::join_all(handles).await;
    let ok = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
    let exists = results.iter().filter(|r| matches!(r, Ok(Err(AppError::AlreadyExists { .. })))).count();
    crate::tprintln!("concurrent config creates: ok={} exists={}", ok, exists);
    assert_eq!(ok, 1);
    assert_eq!(exists, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_config_writes_all_succeed() {
    let (_, cfg, _) = stores();
    let cfg = Arc::new(cfg);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let c = cfg.clone();
            tokio::spawn(async move { c.write(ConfigEntry::new(format!("t{}", i))).await })
        })
        .collect();
    for r in futures::future::join_all(handles).await {
        assert!(matches!(r, Ok(Ok(_))), "write failed: {:?}", r);
    }
    let stored = cfg.get().await.unwrap().unwrap().home_tenancy_id;
    assert!((0..8).any(|i| stored == format!("t{}", i)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_role_writes_and_deletes_never_fail() {
    let (_, _, roles) = stores();
    let roles = Arc::new(roles);
    let mut handles = Vec::new();
    for i in 0..8 {
        let r = roles.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                r.write("devrole", RoleUpdate::default().with_groups([format!("g{}", i)])).await.map(|_| ())
            } else {
                r.delete("devrole").await
            }
        }));
    }
    for r in futures::future::join_all(handles).await {
        assert!(matches!(r, Ok(Ok(()))), "role op failed: {:?}", r);
    }
}
