#![warn(rust_2018_idioms)]

mod common;

use common::{secrets, value, PROJECT, SERVICE};
use deployinator::{fake::Op, SecretKind, SecretStore};
use deployinator_definitions::labels;
use k8s_openapi::api::core::v1::Secret;
use maplit::btreemap;

async fn set(s: &deployinator::ServiceSecrets<deployinator::fake::FakeSecretStore>, v: &str) -> bool {
    s.set_service_secret_key(PROJECT, SERVICE, SecretKind::Env, "TOKEN", v.as_bytes())
        .await
        .unwrap()
}

#[tokio::test]
async fn live_secrets_are_created_on_first_access() {
    let s = secrets();
    let env = s.env_vars_for_service(PROJECT, SERVICE).await.unwrap();
    assert_eq!(env.metadata.name.as_deref(), Some("web-env"));
    let l = env.metadata.labels.unwrap();
    assert_eq!(l[labels::SERVICE], SERVICE);
    assert_eq!(l[labels::PROJECT], PROJECT);
    assert_eq!(l[labels::ROLE], labels::ROLE_SERVICE_SECRET);
    assert_eq!(l[labels::SECRET_KIND], "env");

    s.files_for_service(PROJECT, SERVICE).await.unwrap();
    s.certs_for_service(PROJECT, SERVICE).await.unwrap();
    // second access reads
    s.env_vars_for_service(PROJECT, SERVICE).await.unwrap();
    assert_eq!(s.store().writes().await, 3);
    assert_eq!(s.store().names().await, vec!["web-certs", "web-env", "web-files"]);
}

#[tokio::test]
async fn keeps_five_most_recent_versions() {
    let s = secrets();
    for i in 1..=7 {
        assert!(set(&s, &format!("v{}", i)).await);
    }
    let live = s.store().secret("web-env").await.unwrap();
    assert_eq!(value(&live, "TOKEN").as_deref(), Some("v7"));

    let versions = s.service_secret_versions("web-env").await.unwrap();
    let prior: Vec<_> = versions.iter().map(|v| value(v, "TOKEN")).collect();
    let expected: Vec<_> = (2..=6).rev().map(|i| Some(format!("v{}", i))).collect();
    assert_eq!(prior, expected);

    // live plus versions, nothing else
    assert_eq!(s.store().names().await.len(), 6);
    for v in &versions {
        let l = v.metadata.labels.as_ref().unwrap();
        assert_eq!(l[labels::SERVICE_SECRET], "web-env");
        assert!(l[labels::UPDATED_AT].parse::<i64>().is_ok());
        assert!(v.metadata.name.as_ref().unwrap().starts_with("web-env-"));
    }
}

#[tokio::test]
async fn versions_created_within_one_second_keep_update_order() {
    let s = secrets();
    s.store().freeze_clock().await;
    for i in 1..=7 {
        assert!(set(&s, &format!("v{}", i)).await);
    }
    let versions = s.service_secret_versions("web-env").await.unwrap();
    let created: Vec<_> = versions.iter().map(|v| v.metadata.creation_timestamp.clone()).collect();
    assert!(created.windows(2).all(|w| w[0] == w[1]));

    let prior: Vec<_> = versions.iter().map(|v| value(v, "TOKEN")).collect();
    let expected: Vec<_> = (2..=6).rev().map(|i| Some(format!("v{}", i))).collect();
    assert_eq!(prior, expected);
}

#[tokio::test]
async fn identical_update_writes_nothing() {
    let s = secrets();
    set(&s, "same").await;
    let writes = s.store().writes().await;
    let versions = s.service_secret_versions("web-env").await.unwrap().len();

    assert!(!set(&s, "same").await);
    // the same contents given as string data
    let mut again = s.store().secret("web-env").await.unwrap();
    again.data = None;
    again.string_data = Some(btreemap! { "TOKEN".to_string() => "same".to_string() });
    assert!(!s.update_service_secret(again).await.unwrap());

    assert_eq!(s.store().writes().await, writes);
    assert_eq!(s.service_secret_versions("web-env").await.unwrap().len(), versions);
}

#[tokio::test]
async fn update_creates_missing_live_secret_without_version() {
    let s = secrets();
    let mut fresh = Secret::default();
    fresh.metadata.name = Some("worker-env".into());
    fresh.string_data = Some(btreemap! { "A".to_string() => "1".to_string() });
    assert!(s.update_service_secret(fresh).await.unwrap());
    assert!(s.service_secret_versions("worker-env").await.unwrap().is_empty());
    let live = s.store().secret("worker-env").await.unwrap();
    assert_eq!(value(&live, "A").as_deref(), Some("1"));
}

#[tokio::test]
async fn revert_restores_and_consumes_version() {
    let s = secrets();
    for v in &["one", "two", "three"] {
        set(&s, v).await;
    }
    let versions = s.service_secret_versions("web-env").await.unwrap();
    let target = versions
        .iter()
        .find(|v| value(v, "TOKEN").as_deref() == Some("one"))
        .unwrap();
    let target_name = target.metadata.name.clone().unwrap();

    s.revert_service_secret("web-env", &target_name).await.unwrap();

    let live = s.store().secret("web-env").await.unwrap();
    assert_eq!(value(&live, "TOKEN").as_deref(), Some("one"));
    assert!(s.store().secret(&target_name).await.is_none());
    let after = s.service_secret_versions("web-env").await.unwrap();
    // the state reverted away from is now the newest version
    assert_eq!(value(&after[0], "TOKEN").as_deref(), Some("three"));
    assert_eq!(after.len(), versions.len());
}

#[tokio::test]
async fn revert_rejects_foreign_versions() {
    let s = secrets();
    set(&s, "a").await;
    set(&s, "b").await;
    s.set_service_secret_key(PROJECT, "api", SecretKind::Env, "TOKEN", b"x")
        .await
        .unwrap();
    s.set_service_secret_key(PROJECT, "api", SecretKind::Env, "TOKEN", b"y")
        .await
        .unwrap();
    let foreign = s.service_secret_versions("api-env").await.unwrap();
    let name = foreign[0].metadata.name.clone().unwrap();
    assert!(s.revert_service_secret("web-env", &name).await.is_err());
    assert!(s.revert_service_secret("web-env", "web-env-missing").await.is_err());
    // nothing was touched
    assert!(s.store().secret(&name).await.is_some());
}

#[tokio::test]
async fn failures_abort_without_rollback() {
    let s = secrets();
    set(&s, "first").await;
    let before = s.service_secret_versions("web-env").await.unwrap().len();

    s.store().fail_next(Op::Replace).await;
    assert!(s
        .set_service_secret_key(PROJECT, SERVICE, SecretKind::Env, "TOKEN", b"second")
        .await
        .is_err());
    // the snapshot stays, the live secret is unchanged
    assert_eq!(s.service_secret_versions("web-env").await.unwrap().len(), before + 1);
    let live = s.store().secret("web-env").await.unwrap();
    assert_eq!(value(&live, "TOKEN").as_deref(), Some("first"));

    s.store().fail_next(Op::Get).await;
    assert!(s.env_vars_for_service(PROJECT, SERVICE).await.is_err());
}

#[tokio::test]
async fn key_removal() {
    let s = secrets();
    set(&s, "x").await;
    assert!(!s
        .delete_service_secret_key(PROJECT, SERVICE, SecretKind::Env, "MISSING")
        .await
        .unwrap());
    assert!(s
        .delete_service_secret_key(PROJECT, SERVICE, SecretKind::Env, "TOKEN")
        .await
        .unwrap());
    let live = s.store().secret("web-env").await.unwrap();
    assert!(value(&live, "TOKEN").is_none());
}

#[tokio::test]
async fn key_removal_without_secret_writes_nothing() {
    let s = secrets();
    assert!(!s
        .delete_service_secret_key(PROJECT, SERVICE, SecretKind::Files, "TOKEN")
        .await
        .unwrap());
    assert_eq!(s.store().writes().await, 0);
    assert!(s.store().names().await.is_empty());
}

#[tokio::test]
async fn failed_revert_names_the_detached_version() {
    let s = secrets();
    set(&s, "one").await;
    set(&s, "two").await;
    let versions = s.service_secret_versions("web-env").await.unwrap();
    let target = versions[0].metadata.name.clone().unwrap();

    s.store().fail_next(Op::Replace).await;
    let err = s.revert_service_secret("web-env", &target).await.unwrap_err();
    assert!(err.to_string().contains(&target));

    // kept for recovery, no longer listed as a version
    let detached = s.store().secret(&target).await.unwrap();
    assert_eq!(value(&detached, "TOKEN").as_deref(), Some("one"));
    assert!(!detached.metadata.labels.unwrap().contains_key(labels::SERVICE_SECRET));
}

#[tokio::test]
async fn deleting_service_and_project_secrets() {
    let s = secrets();
    set(&s, "a").await;
    set(&s, "b").await;
    s.files_for_service(PROJECT, SERVICE).await.unwrap();
    s.set_service_secret_key(PROJECT, "api", SecretKind::Env, "K", b"1")
        .await
        .unwrap();
    s.set_service_secret_key("other", "billing", SecretKind::Env, "K", b"1")
        .await
        .unwrap();

    s.delete_service_secrets(SERVICE).await.unwrap();
    let names = s.store().names().await;
    assert!(names.iter().all(|n| !n.starts_with("web-")));
    assert!(names.contains(&"api-env".to_string()));

    s.delete_project_secrets(PROJECT).await.unwrap();
    let names = s.store().names().await;
    assert!(names.iter().all(|n| n.starts_with("billing-env")));
    assert!(s.store().get_secret("billing-env").await.unwrap().is_some());
}
