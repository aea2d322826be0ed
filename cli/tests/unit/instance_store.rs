//! File-backed stores against a temporary home.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use hatchery_cli::application::ports::{InstanceRepository, SecretsStore};
use hatchery_cli::domain::config::Secrets;
use hatchery_cli::infra::secrets::FileSecretsStore;
use hatchery_cli::infra::state::JsonInstanceRepository;
use hatchery_common::{AmcpStatus, InstanceStatus};

use crate::helpers::instance;

#[tokio::test]
async fn test_instance_repository_put_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let repo = JsonInstanceRepository::with_dir(dir.path().join("instances"));

    let mut record = instance("alpha");
    record.status = InstanceStatus::Degraded;
    record.amcp_status = AmcpStatus::Bootstrapped;
    record.last_checkpoint_cid = Some("bafyStored".to_string());
    repo.put(&record).await.unwrap();

    let loaded = repo.get("alpha").await.unwrap().unwrap();
    assert_eq!(loaded, record);
    assert!(repo.get("bravo").await.unwrap().is_none());
}

#[tokio::test]
async fn test_instance_repository_file_is_camel_case_json() {
    let dir = tempfile::tempdir().unwrap();
    let repo = JsonInstanceRepository::with_dir(dir.path().to_path_buf());
    repo.put(&instance("alpha")).await.unwrap();

    let raw = std::fs::read_to_string(dir.path().join("alpha.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["sshUser"], "root");
    assert_eq!(value["amcpStatus"], "absent");
    assert!(!dir.path().join("alpha.json.tmp").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_instance_repository_file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let repo = JsonInstanceRepository::with_dir(dir.path().to_path_buf());
    repo.put(&instance("alpha")).await.unwrap();

    let mode = std::fs::metadata(dir.path().join("alpha.json"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn test_instance_repository_list_is_sorted_and_skips_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let repo = JsonInstanceRepository::with_dir(dir.path().to_path_buf());
    repo.put(&instance("charlie")).await.unwrap();
    repo.put(&instance("alpha")).await.unwrap();
    std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

    let names: Vec<String> = repo
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, ["alpha", "charlie"]);
}

#[tokio::test]
async fn test_instance_repository_missing_dir_lists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let repo = JsonInstanceRepository::with_dir(dir.path().join("absent"));
    assert!(repo.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_instance_repository_rejects_path_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let repo = JsonInstanceRepository::with_dir(dir.path().to_path_buf());
    assert!(repo.get("../escape").await.is_err());
}

#[tokio::test]
async fn test_secrets_store_round_trip_and_default_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSecretsStore::with_dir(dir.path().join("secrets"));

    assert!(store.load("alpha").await.unwrap().is_empty());

    let mut secrets = Secrets::new();
    secrets.insert("pinata_jwt".to_string(), "jwt-value".to_string());
    store.save("alpha", &secrets).await.unwrap();

    assert_eq!(store.load("alpha").await.unwrap(), secrets);
}

#[cfg(unix)]
#[tokio::test]
async fn test_secrets_store_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let secrets_dir = dir.path().join("secrets");
    let store = FileSecretsStore::with_dir(secrets_dir.clone());
    store.save("alpha", &Secrets::new()).await.unwrap();

    let dir_mode = std::fs::metadata(&secrets_dir).unwrap().permissions().mode();
    let file_mode = std::fs::metadata(secrets_dir.join("alpha.json"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(dir_mode & 0o777, 0o700);
    assert_eq!(file_mode & 0o777, 0o600);
}
