//! Registry property tests: duplicate-safe enrollment, ownership-checked
//! removal, idempotent missing flags, self-healing compaction, and the
//! rollback-to-last-snapshot guarantee on persistence failure.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use herd_shared::error::HerdError;
use herd_shared::model::UserRecord;
use herdd::registry::Registry;
use herdd::store::{Store, USERS_FILE};

fn open(dir: &Path) -> Registry {
    Registry::open(Store::new(dir)).unwrap()
}

async fn seed_owner(registry: &Registry) {
    registry.upsert_user(&"41".to_string(), "Astrid").await.unwrap();
    registry
        .enroll(&"41".to_string(), &"12".to_string(), "Bessie", &"file-b".to_string())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_repeated_enrollment_lists_once() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());
    registry.upsert_user(&"41".to_string(), "Astrid").await.unwrap();

    for _ in 0..3 {
        registry
            .enroll(&"41".to_string(), &"12".to_string(), "Bessie", &"file-b".to_string())
            .await
            .unwrap();
    }

    let herd = registry.list(&"41".to_string()).await.unwrap();
    assert_eq!(herd.len(), 1);
    assert_eq!(herd[0].0, "12");
    assert_eq!(herd[0].1.name, "Bessie");
}

#[tokio::test]
async fn test_remove_deletes_and_cascades_missing() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());
    seed_owner(&registry).await;

    registry
        .mark_missing(&"41".to_string(), &"12".to_string())
        .await
        .unwrap();
    assert!(registry.missing_ids().await.contains("12"));

    registry.remove(&"41".to_string(), &"12".to_string()).await.unwrap();
    assert!(registry.list(&"41".to_string()).await.unwrap().is_empty());
    assert!(registry.animal(&"12".to_string()).await.is_none());
    // No dangling missing entry survives the animal.
    assert!(registry.missing_ids().await.is_empty());
}

#[tokio::test]
async fn test_remove_by_non_owner_is_rejected_and_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());
    seed_owner(&registry).await;
    registry.upsert_user(&"99".to_string(), "Rolf").await.unwrap();

    let err = registry
        .remove(&"99".to_string(), &"12".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, HerdError::Ownership { .. }));

    assert!(registry.animal(&"12".to_string()).await.is_some());
    assert_eq!(registry.list(&"41".to_string()).await.unwrap().len(), 1);

    // Disk agrees with memory.
    let reopened = open(dir.path());
    assert!(reopened.animal(&"12".to_string()).await.is_some());
}

#[tokio::test]
async fn test_mark_missing_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());
    seed_owner(&registry).await;

    let first = registry
        .mark_missing(&"41".to_string(), &"12".to_string())
        .await
        .unwrap();
    let second = registry
        .mark_missing(&"41".to_string(), &"12".to_string())
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(registry.missing_ids().await.len(), 1);
}

#[tokio::test]
async fn test_mark_missing_requires_ownership() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());
    seed_owner(&registry).await;

    let err = registry
        .mark_missing(&"99".to_string(), &"12".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, HerdError::Ownership { .. }));
    assert!(registry.missing_ids().await.is_empty());
}

#[tokio::test]
async fn test_list_compacts_duplicates_accumulated_in_storage() {
    let dir = tempfile::tempdir().unwrap();

    // Hand-write a users document with a duplicated id, as the unguarded
    // original could accumulate.
    let mut users = HashMap::new();
    users.insert(
        "41".to_string(),
        UserRecord {
            name: "Astrid".to_string(),
            animals: vec!["12".to_string(), "12".to_string(), "7".to_string()],
        },
    );
    fs::write(
        dir.path().join(USERS_FILE),
        serde_json::to_vec_pretty(&users).unwrap(),
    )
    .unwrap();

    let registry = open(dir.path());
    // Only "12" has a record; "7" is listed but unknown and is skipped.
    registry
        .enroll(&"41".to_string(), &"12".to_string(), "Bessie", &"file-b".to_string())
        .await
        .unwrap();

    let herd = registry.list(&"41".to_string()).await.unwrap();
    assert_eq!(herd.iter().filter(|(id, _)| id == "12").count(), 1);

    // The compacted list was persisted: a fresh load sees no duplicates.
    let reopened = open(dir.path());
    let herd = reopened.list(&"41".to_string()).await.unwrap();
    assert_eq!(herd.iter().filter(|(id, _)| id == "12").count(), 1);
}

#[tokio::test]
async fn test_enrollment_collision_overwrites_and_reassigns() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());
    seed_owner(&registry).await;
    registry.upsert_user(&"99".to_string(), "Rolf").await.unwrap();

    // The identifier mapped Rolf's animal to the same class.
    registry
        .enroll(&"99".to_string(), &"12".to_string(), "Dagros", &"file-d".to_string())
        .await
        .unwrap();

    let animal = registry.animal(&"12".to_string()).await.unwrap();
    assert_eq!(animal.name, "Dagros");
    assert_eq!(animal.owner, "99");
    // The displaced owner no longer lists the id.
    assert!(registry.list(&"41".to_string()).await.unwrap().is_empty());
    assert_eq!(registry.list(&"99".to_string()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let registry = open(dir.path());
        seed_owner(&registry).await;
        registry
            .mark_missing(&"41".to_string(), &"12".to_string())
            .await
            .unwrap();
    }

    let registry = open(dir.path());
    assert_eq!(registry.user_name(&"41".to_string()).await.as_deref(), Some("Astrid"));
    assert_eq!(registry.list(&"41".to_string()).await.unwrap().len(), 1);
    assert!(registry.missing_ids().await.contains("12"));
}

#[tokio::test]
async fn test_failed_save_leaves_memory_at_last_snapshot() {
    let outer = tempfile::tempdir().unwrap();
    let data_dir = outer.path().join("data");

    let registry = open(&data_dir);
    seed_owner(&registry).await;

    // Break the store: the data directory becomes a plain file.
    fs::remove_dir_all(&data_dir).unwrap();
    fs::write(&data_dir, b"not a directory").unwrap();

    let err = registry
        .enroll(&"41".to_string(), &"7".to_string(), "Stjerna", &"file-s".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, HerdError::Persistence(_)));

    // The failed enrollment is not visible in memory.
    let herd = registry.list(&"41".to_string()).await.unwrap();
    assert_eq!(herd.len(), 1);
    assert_eq!(herd[0].0, "12");
}
