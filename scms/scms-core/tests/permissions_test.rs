use anyhow::Result;
use scms_core::credentials::PasswordHasher;
use scms_core::model::{Capability, Permission, User};
use scms_core::permissions::{PermissionStore, SaveReport};
use scms_core::repository::{Collection, MemoryRepository, Repository};
use scms_core::users::UserStore;
use std::sync::Arc;
use uuid::Uuid;

fn setup() -> (Arc<MemoryRepository>, PermissionStore) {
    let repo = Arc::new(MemoryRepository::new());
    let store = PermissionStore::new(repo.clone());
    (repo, store)
}

#[tokio::test]
async fn saving_twice_keeps_one_record_per_pair() -> Result<()> {
    let (repo, store) = setup();
    let folder = Uuid::new_v4();
    let grants: Vec<Permission> = (0..3)
        .map(|_| Permission::new(folder, Uuid::new_v4()).with(Capability::Read))
        .collect();

    let first = store.save_grants(grants.clone()).await?;
    assert_eq!(first, SaveReport { inserted: 3, updated: 0 });
    let second = store.save_grants(grants).await?;
    assert_eq!(second, SaveReport { inserted: 0, updated: 3 });
    assert_eq!(repo.count(Collection::Permissions), 3);
    Ok(())
}

#[tokio::test]
async fn resave_keeps_the_stored_id() -> Result<()> {
    let (_, store) = setup();
    let (folder, user) = (Uuid::new_v4(), Uuid::new_v4());
    store
        .save_grants(vec![Permission::new(folder, user).with(Capability::List)])
        .await?;
    let stored_id = store.grant_for(folder, user).await?.and_then(|g| g.id);
    assert!(stored_id.is_some());

    store
        .save_grants(vec![Permission::new(folder, user).with(Capability::Delete)])
        .await?;
    let grant = store.grant_for(folder, user).await?.unwrap();
    assert_eq!(grant.id, stored_id);
    assert!(grant.delete);
    assert!(!grant.list);
    Ok(())
}

#[tokio::test]
async fn repeated_key_in_one_batch_collapses_to_last() -> Result<()> {
    let (repo, store) = setup();
    let (folder, user) = (Uuid::new_v4(), Uuid::new_v4());
    let report = store
        .save_grants(vec![
            Permission::new(folder, user).with(Capability::Read),
            Permission::new(folder, user).with(Capability::Create),
        ])
        .await?;
    assert_eq!(report.inserted, 1);
    assert_eq!(repo.count(Collection::Permissions), 1);
    let grant = store.grant_for(folder, user).await?.unwrap();
    assert!(grant.create);
    assert!(!grant.read);
    Ok(())
}

#[tokio::test]
async fn revoking_saves_an_all_false_grant() -> Result<()> {
    let (_, store) = setup();
    let (folder, user) = (Uuid::new_v4(), Uuid::new_v4());
    store
        .save_grants(vec![Permission::new(folder, user).with(Capability::Read)])
        .await?;
    store.save_grants(vec![Permission::new(folder, user)]).await?;
    let grant = store.grant_for(folder, user).await?.unwrap();
    assert!(Capability::ALL.iter().all(|c| !grant.allows(*c)));
    Ok(())
}

#[tokio::test]
async fn id_owned_by_another_pair_fails_the_call() -> Result<()> {
    let (repo, store) = setup();
    let folder = Uuid::new_v4();
    let mut taken = Permission::new(folder, Uuid::new_v4());
    taken.id = Some(Uuid::new_v4());
    store.save_grants(vec![taken.clone()]).await?;

    let mut clash = Permission::new(folder, Uuid::new_v4());
    clash.id = taken.id;
    let ok = Permission::new(folder, Uuid::new_v4());
    let err = store.save_grants(vec![clash, ok]).await.unwrap_err();
    assert!(matches!(err, scms_core::Error::PermissionLookupFailed(_)));
    assert!(err.is_retryable());
    // The valid grant in the batch still applied.
    assert_eq!(repo.count(Collection::Permissions), 2);
    Ok(())
}

#[tokio::test]
async fn concurrent_saves_for_different_folders_do_not_interfere() -> Result<()> {
    let (repo, store) = setup();
    let users: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let folder = Uuid::new_v4();
        let users = users.clone();
        tasks.push(tokio::spawn(async move {
            let grants = users
                .iter()
                .map(|u| Permission::new(folder, *u).with(Capability::Read))
                .collect();
            store.save_grants(grants).await
        }));
    }
    for task in tasks {
        task.await??;
    }
    assert_eq!(repo.count(Collection::Permissions), 8 * 5);
    Ok(())
}

#[tokio::test]
async fn concurrent_saves_of_the_same_pair_leave_one_record() -> Result<()> {
    let (repo, store) = setup();
    let (folder, user) = (Uuid::new_v4(), Uuid::new_v4());
    let mut tasks = Vec::new();
    for cap in Capability::ALL {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .save_grants(vec![Permission::new(folder, user).with(cap)])
                .await
        }));
    }
    for task in tasks {
        task.await??;
    }
    assert_eq!(repo.count(Collection::Permissions), 1);
    Ok(())
}

#[tokio::test]
async fn grants_carry_user_snapshot_sorted_by_name() -> Result<()> {
    let repo = Arc::new(MemoryRepository::new());
    let users = UserStore::new(repo.clone(), PasswordHasher::default());
    let zed = users.save(User::new("zed", "zed@example.com", 1), None).await?;
    let amy = users.save(User::new("amy", "amy@example.com", 1), None).await?;
    let store = PermissionStore::new(repo.clone());
    let folder = Uuid::new_v4();
    store
        .save_grants(vec![
            Permission::new(folder, zed.id).with(Capability::Read),
            Permission::new(folder, amy.id).with(Capability::Read),
            Permission::new(Uuid::new_v4(), amy.id).with(Capability::Read),
        ])
        .await?;

    let grants = store.get_grants(folder).await?;
    let names: Vec<_> = grants
        .iter()
        .map(|g| g.user.as_ref().map(|u| u.name.clone()))
        .collect();
    assert_eq!(names, vec![Some("amy".to_string()), Some("zed".to_string())]);

    // The snapshot is never written back.
    let row = repo
        .find_by_id(Collection::Permissions, grants[0].id.unwrap())
        .await?
        .unwrap();
    assert!(row.get("user").is_none());
    Ok(())
}
