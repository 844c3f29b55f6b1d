//! End-to-end registry lifecycle: add, rename, delete, with the backup
//! and audit side effects each mutation must leave behind.

use cadastre_core::StoreConfig;
use cadastre_store::audit::RequestContext;
use cadastre_store::registry::{DeleteOptions, RegistryStore};
use std::sync::Arc;
use tempfile::TempDir;

fn store() -> (TempDir, RegistryStore) {
    let tmp = TempDir::new().unwrap();
    let config = StoreConfig::new(tmp.path());
    config.ensure_layout().unwrap();
    (tmp, RegistryStore::new(Arc::new(config)))
}

#[tokio::test]
async fn test_add_foundation_then_building_then_tree() {
    let (_tmp, store) = store();
    let ctx = RequestContext::system();

    let added = store
        .add_foundation("Fondation Alpha", "Bâtiment 1", &ctx)
        .await
        .unwrap();
    assert_eq!(added.foundation_id, "fondation-alpha");
    assert_eq!(added.building.id, "batiment-1");
    assert_eq!(added.building.foundation_name, "Fondation Alpha");

    let b2 = store
        .add_building("fondation-alpha", "Bâtiment 2", &ctx)
        .await
        .unwrap();
    assert_eq!(b2.id, "batiment-2");

    // same building name in another foundation gets a suffixed slug
    store.add_foundation("Beta", "Bâtiment 1", &ctx).await.unwrap();
    let entries = store.load().await.unwrap();
    assert!(entries.iter().any(|e| e.id == "batiment-1-2"));

    let tree = store.tree().await.unwrap();
    assert_eq!(tree.counts.foundations, 2);
    assert_eq!(tree.counts.buildings, 3);
    // name-sorted
    assert_eq!(tree.foundations[0].foundation_name, "Beta");
    assert_eq!(tree.foundations[1].foundation_name, "Fondation Alpha");
    assert_eq!(tree.foundations[1].buildings[0].name, "Bâtiment 1");
}

#[tokio::test]
async fn test_add_building_requires_existing_foundation() {
    let (_tmp, store) = store();
    let err = store
        .add_building("nope", "B", &RequestContext::system())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_rename_foundation_rewrites_every_member() {
    let (_tmp, store) = store();
    let ctx = RequestContext::system();
    store.add_foundation("Old Name", "B1", &ctx).await.unwrap();
    store.add_building("old-name", "B2", &ctx).await.unwrap();

    let updated = store
        .rename_foundation("old-name", "New Name", &ctx)
        .await
        .unwrap();
    assert_eq!(updated, 2);
    let entries = store.load().await.unwrap();
    assert!(entries.iter().all(|e| e.foundation_name == "New Name"));
    // the id does not change on a display-name rename
    assert!(entries.iter().all(|e| e.foundation_id == "old-name"));
}

#[tokio::test]
async fn test_every_mutation_backs_up_and_audits() {
    let (_tmp, store) = store();
    let ctx = RequestContext::new("192.0.2.7", "cli");
    store.add_foundation("A", "B1", &ctx).await.unwrap();
    store.add_building("a", "B2", &ctx).await.unwrap();
    store.rename_building("a", "b2", "B2 bis", &ctx).await.unwrap();

    let backups = store.vault().list().await.unwrap();
    assert_eq!(backups.len(), 3);
    assert!(backups.iter().any(|b| b.id.ends_with("-add-foundation.json")));

    let records = store.audit().read_all().await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["action"], "add-foundation");
    assert_eq!(records[2]["action"], "rename-building");
    assert_eq!(records[2]["ip"], "192.0.2.7");
}

#[tokio::test]
async fn test_delete_building_dry_run_then_archive() {
    let (_tmp, store) = store();
    let ctx = RequestContext::system();
    let added = store.add_foundation("A", "B1", &ctx).await.unwrap();
    let fid = added.foundation_id.clone();
    let bid = added.building.id.clone();
    let dir = store.config().building_dir(&fid, &bid);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("current.json"), "{}").await.unwrap();

    let dry = store
        .delete_building(
            &fid,
            &bid,
            DeleteOptions {
                erase_data: true,
                dry: true,
            },
            &ctx,
        )
        .await
        .unwrap();
    assert!(dry.dry);
    assert_eq!(dry.data_dirs, vec![dir.clone()]);
    assert!(dir.exists(), "dry run must not touch the tree");
    assert_eq!(store.load().await.unwrap().len(), 1);

    let report = store
        .delete_building(
            &fid,
            &bid,
            DeleteOptions {
                erase_data: true,
                dry: false,
            },
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(report.archived, 1);
    assert_eq!(report.erased, 1);
    assert!(!dir.exists());
    assert!(store.load().await.unwrap().is_empty());
    // the erased tree survives in the archive
    let root = report.archive_root.unwrap();
    assert!(root.starts_with(store.config().data_backup_dir()));
    let rel = dir.strip_prefix(&store.config().data_root).unwrap();
    assert!(root.join(rel).join("current.json").exists());
}

#[tokio::test]
async fn test_delete_without_erase_keeps_data() {
    let (_tmp, store) = store();
    let ctx = RequestContext::system();
    let added = store.add_foundation("A", "B1", &ctx).await.unwrap();
    let dir = store
        .config()
        .building_dir(&added.foundation_id, &added.building.id);
    tokio::fs::create_dir_all(&dir).await.unwrap();

    let report = store
        .delete_building(
            &added.foundation_id,
            &added.building.id,
            DeleteOptions::default(),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(report.archived, 1);
    assert_eq!(report.erased, 0);
    assert!(dir.exists(), "data stays on disk when erase is not requested");
}

#[tokio::test]
async fn test_delete_foundation_removes_all_members() {
    let (_tmp, store) = store();
    let ctx = RequestContext::system();
    store.add_foundation("A", "B1", &ctx).await.unwrap();
    store.add_building("a", "B2", &ctx).await.unwrap();
    store.add_foundation("Keep", "K1", &ctx).await.unwrap();

    let report = store
        .delete_foundation("a", DeleteOptions::default(), &ctx)
        .await
        .unwrap();
    assert_eq!(report.buildings.len(), 2);
    let entries = store.load().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].foundation_id, "keep");
}
