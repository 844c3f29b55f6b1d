//! Reconciliation after operator-level drift: audit detects it,
//! normalize repairs misplaced data, archive-strays parks the rest.

use cadastre_core::StoreConfig;
use cadastre_store::audit::RequestContext;
use cadastre_store::locate::SIDECAR_FILE;
use cadastre_store::maintenance::Maintenance;
use cadastre_store::registry::RegistryStore;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;

async fn fixture() -> (TempDir, Arc<StoreConfig>, RegistryStore, Maintenance) {
    let tmp = TempDir::new().unwrap();
    let config = Arc::new(StoreConfig::new(tmp.path()));
    config.ensure_layout().unwrap();
    let registry = RegistryStore::new(config.clone());
    let maintenance = Maintenance::new(config.clone());
    (tmp, config, registry, maintenance)
}

#[tokio::test]
async fn test_clean_tree_audits_clean() {
    let (_tmp, config, registry, maintenance) = fixture().await;
    let ctx = RequestContext::system();
    let added = registry.add_foundation("A", "B1", &ctx).await.unwrap();
    fs::create_dir_all(config.building_dir(&added.foundation_id, &added.building.id))
        .await
        .unwrap();

    let report = maintenance.audit_registry().await.unwrap();
    assert!(report.is_clean(), "unexpected drift: {report:?}");
    assert_eq!(report.registry_count, 1);
    assert_eq!(report.disk_count, 1);
}

#[tokio::test]
async fn test_audit_then_normalize_repairs_a_moved_tree() {
    let (_tmp, config, registry, maintenance) = fixture().await;
    let ctx = RequestContext::system();
    let added = registry.add_foundation("A", "B1", &ctx).await.unwrap();
    let fid = added.foundation_id;
    let bid = added.building.id;

    // an operator moved the building under a hand-made foundation dir
    let misplaced = config
        .foundations_root()
        .join("a-manual-copy")
        .join("buildings")
        .join(&bid);
    fs::create_dir_all(&misplaced).await.unwrap();
    fs::write(
        misplaced.join(SIDECAR_FILE),
        format!(r#"{{"buildingId":"{bid}","dataVersion":5}}"#),
    )
    .await
    .unwrap();

    let report = maintenance.audit_registry().await.unwrap();
    assert_eq!(report.wrong_location.len(), 1);
    assert_eq!(report.wrong_location[0].building_id, bid);
    assert!(report.missing_on_disk.is_empty(), "data exists, just misplaced");

    let dry = maintenance.normalize_building_folders(false).await.unwrap();
    assert_eq!(dry[0].status, "would-move");
    assert_eq!(dry[0].from.as_deref(), Some(misplaced.as_path()));

    let wet = maintenance.normalize_building_folders(true).await.unwrap();
    assert_eq!(wet[0].status, "moved");
    let canonical = config.building_dir(&fid, &bid);
    let sidecar: serde_json::Value =
        serde_json::from_slice(&fs::read(canonical.join(SIDECAR_FILE)).await.unwrap()).unwrap();
    assert_eq!(sidecar["dataVersion"], 5, "document carried over intact");

    let after = maintenance.audit_registry().await.unwrap();
    assert!(after.wrong_location.is_empty());
}

#[tokio::test]
async fn test_archive_strays_leaves_registered_buildings_alone() {
    let (_tmp, config, registry, maintenance) = fixture().await;
    let ctx = RequestContext::system();
    let added = registry.add_foundation("A", "B1", &ctx).await.unwrap();
    let live = config.building_dir(&added.foundation_id, &added.building.id);
    fs::create_dir_all(&live).await.unwrap();

    let stray = config.building_dir("a", "deleted-long-ago");
    fs::create_dir_all(&stray).await.unwrap();
    fs::write(stray.join("leftover.json"), "{}").await.unwrap();

    let items = maintenance.archive_strays(true).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].building_id, "deleted-long-ago");
    assert!(live.exists());
    assert!(!stray.exists());
    assert!(
        config
            .archive_dir()
            .join("a")
            .join("deleted-long-ago")
            .join("leftover.json")
            .exists()
    );

    // a second pass finds nothing left to do
    assert!(maintenance.archive_strays(true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_normalize_reports_missing_when_no_data_anywhere() {
    let (_tmp, _config, registry, maintenance) = fixture().await;
    let ctx = RequestContext::system();
    registry.add_foundation("A", "B1", &ctx).await.unwrap();

    let items = maintenance.normalize_building_folders(false).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, "missing");
}
