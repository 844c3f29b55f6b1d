//! CLI command implementations.
//!
//! Each handler builds the store it needs, runs one operation, and
//! prints the outcome as pretty JSON so the binary composes with shell
//! tooling.

use anyhow::{Context, Result};
use cadastre_core::StoreConfig;
use cadastre_store::audit::RequestContext;
use cadastre_store::document::DocumentStore;
use cadastre_store::maintenance::Maintenance;
use cadastre_store::registry::{DeleteOptions, RegistryStore};
use cadastre_store::rename::IdentifierRenamer;
use serde::Serialize;
use std::sync::Arc;

fn print_json(value: &impl Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}

fn ctx() -> RequestContext {
    RequestContext::system()
}

pub async fn tree(config: Arc<StoreConfig>) -> Result<()> {
    let tree = RegistryStore::new(config).tree().await?;
    print_json(&tree)
}

pub async fn backups(config: Arc<StoreConfig>) -> Result<()> {
    let backups = RegistryStore::new(config).vault().list().await?;
    print_json(&backups)
}

pub async fn restore(config: Arc<StoreConfig>, backup_id: String) -> Result<()> {
    let store = RegistryStore::new(config);
    store.vault().restore(&backup_id).await?;
    store
        .audit()
        .record(
            "restore-registry",
            serde_json::json!({ "backupId": backup_id }),
            &ctx(),
        )
        .await?;
    print_json(&serde_json::json!({ "restored": backup_id }))
}

pub async fn add_foundation(
    config: Arc<StoreConfig>,
    foundation_name: String,
    building_name: String,
) -> Result<()> {
    let added = RegistryStore::new(config.clone())
        .add_foundation(&foundation_name, &building_name, &ctx())
        .await?;
    // materialize the document so the building is usable immediately
    DocumentStore::new(config)
        .ensure_initialized(&added.building)
        .await?;
    print_json(&added)
}

pub async fn add_building(
    config: Arc<StoreConfig>,
    foundation_id: String,
    building_name: String,
) -> Result<()> {
    let building = RegistryStore::new(config.clone())
        .add_building(&foundation_id, &building_name, &ctx())
        .await?;
    DocumentStore::new(config)
        .ensure_initialized(&building)
        .await?;
    print_json(&building)
}

pub async fn rename_foundation(
    config: Arc<StoreConfig>,
    foundation_id: String,
    new_name: String,
) -> Result<()> {
    let updated = RegistryStore::new(config)
        .rename_foundation(&foundation_id, &new_name, &ctx())
        .await?;
    print_json(&serde_json::json!({ "foundationId": foundation_id, "updated": updated }))
}

pub async fn rename_building(
    config: Arc<StoreConfig>,
    foundation_id: String,
    id: String,
    new_name: String,
) -> Result<()> {
    RegistryStore::new(config)
        .rename_building(&foundation_id, &id, &new_name, &ctx())
        .await?;
    print_json(&serde_json::json!({ "id": id, "name": new_name }))
}

pub async fn delete_building(
    config: Arc<StoreConfig>,
    foundation_id: String,
    id: String,
    erase: bool,
    dry: bool,
) -> Result<()> {
    let report = RegistryStore::new(config)
        .delete_building(
            &foundation_id,
            &id,
            DeleteOptions {
                erase_data: erase,
                dry,
            },
            &ctx(),
        )
        .await?;
    print_json(&report)
}

pub async fn delete_foundation(
    config: Arc<StoreConfig>,
    foundation_id: String,
    erase: bool,
    dry: bool,
) -> Result<()> {
    let report = RegistryStore::new(config)
        .delete_foundation(
            &foundation_id,
            DeleteOptions {
                erase_data: erase,
                dry,
            },
            &ctx(),
        )
        .await?;
    print_json(&report)
}

pub async fn change_building_id(
    config: Arc<StoreConfig>,
    foundation_id: String,
    old_id: String,
    new_id: String,
) -> Result<()> {
    let outcome = IdentifierRenamer::new(config)
        .change_building_id(&foundation_id, &old_id, &new_id, &ctx())
        .await?;
    print_json(&outcome)
}

pub async fn change_foundation_id(
    config: Arc<StoreConfig>,
    old_id: String,
    new_id: String,
) -> Result<()> {
    let outcome = IdentifierRenamer::new(config)
        .change_foundation_id(&old_id, &new_id, &ctx())
        .await?;
    print_json(&outcome)
}

pub async fn audit(config: Arc<StoreConfig>) -> Result<()> {
    let report = Maintenance::new(config).audit_registry().await?;
    print_json(&report)
}

pub async fn normalize(config: Arc<StoreConfig>, run: bool) -> Result<()> {
    let items = Maintenance::new(config)
        .normalize_building_folders(run)
        .await?;
    print_json(&serde_json::json!({ "dry": !run, "items": items }))
}

pub async fn archive_strays(config: Arc<StoreConfig>, run: bool) -> Result<()> {
    let items = Maintenance::new(config).archive_strays(run).await?;
    print_json(&serde_json::json!({ "dry": !run, "items": items }))
}
