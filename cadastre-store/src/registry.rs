//! The entity registry: foundations and their buildings, persisted as a
//! single JSON file rewritten wholesale on every mutation.
//!
//! Every mutating operation runs the same envelope: acquire the
//! `registry` mutex, load the current state, compute the next state,
//! validate the invariants, back up the live file, commit atomically,
//! and record the action in the audit log. Validation failures abort
//! before any write; the prior file is left untouched.

use crate::audit::{AuditLog, RequestContext};
use crate::backup::BackupVault;
use crate::fsx;
use crate::locate::DirectoryLocator;
use crate::lock::{MutexLock, REGISTRY_LOCK};
use crate::mover;
use cadastre_core::id::{slugify, unique_slug};
use cadastre_core::{
    BuildingEntry, BuildingRef, CadastreError, FoundationNode, RegistryCounts, RegistryTree,
    Result, StoreConfig,
};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Check the registry invariants, trimming string fields in place.
///
/// Fails on: any empty required field, a duplicate `id`, or two entries
/// of one foundation disagreeing on its name.
pub fn validate_registry(entries: &mut [BuildingEntry]) -> Result<()> {
    let mut ids = std::collections::HashSet::new();
    let mut foundation_names: HashMap<String, String> = HashMap::new();
    for (i, entry) in entries.iter_mut().enumerate() {
        for (key, field) in [
            ("id", &mut entry.id),
            ("name", &mut entry.name),
            ("foundationId", &mut entry.foundation_id),
            ("foundationName", &mut entry.foundation_name),
        ] {
            let trimmed = field.trim();
            if trimmed.is_empty() {
                return Err(CadastreError::validation(format!(
                    "entry[{}]: missing/invalid \"{}\"",
                    i, key
                )));
            }
            *field = trimmed.to_string();
        }
        if !ids.insert(entry.id.clone()) {
            return Err(CadastreError::validation(format!(
                "entry[{}]: duplicate id \"{}\"",
                i, entry.id
            )));
        }
        match foundation_names.get(&entry.foundation_id) {
            Some(existing) if existing != &entry.foundation_name => {
                return Err(CadastreError::validation(format!(
                    "entry[{}]: foundationName mismatch for foundationId \"{}\" (\"{}\" vs \"{}\")",
                    i, entry.foundation_id, existing, entry.foundation_name
                )));
            }
            Some(_) => {}
            None => {
                foundation_names
                    .insert(entry.foundation_id.clone(), entry.foundation_name.clone());
            }
        }
    }
    Ok(())
}

/// Options for delete operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Erase the physical directories after archiving them
    pub erase_data: bool,
    /// Compute and return the effect without locking or mutating
    pub dry: bool,
}

/// What a delete did, or would do (`dry`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub dry: bool,
    /// Building ids affected
    pub buildings: Vec<String>,
    /// Physical directories located
    pub data_dirs: Vec<PathBuf>,
    /// Directories copied into the archive
    pub archived: usize,
    /// Directories erased after archiving
    pub erased: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_root: Option<PathBuf>,
}

/// A newly added foundation with its first building.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedFoundation {
    pub foundation_id: String,
    pub building: BuildingEntry,
}

/// The registry store. Cheap to clone; all state lives on disk.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    config: Arc<StoreConfig>,
    vault: BackupVault,
    audit: AuditLog,
    locator: DirectoryLocator,
}

impl RegistryStore {
    pub fn new(config: Arc<StoreConfig>) -> Self {
        Self {
            vault: BackupVault::new(config.clone()),
            audit: AuditLog::new(&config),
            locator: DirectoryLocator::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &Arc<StoreConfig> {
        &self.config
    }

    pub fn vault(&self) -> &BackupVault {
        &self.vault
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Load all entries. An absent registry file is an empty registry.
    pub async fn load(&self) -> Result<Vec<BuildingEntry>> {
        Ok(fsx::read_json_or(&self.config.registry_file(), Vec::new()).await)
    }

    /// Find one building by id.
    pub async fn find_building(&self, id: &str) -> Result<BuildingEntry> {
        self.load()
            .await?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| CadastreError::not_found("building", id))
    }

    /// Read-only tree of foundations and buildings, name-sorted.
    /// Lockless: readers may observe a state mid-rename, which is safe
    /// because writers commit via atomic rename.
    pub async fn tree(&self) -> Result<RegistryTree> {
        let entries = self.load().await?;
        let building_count = entries.len();
        let mut by_foundation: HashMap<String, FoundationNode> = HashMap::new();
        for entry in entries {
            let node = by_foundation
                .entry(entry.foundation_id.clone())
                .or_insert_with(|| FoundationNode {
                    foundation_id: entry.foundation_id.clone(),
                    foundation_name: entry.foundation_name.clone(),
                    buildings: Vec::new(),
                });
            node.buildings.push(BuildingRef {
                id: entry.id,
                name: entry.name,
            });
        }
        let mut foundations: Vec<FoundationNode> = by_foundation.into_values().collect();
        foundations.sort_by(|a, b| a.foundation_name.cmp(&b.foundation_name));
        for f in &mut foundations {
            f.buildings.sort_by(|a, b| a.name.cmp(&b.name));
        }
        let counts = RegistryCounts {
            foundations: foundations.len(),
            buildings: building_count,
        };
        Ok(RegistryTree { foundations, counts })
    }

    /// Add a foundation with its first building. The foundation id is
    /// the unique slug of its name.
    pub async fn add_foundation(
        &self,
        foundation_name: &str,
        initial_building_name: &str,
        ctx: &RequestContext,
    ) -> Result<AddedFoundation> {
        let foundation_name = foundation_name.trim();
        let initial_building_name = initial_building_name.trim();
        if foundation_name.is_empty() || initial_building_name.is_empty() {
            return Err(CadastreError::validation(
                "foundationName and initialBuildingName required",
            ));
        }
        let guard = MutexLock::acquire(&self.config, REGISTRY_LOCK).await?;
        let mut entries = self.load().await?;

        let foundation_ids: Vec<&str> = entries.iter().map(|e| e.foundation_id.as_str()).collect();
        let foundation_id = unique_slug(&slugify(foundation_name), foundation_ids);
        let building_ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let building_id = unique_slug(&slugify(initial_building_name), building_ids);

        let building = BuildingEntry::new(
            &building_id,
            initial_building_name,
            &foundation_id,
            foundation_name,
        );
        entries.push(building.clone());
        self.commit(
            &mut entries,
            "add-foundation",
            json!({ "foundationId": foundation_id, "buildingId": building_id }),
            ctx,
        )
        .await?;
        guard.release().await;
        info!(foundation = %foundation_id, building = %building_id, "foundation added");
        Ok(AddedFoundation {
            foundation_id,
            building,
        })
    }

    /// Add a building under an existing foundation. The building id is
    /// the unique slug of its name; the foundation name is copied from
    /// the existing entries.
    pub async fn add_building(
        &self,
        foundation_id: &str,
        building_name: &str,
        ctx: &RequestContext,
    ) -> Result<BuildingEntry> {
        let building_name = building_name.trim();
        if building_name.is_empty() {
            return Err(CadastreError::validation("buildingName required"));
        }
        let guard = MutexLock::acquire(&self.config, REGISTRY_LOCK).await?;
        let mut entries = self.load().await?;
        let foundation_name = entries
            .iter()
            .find(|e| e.foundation_id == foundation_id)
            .map(|e| e.foundation_name.clone())
            .ok_or_else(|| CadastreError::not_found("foundation", foundation_id))?;

        let building_ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let building_id = unique_slug(&slugify(building_name), building_ids);
        let building =
            BuildingEntry::new(&building_id, building_name, foundation_id, foundation_name);
        entries.push(building.clone());
        self.commit(
            &mut entries,
            "add-building",
            json!({ "foundationId": foundation_id, "buildingId": building_id }),
            ctx,
        )
        .await?;
        guard.release().await;
        info!(foundation = foundation_id, building = %building_id, "building added");
        Ok(building)
    }

    /// Rename a foundation, rewriting the denormalized name on every one
    /// of its entries. Returns how many entries were updated.
    pub async fn rename_foundation(
        &self,
        foundation_id: &str,
        new_name: &str,
        ctx: &RequestContext,
    ) -> Result<usize> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(CadastreError::validation("newName required"));
        }
        let guard = MutexLock::acquire(&self.config, REGISTRY_LOCK).await?;
        let mut entries = self.load().await?;
        let mut updated = 0;
        for entry in entries.iter_mut() {
            if entry.foundation_id == foundation_id {
                entry.foundation_name = new_name.to_string();
                updated += 1;
            }
        }
        if updated == 0 {
            return Err(CadastreError::not_found("foundation", foundation_id));
        }
        self.commit(
            &mut entries,
            "rename-foundation",
            json!({ "foundationId": foundation_id, "newName": new_name, "updated": updated }),
            ctx,
        )
        .await?;
        guard.release().await;
        Ok(updated)
    }

    /// Rename a building (display name only; the id is unchanged).
    pub async fn rename_building(
        &self,
        foundation_id: &str,
        id: &str,
        new_name: &str,
        ctx: &RequestContext,
    ) -> Result<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(CadastreError::validation("newName required"));
        }
        let guard = MutexLock::acquire(&self.config, REGISTRY_LOCK).await?;
        let mut entries = self.load().await?;
        let entry = entries
            .iter_mut()
            .find(|e| e.foundation_id == foundation_id && e.id == id)
            .ok_or_else(|| CadastreError::not_found("building", id))?;
        entry.name = new_name.to_string();
        self.commit(
            &mut entries,
            "rename-building",
            json!({ "foundationId": foundation_id, "id": id, "newName": new_name }),
            ctx,
        )
        .await?;
        guard.release().await;
        Ok(())
    }

    /// Delete one building. The registry entry is removed first (after
    /// backup); located directories are always archived and erased only
    /// when requested. `dry` reports the effect without mutating.
    pub async fn delete_building(
        &self,
        foundation_id: &str,
        id: &str,
        opts: DeleteOptions,
        ctx: &RequestContext,
    ) -> Result<DeleteReport> {
        let entries = self.load().await?;
        if !entries
            .iter()
            .any(|e| e.foundation_id == foundation_id && e.id == id)
        {
            return Err(CadastreError::not_found("building", id));
        }
        let scan = self.locator.find_all(foundation_id, id).await;
        for (path, reason) in &scan.skipped {
            warn!(path = %path.display(), reason = %reason, "skipped during delete scan");
        }
        if opts.dry {
            return Ok(DeleteReport {
                dry: true,
                buildings: vec![id.to_string()],
                data_dirs: scan.matches,
                archived: 0,
                erased: 0,
                archive_root: None,
            });
        }

        let guard = MutexLock::acquire(&self.config, REGISTRY_LOCK).await?;
        let mut entries = self.load().await?;
        let before = entries.len();
        entries.retain(|e| !(e.foundation_id == foundation_id && e.id == id));
        if entries.len() == before {
            return Err(CadastreError::not_found("building", id));
        }
        self.commit(
            &mut entries,
            "delete-building",
            json!({
                "foundationId": foundation_id,
                "id": id,
                "eraseData": opts.erase_data,
                "dataDirs": scan.matches.len(),
            }),
            ctx,
        )
        .await?;
        let archive =
            mover::archive_dirs(&self.config, &scan.matches, "delete-building", opts.erase_data)
                .await?;
        guard.release().await;
        info!(building = id, archived = archive.archived.len(), erased = archive.erased, "building deleted");
        Ok(DeleteReport {
            dry: false,
            buildings: vec![id.to_string()],
            data_dirs: scan.matches,
            archived: archive.archived.len(),
            erased: archive.erased,
            archive_root: Some(archive.root),
        })
    }

    /// Delete a foundation and all of its buildings.
    pub async fn delete_foundation(
        &self,
        foundation_id: &str,
        opts: DeleteOptions,
        ctx: &RequestContext,
    ) -> Result<DeleteReport> {
        let entries = self.load().await?;
        let buildings: Vec<String> = entries
            .iter()
            .filter(|e| e.foundation_id == foundation_id)
            .map(|e| e.id.clone())
            .collect();
        if buildings.is_empty() {
            return Err(CadastreError::not_found("foundation", foundation_id));
        }
        let mut data_dirs = Vec::new();
        for id in &buildings {
            let scan = self.locator.find_all(foundation_id, id).await;
            for (path, reason) in &scan.skipped {
                warn!(path = %path.display(), reason = %reason, "skipped during delete scan");
            }
            data_dirs.extend(scan.matches);
        }
        if opts.dry {
            return Ok(DeleteReport {
                dry: true,
                buildings,
                data_dirs,
                archived: 0,
                erased: 0,
                archive_root: None,
            });
        }

        let guard = MutexLock::acquire(&self.config, REGISTRY_LOCK).await?;
        let mut entries = self.load().await?;
        entries.retain(|e| e.foundation_id != foundation_id);
        self.commit(
            &mut entries,
            "delete-foundation",
            json!({
                "foundationId": foundation_id,
                "buildings": buildings,
                "eraseData": opts.erase_data,
                "dataDirs": data_dirs.len(),
            }),
            ctx,
        )
        .await?;
        let archive =
            mover::archive_dirs(&self.config, &data_dirs, "delete-foundation", opts.erase_data)
                .await?;
        guard.release().await;
        info!(
            foundation = foundation_id,
            buildings = buildings.len(),
            archived = archive.archived.len(),
            erased = archive.erased,
            "foundation deleted"
        );
        Ok(DeleteReport {
            dry: false,
            buildings,
            data_dirs,
            archived: archive.archived.len(),
            erased: archive.erased,
            archive_root: Some(archive.root),
        })
    }

    /// Validate → backup → atomic write → audit. Callers hold the lock.
    pub(crate) async fn commit(
        &self,
        entries: &mut Vec<BuildingEntry>,
        action: &str,
        payload: serde_json::Value,
        ctx: &RequestContext,
    ) -> Result<()> {
        validate_registry(entries)?;
        if fsx::path_exists(&self.config.registry_file()).await {
            self.vault.backup(action).await?;
        }
        fsx::write_json_atomic(&self.config.registry_file(), entries).await?;
        self.audit.record(action, payload, ctx).await?;
        Ok(())
    }
}
