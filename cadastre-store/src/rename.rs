//! Identifier renames: changing a building or foundation id while
//! keeping the registry and the physical directory tree consistent.
//!
//! The registry is the single source of truth; directory moves are
//! canonical steps (failures propagate), sidecar patches are best-effort
//! (failures are logged and swallowed). A rename retried after a partial
//! failure completes via merge semantics, so an already-moved directory
//! is never lost or duplicated.

use crate::audit::{AuditLog, RequestContext};
use crate::backup::BackupVault;
use crate::fsx;
use crate::locate::{DirectoryLocator, SIDECAR_FILE};
use crate::lock::{MutexLock, REGISTRY_LOCK};
use crate::mover::{self, MoveStrategy};
use crate::registry::validate_registry;
use cadastre_core::id::slugify;
use cadastre_core::{BuildingEntry, CadastreError, Result, StoreConfig};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of an identifier change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameOutcome {
    /// The id now in effect (slugified)
    pub id: String,
    /// Directories relocated by rename/copy
    pub moved: usize,
    /// Directories merged into an existing destination
    pub merged: usize,
    /// Aliases now recorded on the entry (building renames only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Subtrees the discovery scan could not read
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<(PathBuf, String)>,
}

/// Orchestrates id changes across the registry and the directory tree.
#[derive(Debug, Clone)]
pub struct IdentifierRenamer {
    config: Arc<StoreConfig>,
    vault: BackupVault,
    audit: AuditLog,
    locator: DirectoryLocator,
}

impl IdentifierRenamer {
    pub fn new(config: Arc<StoreConfig>) -> Self {
        Self {
            vault: BackupVault::new(config.clone()),
            audit: AuditLog::new(&config),
            locator: DirectoryLocator::new(config.clone()),
            config,
        }
    }

    /// Change a building's id. Locates every directory holding the old
    /// id's data, merges each into the canonical path for the new id,
    /// patches sidecars, and commits the registry with the old id
    /// recorded as an alias. Succeeds with zero directories: a building
    /// may have no data yet.
    pub async fn change_building_id(
        &self,
        foundation_id: &str,
        old_id: &str,
        requested_id: &str,
        ctx: &RequestContext,
    ) -> Result<RenameOutcome> {
        let new_id = slugify(requested_id);
        if new_id.is_empty() {
            return Err(CadastreError::validation("newId required"));
        }
        if new_id == old_id {
            let entry = self.find_entry(foundation_id, old_id).await?;
            return Ok(RenameOutcome {
                id: new_id,
                moved: 0,
                merged: 0,
                aliases: entry.aliases,
                skipped: Vec::new(),
            });
        }

        // cheap pre-checks before taking the lock
        let entries = self.load().await?;
        if !entries
            .iter()
            .any(|e| e.foundation_id == foundation_id && e.id == old_id)
        {
            return Err(CadastreError::not_found("building", old_id));
        }
        if entries.iter().any(|e| e.id == new_id) {
            return Err(CadastreError::validation(format!(
                "new id '{}' already exists in registry",
                new_id
            )));
        }
        let scan = self.locator.find_all(foundation_id, old_id).await;

        let guard = MutexLock::acquire(&self.config, REGISTRY_LOCK).await?;
        self.audit
            .record(
                "change-building-id",
                json!({
                    "foundationId": foundation_id,
                    "id": old_id,
                    "newId": new_id,
                    "dataDirs": scan.matches.len(),
                }),
                ctx,
            )
            .await?;
        self.vault.backup("change-building-id").await?;

        // re-read under the lock; the pre-check ran without it
        let mut entries = self.load().await?;
        let idx = entries
            .iter()
            .position(|e| e.foundation_id == foundation_id && e.id == old_id)
            .ok_or_else(|| CadastreError::not_found("building", old_id))?;
        if entries.iter().any(|e| e.id == new_id) {
            return Err(CadastreError::validation(format!(
                "new id '{}' already exists in registry",
                new_id
            )));
        }

        let dest = self.config.building_dir(foundation_id, &new_id);
        let mut moved = 0;
        let mut merged = 0;
        for dir in &scan.matches {
            let outcome = mover::move_with_merge(dir, &dest).await?;
            match outcome.strategy {
                MoveStrategy::Moved => moved += 1,
                MoveStrategy::Merged => merged += 1,
            }
            patch_sidecar_building_id(&dest, &new_id).await;
        }

        let entry = &mut entries[idx];
        entry.push_alias(old_id);
        entry.id = new_id.clone();
        let aliases = entry.aliases.clone();
        validate_registry(&mut entries)?;
        fsx::write_json_atomic(&self.config.registry_file(), &entries).await?;
        guard.release().await;
        info!(old = old_id, new = %new_id, moved, merged, "building id changed");
        Ok(RenameOutcome {
            id: new_id,
            moved,
            merged,
            aliases,
            skipped: scan.skipped,
        })
    }

    /// Change a foundation's id. Foundation directories are derived by
    /// walking up two levels from each member building's directories;
    /// each is moved to the sibling named after the new id. Individual
    /// move failures are tolerated (collected as skipped); the registry
    /// rewrite and the alias map update are the canonical steps.
    pub async fn change_foundation_id(
        &self,
        old_id: &str,
        requested_id: &str,
        ctx: &RequestContext,
    ) -> Result<RenameOutcome> {
        let new_id = slugify(requested_id);
        if new_id.is_empty() {
            return Err(CadastreError::validation("newId required"));
        }
        if new_id == old_id {
            return Ok(RenameOutcome {
                id: new_id,
                moved: 0,
                merged: 0,
                aliases: Vec::new(),
                skipped: Vec::new(),
            });
        }
        let entries = self.load().await?;
        if entries.iter().any(|e| e.foundation_id == new_id) {
            return Err(CadastreError::validation(format!(
                "new id '{}' already exists in registry",
                new_id
            )));
        }
        let member_ids: Vec<String> = entries
            .iter()
            .filter(|e| e.foundation_id == old_id)
            .map(|e| e.id.clone())
            .collect();
        if member_ids.is_empty() {
            return Err(CadastreError::not_found("foundation", old_id));
        }

        let mut foundation_dirs: HashSet<PathBuf> = HashSet::new();
        let mut skipped = Vec::new();
        for id in &member_ids {
            let scan = self.locator.find_building_dirs(old_id, id).await;
            skipped.extend(scan.skipped);
            for dir in scan.matches {
                // .../foundations/<fid>/buildings/<bid> -> .../foundations/<fid>
                if let Some(fdir) = dir.parent().and_then(Path::parent) {
                    foundation_dirs.insert(fdir.to_path_buf());
                }
            }
        }

        let guard = MutexLock::acquire(&self.config, REGISTRY_LOCK).await?;
        self.audit
            .record(
                "change-foundation-id",
                json!({
                    "oldId": old_id,
                    "newId": new_id,
                    "dirs": foundation_dirs.len(),
                }),
                ctx,
            )
            .await?;
        self.vault.backup("change-foundation-id").await?;

        let mut moved = 0;
        for dir in &foundation_dirs {
            let Some(parent) = dir.parent() else { continue };
            let dest = parent.join(&new_id);
            match mover::move_with_merge(dir, &dest).await {
                Ok(_) => moved += 1,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "foundation directory move failed");
                    skipped.push((dir.clone(), e.to_string()));
                }
            }
        }

        let mut entries = self.load().await?;
        for entry in entries.iter_mut() {
            if entry.foundation_id == old_id {
                entry.foundation_id = new_id.clone();
            }
        }

        // redirect stale incoming references to the new id
        let aliases_file = self.config.foundation_aliases_file();
        let mut alias_map: serde_json::Map<String, serde_json::Value> =
            fsx::read_json_or(&aliases_file, serde_json::Map::new()).await;
        alias_map.insert(old_id.to_string(), json!(new_id));
        fsx::write_json_atomic(&aliases_file, &alias_map).await?;

        validate_registry(&mut entries)?;
        fsx::write_json_atomic(&self.config.registry_file(), &entries).await?;
        guard.release().await;
        info!(old = old_id, new = %new_id, moved, "foundation id changed");
        Ok(RenameOutcome {
            id: new_id,
            moved,
            merged: 0,
            aliases: Vec::new(),
            skipped,
        })
    }

    /// Follow the alias map for a possibly stale foundation id.
    pub async fn resolve_foundation_alias(&self, id: &str) -> Option<String> {
        let map: serde_json::Map<String, serde_json::Value> =
            fsx::read_json_or(&self.config.foundation_aliases_file(), serde_json::Map::new()).await;
        map.get(id)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    async fn load(&self) -> Result<Vec<BuildingEntry>> {
        Ok(fsx::read_json_or(&self.config.registry_file(), Vec::new()).await)
    }

    async fn find_entry(&self, foundation_id: &str, id: &str) -> Result<BuildingEntry> {
        self.load()
            .await?
            .into_iter()
            .find(|e| e.foundation_id == foundation_id && e.id == id)
            .ok_or_else(|| CadastreError::not_found("building", id))
    }
}

/// Rewrite the `buildingId` field of a directory's sidecar. Best-effort:
/// the registry remains authoritative, so failures are only logged.
async fn patch_sidecar_building_id(dir: &Path, new_id: &str) {
    let path = dir.join(SIDECAR_FILE);
    let mut value: serde_json::Value = match fsx::read_json(&path).await {
        Ok(value) => value,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "sidecar not patched");
            return;
        }
    };
    if value.get("buildingId").and_then(|v| v.as_str()) == Some(new_id) {
        return;
    }
    value["buildingId"] = json!(new_id);
    if let Err(e) = fsx::write_json_atomic(&path, &value).await {
        debug!(path = %path.display(), error = %e, "sidecar not patched");
    }
}
