//! Reconciliation tooling: detect and repair drift between the registry
//! and the directory tree.
//!
//! Three operations, all registry-driven: `audit_registry` is read-only
//! and reports drift; `normalize_building_folders` moves misplaced
//! building data back to its canonical path; `archive_strays` parks
//! on-disk building directories the registry no longer knows about under
//! `_archive/`. The repairing operations default to dry-run.

use crate::fsx;
use crate::locate::{DirectoryLocator, SIDECAR_FILE};
use crate::mover::{self, MoveStrategy};
use cadastre_core::{BuildingEntry, Result, StoreConfig};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

/// A building directory found on disk, keyed by the path components
/// `foundations/<foundation>/buildings/<building>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskBuilding {
    pub foundation_id: String,
    pub building_id: String,
    pub path: PathBuf,
}

/// Registry-versus-disk drift report.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub registry_count: usize,
    pub disk_count: usize,
    /// Registered buildings with no directory anywhere
    pub missing_on_disk: Vec<String>,
    /// Registered buildings whose data sits outside the canonical path
    pub wrong_location: Vec<DiskBuilding>,
    /// On-disk building directories absent from the registry
    pub stray_on_disk: Vec<DiskBuilding>,
    /// Aliases that collide with a live building id
    pub alias_warnings: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.missing_on_disk.is_empty()
            && self.wrong_location.is_empty()
            && self.stray_on_disk.is_empty()
            && self.alias_warnings.is_empty()
    }
}

/// Per-entry outcome of a normalization pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeItem {
    pub id: String,
    pub foundation_id: String,
    /// `ok`, `missing`, `would-move`, `moved` or `merged`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<PathBuf>,
}

/// Outcome of an archive-strays pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrayItem {
    pub building_id: String,
    pub foundation_id: String,
    pub from: PathBuf,
    pub to: PathBuf,
    /// false when `run` was not set
    pub archived: bool,
}

/// Reconciliation operations over one data root.
#[derive(Debug, Clone)]
pub struct Maintenance {
    config: Arc<StoreConfig>,
    locator: DirectoryLocator,
}

impl Maintenance {
    pub fn new(config: Arc<StoreConfig>) -> Self {
        Self {
            locator: DirectoryLocator::new(config.clone()),
            config,
        }
    }

    /// Read-only drift report: registry vs disk, plus alias sanity.
    pub async fn audit_registry(&self) -> Result<AuditReport> {
        let entries = self.load().await?;
        let on_disk = self.scan_disk_buildings().await?;
        let mut report = AuditReport {
            registry_count: entries.len(),
            disk_count: on_disk.len(),
            ..Default::default()
        };

        let live_ids: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let mut disk_by_building: HashMap<&str, Vec<&DiskBuilding>> = HashMap::new();
        for d in &on_disk {
            disk_by_building
                .entry(d.building_id.as_str())
                .or_default()
                .push(d);
        }

        for entry in &entries {
            match disk_by_building.get(entry.id.as_str()) {
                None => report.missing_on_disk.push(entry.id.clone()),
                Some(dirs) => {
                    let canonical = self.config.building_dir(&entry.foundation_id, &entry.id);
                    for d in dirs {
                        if d.path != canonical {
                            report.wrong_location.push((*d).clone());
                        }
                    }
                }
            }
            for alias in &entry.aliases {
                if live_ids.contains(alias.as_str()) {
                    report
                        .alias_warnings
                        .push(format!("alias '{}' of '{}' is also a live id", alias, entry.id));
                }
            }
        }
        for d in &on_disk {
            if !live_ids.contains(d.building_id.as_str()) {
                report.stray_on_disk.push(d.clone());
            }
        }
        info!(
            registry = report.registry_count,
            disk = report.disk_count,
            missing = report.missing_on_disk.len(),
            wrong = report.wrong_location.len(),
            strays = report.stray_on_disk.len(),
            "registry audited"
        );
        Ok(report)
    }

    /// Bring each registered building's data back to its canonical path.
    ///
    /// For an entry whose canonical directory is absent, candidates are
    /// found by suffix and sidecar scans; a candidate already under the
    /// right foundation is preferred. Dry-run unless `run` is set.
    pub async fn normalize_building_folders(&self, run: bool) -> Result<Vec<NormalizeItem>> {
        let entries = self.load().await?;
        let mut items = Vec::new();
        for entry in &entries {
            let canonical = self.config.building_dir(&entry.foundation_id, &entry.id);
            if fsx::path_exists(&canonical).await {
                items.push(NormalizeItem {
                    id: entry.id.clone(),
                    foundation_id: entry.foundation_id.clone(),
                    status: "ok".into(),
                    from: None,
                    to: None,
                });
                continue;
            }
            let scan = self.locator.find_all(&entry.foundation_id, &entry.id).await;
            for (path, reason) in &scan.skipped {
                warn!(path = %path.display(), reason = %reason, "skipped during normalize scan");
            }
            let Some(source) = pick_candidate(&scan.matches, &entry.foundation_id) else {
                items.push(NormalizeItem {
                    id: entry.id.clone(),
                    foundation_id: entry.foundation_id.clone(),
                    status: "missing".into(),
                    from: None,
                    to: None,
                });
                continue;
            };
            if !run {
                items.push(NormalizeItem {
                    id: entry.id.clone(),
                    foundation_id: entry.foundation_id.clone(),
                    status: "would-move".into(),
                    from: Some(source),
                    to: Some(canonical),
                });
                continue;
            }
            let outcome = mover::move_with_merge(&source, &canonical).await?;
            self.repair_sidecar(&canonical, &entry.id).await;
            info!(building = %entry.id, from = %source.display(), "normalized");
            items.push(NormalizeItem {
                id: entry.id.clone(),
                foundation_id: entry.foundation_id.clone(),
                status: match outcome.strategy {
                    MoveStrategy::Moved => "moved".into(),
                    MoveStrategy::Merged => "merged".into(),
                },
                from: Some(source),
                to: Some(canonical),
            });
        }
        Ok(items)
    }

    /// Park unregistered building directories under
    /// `_archive/<foundation>/<building>`. Dry-run unless `run` is set.
    pub async fn archive_strays(&self, run: bool) -> Result<Vec<StrayItem>> {
        let entries = self.load().await?;
        let live_ids: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let mut items = Vec::new();
        for d in self.scan_disk_buildings().await? {
            if live_ids.contains(d.building_id.as_str()) {
                continue;
            }
            let dest = self
                .config
                .archive_dir()
                .join(&d.foundation_id)
                .join(&d.building_id);
            if run {
                mover::move_with_merge(&d.path, &dest).await?;
                info!(building = %d.building_id, from = %d.path.display(), "stray archived");
            }
            items.push(StrayItem {
                building_id: d.building_id,
                foundation_id: d.foundation_id,
                from: d.path,
                to: dest,
                archived: run,
            });
        }
        Ok(items)
    }

    /// Walk the orgs tree for `foundations/<fid>/buildings/<bid>` roots.
    async fn scan_disk_buildings(&self) -> Result<Vec<DiskBuilding>> {
        let mut found = Vec::new();
        let root = self.config.orgs_root();
        if !fsx::path_exists(&root).await {
            return Ok(found);
        }
        let mut pending: VecDeque<(PathBuf, usize)> = VecDeque::new();
        pending.push_back((root, 0));
        while let Some((dir, depth)) = pending.pop_front() {
            let mut rd = match fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "unreadable during disk scan");
                    continue;
                }
            };
            while let Ok(Some(entry)) = rd.next_entry().await {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('_') {
                    continue;
                }
                let is_dir = entry
                    .file_type()
                    .await
                    .map(|t| t.is_dir())
                    .unwrap_or(false);
                if !is_dir {
                    continue;
                }
                if let Some(db) = as_building_root(&path) {
                    found.push(db);
                } else if depth + 1 < self.config.scan_depth_limit {
                    pending.push_back((path, depth + 1));
                }
            }
        }
        Ok(found)
    }

    /// Make the sidecar agree with the registry id after a move.
    async fn repair_sidecar(&self, dir: &std::path::Path, id: &str) {
        let path = dir.join(SIDECAR_FILE);
        let Ok(mut value) = fsx::read_json::<serde_json::Value>(&path).await else {
            return;
        };
        if value.get("buildingId").and_then(|v| v.as_str()) == Some(id) {
            return;
        }
        value["buildingId"] = json!(id);
        if let Err(e) = fsx::write_json_atomic(&path, &value).await {
            warn!(path = %path.display(), error = %e, "sidecar not repaired");
        }
    }

    async fn load(&self) -> Result<Vec<BuildingEntry>> {
        Ok(fsx::read_json_or(&self.config.registry_file(), Vec::new()).await)
    }
}

/// Interpret a path as `.../foundations/<fid>/buildings/<bid>`.
fn as_building_root(path: &std::path::Path) -> Option<DiskBuilding> {
    let components: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let n = components.len();
    if n < 4 {
        return None;
    }
    if components[n - 2] != "buildings" || components[n - 4] != "foundations" {
        return None;
    }
    Some(DiskBuilding {
        foundation_id: components[n - 3].clone(),
        building_id: components[n - 1].clone(),
        path: path.to_path_buf(),
    })
}

/// Among candidate directories, prefer one already under the right
/// foundation; otherwise take the first.
fn pick_candidate(matches: &[PathBuf], foundation_id: &str) -> Option<PathBuf> {
    matches
        .iter()
        .find(|p| {
            p.parent()
                .and_then(|b| b.parent())
                .and_then(|f| f.file_name())
                .map(|name| name == foundation_id)
                .unwrap_or(false)
        })
        .or_else(|| matches.first())
        .cloned()
}
