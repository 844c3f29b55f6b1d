//! Directory discovery for buildings whose data is not where the
//! canonical path says it should be.
//!
//! Three strategies, tried in order: the canonical path, a bounded
//! breadth-first scan for the `foundations/<fid>/buildings/<bid>` path
//! suffix, and a sidecar scan matching the `buildingId` embedded in
//! `current.json` files (tolerates directories moved without being
//! renamed). All scans are read-only and fail soft: per-subtree IO
//! errors are collected, not fatal.

use cadastre_core::StoreConfig;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Sidecar file naming the building a directory belongs to.
pub const SIDECAR_FILE: &str = "current.json";

/// Result of a discovery scan. `skipped` carries the subtrees the scan
/// could not read, so callers can log them instead of losing the
/// information.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub matches: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, String)>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    fn skip(&mut self, path: &Path, err: impl std::fmt::Display) {
        self.skipped.push((path.to_path_buf(), err.to_string()));
    }
}

/// Finds physical directories for logical building identifiers.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    config: Arc<StoreConfig>,
}

impl DirectoryLocator {
    pub fn new(config: Arc<StoreConfig>) -> Self {
        Self { config }
    }

    /// Find directories for a building: canonical path first, then a
    /// bounded suffix scan over the plausible roots.
    pub async fn find_building_dirs(&self, foundation_id: &str, building_id: &str) -> ScanReport {
        let mut report = ScanReport::default();
        let canonical = self.config.building_dir(foundation_id, building_id);
        if fs::metadata(&canonical).await.is_ok() {
            report.matches.push(canonical);
            return report;
        }

        let suffix = self.config.building_dir_suffix(foundation_id, building_id);
        for root_name in ["orgs", "sites", "."] {
            let root = if root_name == "." {
                self.config.data_root.clone()
            } else {
                self.config.data_root.join(root_name)
            };
            match fs::metadata(&root).await {
                Ok(meta) if meta.is_dir() => {}
                _ => continue,
            }
            self.scan_for_suffix(&root, &suffix, &mut report).await;
        }
        // the "." root re-visits orgs/; keep each directory once
        let mut seen = std::collections::HashSet::new();
        report.matches.retain(|p| seen.insert(p.clone()));
        debug!(
            building = building_id,
            matches = report.matches.len(),
            skipped = report.skipped.len(),
            "suffix scan finished"
        );
        report
    }

    /// Breadth-first scan under `root` for directories ending with
    /// `suffix`, bounded by the configured depth limit. Reserved
    /// `_`-prefixed trees (backups, locks, archive) are pruned.
    async fn scan_for_suffix(&self, root: &Path, suffix: &Path, report: &mut ScanReport) {
        let mut pending: VecDeque<(PathBuf, usize)> = VecDeque::new();
        pending.push_back((root.to_path_buf(), 0));
        while let Some((dir, depth)) = pending.pop_front() {
            let mut rd = match fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) => {
                    report.skip(&dir, e);
                    continue;
                }
            };
            loop {
                let entry = match rd.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        report.skip(&dir, e);
                        break;
                    }
                };
                let path = entry.path();
                let is_dir = match entry.file_type().await {
                    Ok(ft) => ft.is_dir(),
                    Err(e) => {
                        report.skip(&path, e);
                        continue;
                    }
                };
                if !is_dir || entry.file_name().to_string_lossy().starts_with('_') {
                    continue;
                }
                if path.ends_with(suffix) {
                    report.matches.push(path);
                } else if depth + 1 < self.config.scan_depth_limit {
                    pending.push_back((path, depth + 1));
                }
            }
        }
    }

    /// Last-resort discovery: scan for sidecar files whose embedded
    /// `buildingId` matches, returning their parent directories.
    pub async fn find_by_sidecar(&self, building_id: &str) -> ScanReport {
        let root = self.config.orgs_root();
        let building_id = building_id.to_string();
        let depth_limit = self.config.scan_depth_limit;
        // walkdir is synchronous; the tree under orgs/ is small and the
        // scan is read-only
        let report = tokio::task::spawn_blocking(move || {
            let mut report = ScanReport::default();
            for entry in WalkDir::new(&root).max_depth(depth_limit) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        let path = e.path().unwrap_or(&root).to_path_buf();
                        report.skipped.push((path, e.to_string()));
                        continue;
                    }
                };
                if !entry.file_type().is_file() || entry.file_name() != SIDECAR_FILE {
                    continue;
                }
                let raw = match std::fs::read(entry.path()) {
                    Ok(raw) => raw,
                    Err(e) => {
                        report.skip(entry.path(), e);
                        continue;
                    }
                };
                let Ok(value) = serde_json::from_slice::<serde_json::Value>(&raw) else {
                    continue;
                };
                if value.get("buildingId").and_then(|v| v.as_str()) == Some(&building_id) {
                    if let Some(parent) = entry.path().parent() {
                        report.matches.push(parent.to_path_buf());
                    }
                }
            }
            report
        })
        .await
        .map_err(|e| cadastre_core::CadastreError::internal(e.to_string()));
        match report {
            Ok(report) => report,
            Err(e) => {
                let mut report = ScanReport::default();
                report.skip(&self.config.orgs_root(), e);
                report
            }
        }
    }

    /// Combined discovery used by rename and delete: canonical + suffix
    /// scan, then the sidecar scan when nothing was found.
    pub async fn find_all(&self, foundation_id: &str, building_id: &str) -> ScanReport {
        let report = self.find_building_dirs(foundation_id, building_id).await;
        if !report.is_empty() {
            return report;
        }
        let mut fallback = self.find_by_sidecar(building_id).await;
        fallback.skipped.extend(report.skipped);
        fallback
    }
}
