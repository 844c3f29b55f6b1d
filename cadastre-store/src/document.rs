//! Per-building versioned document store.
//!
//! Each building owns a `current.json` document with a monotonically
//! increasing `dataVersion`, a `versions/` directory of immutable
//! snapshots (one per committed mutation), and a `logs/events.log`
//! event trail. `publish` is guarded by a weak entity tag derived from
//! `dataVersion`; `save` is the unguarded autosave path.
//!
//! There is deliberately no per-building lock: concurrent saves to the
//! same building may interleave at the filesystem level, and the
//! precondition check on `publish` is the sole concurrency guard.
//! Last-writer-wins within a version is accepted.

use crate::fsx;
use crate::locate::SIDECAR_FILE;
use cadastre_core::id::version_id_now;
use cadastre_core::{
    BuildingDocument, BuildingEntry, CadastreError, Result, StoreConfig, VersionListItem,
    VersionMeta,
};
use chrono::Utc;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Template version stamped on documents created before any template is
/// configured.
pub const DEFAULT_TEMPLATE_VERSION: &str = "dev";

/// The versioned document store.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    config: Arc<StoreConfig>,
}

impl DocumentStore {
    pub fn new(config: Arc<StoreConfig>) -> Self {
        Self { config }
    }

    /// Resolve the directory holding a building's data.
    ///
    /// Prefers the canonical path; when absent, scans the foundations
    /// root for a foundation directory already holding this building
    /// (tolerates trees from before a foundation rename).
    pub async fn building_dir(&self, entry: &BuildingEntry) -> PathBuf {
        let canonical = self.config.building_dir(&entry.foundation_id, &entry.id);
        if fsx::path_exists(&canonical).await {
            return canonical;
        }
        let root = self.config.foundations_root();
        if let Ok(mut rd) = fs::read_dir(&root).await {
            while let Ok(Some(found)) = rd.next_entry().await {
                let candidate = found.path().join("buildings").join(&entry.id);
                if fsx::path_exists(&candidate).await {
                    debug!(building = %entry.id, dir = %candidate.display(), "using non-canonical building dir");
                    return candidate;
                }
            }
        }
        canonical
    }

    /// Create the current document when missing (`dataVersion` 1, empty
    /// payload) along with an `init` snapshot, then return it.
    pub async fn ensure_initialized(&self, entry: &BuildingEntry) -> Result<BuildingDocument> {
        let dir = self.building_dir(entry).await;
        let current = dir.join(SIDECAR_FILE);
        if !fsx::path_exists(&current).await {
            let doc = BuildingDocument::initial(&entry.id, DEFAULT_TEMPLATE_VERSION);
            fsx::write_json_atomic(&current, &doc).await?;
            self.write_snapshot(&dir, &doc, "init").await?;
            self.log_event(&dir, "init", doc.data_version, json!({})).await;
            info!(building = %entry.id, "document initialized");
        }
        fsx::read_json(&current).await
    }

    /// Read the current document and its precondition token.
    pub async fn read(&self, entry: &BuildingEntry) -> Result<(BuildingDocument, String)> {
        let doc = self.ensure_initialized(entry).await?;
        let etag = doc.etag();
        Ok((doc, etag))
    }

    /// Unconditional write: bump the version, commit, snapshot. The
    /// autosave path; no precondition check.
    pub async fn save(&self, entry: &BuildingEntry, data: Value, reason: &str) -> Result<u64> {
        let reason = if reason.is_empty() { "save" } else { reason };
        self.commit(entry, data, reason, "save", json!({ "reason": reason }))
            .await
    }

    /// Guarded write: rejects a stale precondition token with the live
    /// version attached so the caller can re-fetch and retry. On success
    /// the result is the committed baseline for diffing.
    pub async fn publish(
        &self,
        entry: &BuildingEntry,
        data: Value,
        supplied_etag: &str,
        reason: &str,
    ) -> Result<u64> {
        let current = self.ensure_initialized(entry).await?;
        if supplied_etag != current.etag() {
            debug!(
                building = %entry.id,
                supplied = supplied_etag,
                current = current.data_version,
                "publish precondition failed"
            );
            return Err(CadastreError::precondition_failed(current.data_version));
        }
        let reason = if reason.is_empty() { "publish" } else { reason };
        self.commit(entry, data, reason, "publish", json!({ "reason": reason }))
            .await
    }

    /// Write a past snapshot as the new current document. Forward-only:
    /// the version becomes current + 1, never the snapshot's own.
    pub async fn restore(&self, entry: &BuildingEntry, version_id: &str) -> Result<u64> {
        let snapshot = self.get_version(entry, version_id).await?;
        let current = self.ensure_initialized(entry).await?;
        let dir = self.building_dir(entry).await;

        let next = BuildingDocument {
            building_id: entry.id.clone(),
            template_version: snapshot.template_version.clone(),
            data_version: current.data_version + 1,
            data: snapshot.data,
            files_index: if snapshot.files_index.is_empty() {
                current.files_index
            } else {
                snapshot.files_index
            },
        };
        fsx::write_json_atomic(&dir.join(SIDECAR_FILE), &next).await?;
        self.write_snapshot(&dir, &next, "restore").await?;
        self.log_event(
            &dir,
            "restore",
            next.data_version,
            json!({ "versionId": version_id }),
        )
        .await;
        info!(building = %entry.id, version = version_id, new_version = next.data_version, "restored");
        Ok(next.data_version)
    }

    /// List snapshot history, newest first.
    pub async fn list_versions(&self, entry: &BuildingEntry) -> Result<Vec<VersionListItem>> {
        let dir = self.building_dir(entry).await.join("versions");
        let mut rd = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut items = Vec::new();
        while let Some(found) = rd.next_entry().await? {
            if !found.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let version_id = found.file_name().to_string_lossy().into_owned();
            let meta: Option<VersionMeta> = fsx::read_json(&found.path().join("meta.json"))
                .await
                .ok();
            items.push(match meta {
                Some(meta) => VersionListItem {
                    version_id,
                    created_at: meta.created_at.to_rfc3339(),
                    data_version: meta.data_version,
                },
                // directory name is itself a sortable timestamp
                None => VersionListItem {
                    created_at: version_id.clone(),
                    version_id,
                    data_version: 0,
                },
            });
        }
        // version ids are filename-safe timestamps, sortable regardless
        // of whether a readable meta.json supplied created_at
        items.sort_by(|a, b| b.version_id.cmp(&a.version_id));
        Ok(items)
    }

    /// Load one snapshot.
    pub async fn get_version(
        &self,
        entry: &BuildingEntry,
        version_id: &str,
    ) -> Result<BuildingDocument> {
        if version_id.contains('/') || version_id.contains("..") {
            return Err(CadastreError::validation(format!(
                "invalid version id '{}'",
                version_id
            )));
        }
        let path = self
            .building_dir(entry)
            .await
            .join("versions")
            .join(version_id)
            .join("snapshot.json");
        if !fsx::path_exists(&path).await {
            return Err(CadastreError::not_found("version", version_id));
        }
        fsx::read_json(&path).await
    }

    async fn commit(
        &self,
        entry: &BuildingEntry,
        data: Value,
        reason: &str,
        event: &str,
        event_meta: Value,
    ) -> Result<u64> {
        let current = self.ensure_initialized(entry).await?;
        let dir = self.building_dir(entry).await;
        let next = BuildingDocument {
            building_id: entry.id.clone(),
            template_version: current.template_version.clone(),
            data_version: current.data_version + 1,
            data,
            files_index: current.files_index,
        };
        fsx::write_json_atomic(&dir.join(SIDECAR_FILE), &next).await?;
        self.write_snapshot(&dir, &next, reason).await?;
        self.log_event(&dir, event, next.data_version, event_meta).await;
        Ok(next.data_version)
    }

    async fn write_snapshot(
        &self,
        dir: &Path,
        doc: &BuildingDocument,
        reason: &str,
    ) -> Result<String> {
        let version_id = version_id_now();
        let vdir = dir.join("versions").join(&version_id);
        fsx::write_json_atomic(&vdir.join("snapshot.json"), doc).await?;
        let meta = VersionMeta {
            version_id: version_id.clone(),
            created_at: Utc::now(),
            data_version: doc.data_version,
            by: "system".to_string(),
            reason: reason.to_string(),
        };
        fsx::write_json_atomic(&vdir.join("meta.json"), &meta).await?;
        Ok(version_id)
    }

    /// Append one line to the building's event log. Best-effort: the
    /// document commit has already happened.
    async fn log_event(&self, dir: &Path, event: &str, data_version: u64, meta: Value) {
        let logs = dir.join("logs");
        if let Err(e) = fs::create_dir_all(&logs).await {
            warn!(dir = %logs.display(), error = %e, "event not logged");
            return;
        }
        let record = json!({
            "ts": Utc::now().to_rfc3339(),
            "evt": event,
            "dataVersion": data_version,
            "by": "system",
            "meta": meta,
        });
        let mut line = record.to_string().into_bytes();
        line.push(b'\n');
        let result = async {
            let mut file = fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(logs.join("events.log"))
                .await?;
            file.write_all(&line).await
        }
        .await;
        if let Err(e) = result {
            warn!(dir = %dir.display(), error = %e, "event not logged");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<StoreConfig>, DocumentStore, BuildingEntry) {
        let tmp = TempDir::new().unwrap();
        let config = Arc::new(StoreConfig::new(tmp.path()));
        let store = DocumentStore::new(config.clone());
        let entry = BuildingEntry::new("a-b1", "Bâtiment 1", "fa", "Fondation A");
        (tmp, config, store, entry)
    }

    #[tokio::test]
    async fn test_lazy_initialization() {
        let (_tmp, config, store, entry) = setup();
        let doc = store.ensure_initialized(&entry).await.unwrap();
        assert_eq!(doc.data_version, 1);
        assert_eq!(doc.building_id, "a-b1");
        assert!(config.building_dir("fa", "a-b1").join("current.json").exists());
        // one init snapshot
        let versions = store.list_versions(&entry).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].data_version, 1);
    }

    #[tokio::test]
    async fn test_save_bumps_version_by_one() {
        let (_tmp, _config, store, entry) = setup();
        let v2 = store
            .save(&entry, json!({"field": "a"}), "autosave")
            .await
            .unwrap();
        assert_eq!(v2, 2);
        let v3 = store.save(&entry, json!({"field": "b"}), "").await.unwrap();
        assert_eq!(v3, 3);
        let (doc, etag) = store.read(&entry).await.unwrap();
        assert_eq!(doc.data_version, 3);
        assert_eq!(etag, "W/\"3\"");
        assert_eq!(doc.data["field"], "b");
    }

    #[tokio::test]
    async fn test_publish_rejects_stale_etag_with_current_version() {
        let (_tmp, _config, store, entry) = setup();
        let (_, etag) = store.read(&entry).await.unwrap(); // W/"1"

        // writer A commits first
        let v2 = store
            .publish(&entry, json!({"a": 1}), &etag, "publish")
            .await
            .unwrap();
        assert_eq!(v2, 2);

        // writer B still holds W/"1"
        let err = store
            .publish(&entry, json!({"b": 2}), &etag, "publish")
            .await
            .unwrap_err();
        match err {
            CadastreError::PreconditionFailed { current } => assert_eq!(current, 2),
            other => panic!("expected precondition failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_restore_is_forward_only() {
        let (_tmp, _config, store, entry) = setup();
        store.save(&entry, json!({"v": "first"}), "save").await.unwrap(); // v2
        store.save(&entry, json!({"v": "second"}), "save").await.unwrap(); // v3

        // find the snapshot holding v2
        let versions = store.list_versions(&entry).await.unwrap();
        let mut target = None;
        for item in &versions {
            let snap = store.get_version(&entry, &item.version_id).await.unwrap();
            if snap.data_version == 2 {
                target = Some(item.version_id.clone());
            }
        }
        let target = target.expect("v2 snapshot exists");

        let v4 = store.restore(&entry, &target).await.unwrap();
        assert_eq!(v4, 4, "restore bumps forward, never rewinds");
        let (doc, _) = store.read(&entry).await.unwrap();
        assert_eq!(doc.data["v"], "first");
        assert_eq!(doc.data_version, 4);
    }

    #[tokio::test]
    async fn test_restore_unknown_version() {
        let (_tmp, _config, store, entry) = setup();
        store.ensure_initialized(&entry).await.unwrap();
        let err = store.restore(&entry, "2020-bogus").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_versions_newest_first() {
        let (_tmp, _config, store, entry) = setup();
        store.save(&entry, json!({"n": 1}), "save").await.unwrap();
        store.save(&entry, json!({"n": 2}), "save").await.unwrap();
        let versions = store.list_versions(&entry).await.unwrap();
        assert_eq!(versions.len(), 3); // init + 2 saves
        assert_eq!(versions[0].data_version, 3);
        assert_eq!(versions[2].data_version, 1);
    }

    #[tokio::test]
    async fn test_list_versions_order_survives_missing_meta() {
        let (_tmp, _config, store, entry) = setup();
        store.save(&entry, json!({"n": 1}), "save").await.unwrap();
        store.save(&entry, json!({"n": 2}), "save").await.unwrap();

        let versions = store.list_versions(&entry).await.unwrap();
        let newest = versions[0].version_id.clone();
        assert_eq!(versions[0].data_version, 3);

        // the newest snapshot loses its meta.json; its listing entry
        // falls back to the directory name but keeps its position
        let dir = store.building_dir(&entry).await;
        fs::remove_file(dir.join("versions").join(&newest).join("meta.json"))
            .await
            .unwrap();

        let versions = store.list_versions(&entry).await.unwrap();
        assert_eq!(versions[0].version_id, newest);
        assert_eq!(versions[0].data_version, 0); // unknown without meta
        assert_eq!(versions[1].data_version, 2);
    }

    #[tokio::test]
    async fn test_building_dir_tolerates_moved_foundation() {
        let (_tmp, config, store, entry) = setup();
        // data lives under a foundation directory that no longer matches
        // the registry's foundation id
        let legacy = config
            .foundations_root()
            .join("fa-old")
            .join("buildings")
            .join("a-b1");
        fs::create_dir_all(&legacy).await.unwrap();

        let dir = store.building_dir(&entry).await;
        assert_eq!(dir, legacy);
    }

    #[tokio::test]
    async fn test_events_logged_per_commit() {
        let (_tmp, _config, store, entry) = setup();
        store.save(&entry, json!({}), "save").await.unwrap();
        let dir = store.building_dir(&entry).await;
        let log = fs::read_to_string(dir.join("logs/events.log")).await.unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2); // init + save
        assert!(lines[0].contains("\"init\""));
        assert!(lines[1].contains("\"save\""));
    }
}
