//! Registry backup vault.
//!
//! Every mutating registry write is preceded by a timestamped, tagged
//! copy of the live file. Backups are append-only; retention is an
//! operator concern, nothing here deletes them.

use crate::fsx;
use crate::registry::validate_registry;
use cadastre_core::id::iso_safe_now;
use cadastre_core::{BackupInfo, BuildingEntry, CadastreError, Result, StoreConfig};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::{debug, info};

/// Copies of past registry states, named `<timestamp>-<tag>.json`.
#[derive(Debug, Clone)]
pub struct BackupVault {
    config: Arc<StoreConfig>,
}

impl BackupVault {
    pub fn new(config: Arc<StoreConfig>) -> Self {
        Self { config }
    }

    /// Copy the live registry file into the vault.
    pub async fn backup(&self, tag: &str) -> Result<BackupInfo> {
        let dir = self.config.registry_backup_dir();
        fs::create_dir_all(&dir).await?;
        let id = format!("{}-{}.json", iso_safe_now(), tag);
        let dest = dir.join(&id);
        fs::copy(self.config.registry_file(), &dest).await?;
        let meta = fs::metadata(&dest).await?;
        debug!(backup = %id, "registry backed up");
        Ok(BackupInfo {
            id,
            size: meta.len(),
            mtime: mtime_millis(&meta),
        })
    }

    /// List backups, newest first.
    pub async fn list(&self) -> Result<Vec<BackupInfo>> {
        let dir = self.config.registry_backup_dir();
        let mut rd = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut items = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            items.push(BackupInfo {
                id: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                mtime: mtime_millis(&meta),
            });
        }
        items.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| b.id.cmp(&a.id)));
        Ok(items)
    }

    /// Overwrite the live registry file with a backup's contents.
    ///
    /// The backup is parsed and validated against the registry invariants
    /// first; an invalid backup is rejected and the live file untouched.
    pub async fn restore(&self, backup_id: &str) -> Result<()> {
        if backup_id.contains('/') || backup_id.contains("..") {
            return Err(CadastreError::validation(format!(
                "invalid backup id '{}'",
                backup_id
            )));
        }
        let src = self.config.registry_backup_dir().join(backup_id);
        if !fsx::path_exists(&src).await {
            return Err(CadastreError::not_found("backup", backup_id));
        }
        let mut entries: Vec<BuildingEntry> = fsx::read_json(&src).await?;
        validate_registry(&mut entries)?;
        fsx::write_json_atomic(&self.config.registry_file(), &entries).await?;
        info!(backup = backup_id, "registry restored from backup");
        Ok(())
    }
}

fn mtime_millis(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<StoreConfig>) {
        let tmp = TempDir::new().unwrap();
        let config = Arc::new(StoreConfig::new(tmp.path()));
        config.ensure_layout().unwrap();
        (tmp, config)
    }

    #[tokio::test]
    async fn test_backup_and_list_newest_first() {
        let (_tmp, config) = setup();
        let vault = BackupVault::new(config.clone());

        let first = vault.backup("manual").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = vault.backup("add-building").await.unwrap();

        let list = vault.list().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].id, first.id);
        assert!(first.id.ends_with("-manual.json"));
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let (_tmp, config) = setup();
        let vault = BackupVault::new(config.clone());

        let entries = vec![BuildingEntry::new("b1", "B 1", "fa", "Fondation A")];
        fsx::write_json_atomic(&config.registry_file(), &entries)
            .await
            .unwrap();
        let backup = vault.backup("pre-change").await.unwrap();

        // clobber the live file, then restore
        fsx::write_json_atomic(&config.registry_file(), &Vec::<BuildingEntry>::new())
            .await
            .unwrap();
        vault.restore(&backup.id).await.unwrap();

        let restored: Vec<BuildingEntry> = fsx::read_json(&config.registry_file()).await.unwrap();
        assert_eq!(restored, entries);
    }

    #[tokio::test]
    async fn test_restore_rejects_invalid_backup() {
        let (_tmp, config) = setup();
        let vault = BackupVault::new(config.clone());

        // two entries with the same id
        let dup = vec![
            BuildingEntry::new("b1", "B 1", "fa", "Fondation A"),
            BuildingEntry::new("b1", "B 1 again", "fa", "Fondation A"),
        ];
        let dir = config.registry_backup_dir();
        fs::create_dir_all(&dir).await.unwrap();
        let bad = dir.join("2024-01-01T00-00-00-000Z-bad.json");
        fs::write(&bad, serde_json::to_vec(&dup).unwrap())
            .await
            .unwrap();

        let live = vec![BuildingEntry::new("keep", "Keep", "fa", "Fondation A")];
        fsx::write_json_atomic(&config.registry_file(), &live)
            .await
            .unwrap();

        let err = vault
            .restore("2024-01-01T00-00-00-000Z-bad.json")
            .await
            .unwrap_err();
        assert!(err.is_validation());
        // live file untouched
        let current: Vec<BuildingEntry> = fsx::read_json(&config.registry_file()).await.unwrap();
        assert_eq!(current, live);
    }

    #[tokio::test]
    async fn test_restore_unknown_backup() {
        let (_tmp, config) = setup();
        let vault = BackupVault::new(config);
        let err = vault.restore("missing.json").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
