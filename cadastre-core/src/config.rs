//! Store configuration and data-root layout.
//!
//! All on-disk locations are derived from a single [`StoreConfig`] that is
//! constructed once at startup and passed by reference into every
//! component. There is no ambient global state; tests build a config
//! pointing at a temporary directory.
//!
//! # Directory Structure
//!
//! ```text
//! <data_root>/
//! ├── buildings.json                  # the registry file
//! ├── _admin/
//! │   ├── audit.log                   # append-only audit trail (JSONL)
//! │   └── foundation-aliases.json     # old foundation id -> current id
//! ├── _backups/
//! │   ├── registry/                   # timestamped registry copies
//! │   └── data/                       # archived directory trees
//! ├── _locks/                         # mutex markers (<name>.lock/)
//! ├── _archive/                       # strays parked by maintenance
//! └── orgs/<client_id>/foundations/<fid>/buildings/<bid>/
//!     ├── current.json                # the building document
//!     ├── files/                      # uploaded files
//!     ├── logs/events.log             # per-building event log
//!     └── versions/<version_id>/      # snapshot.json + meta.json
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the data root.
pub const ENV_DATA_ROOT: &str = "CADASTRE_DATA_ROOT";
/// Environment variable overriding the client (tenant) id.
pub const ENV_CLIENT_ID: &str = "CADASTRE_CLIENT_ID";

/// Default client id used when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "main";

/// Default bound on lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(8);
/// Default interval between lock acquisition attempts.
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(150);
/// Default depth cap for directory discovery scans.
pub const DEFAULT_SCAN_DEPTH_LIMIT: usize = 12;

/// Configuration for a Cadastre data root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root of all persisted state
    pub data_root: PathBuf,

    /// Tenant identifier; selects the org subtree
    pub client_id: String,

    /// How long mutex acquisition may wait before failing
    #[serde(skip, default = "default_lock_timeout")]
    pub lock_timeout: Duration,

    /// Poll interval while waiting for a mutex
    #[serde(skip, default = "default_lock_poll_interval")]
    pub lock_poll_interval: Duration,

    /// Depth cap for directory discovery scans
    pub scan_depth_limit: usize,
}

fn default_lock_timeout() -> Duration {
    DEFAULT_LOCK_TIMEOUT
}

fn default_lock_poll_interval() -> Duration {
    DEFAULT_LOCK_POLL_INTERVAL
}

impl StoreConfig {
    /// Create a config for the given data root with default settings.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
            scan_depth_limit: DEFAULT_SCAN_DEPTH_LIMIT,
        }
    }

    /// Resolve the data root from the environment, falling back to
    /// `./data` under the current working directory.
    pub fn from_env() -> Self {
        let data_root = std::env::var(ENV_DATA_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let mut config = Self::new(data_root);
        if let Ok(client_id) = std::env::var(ENV_CLIENT_ID) {
            if !client_id.trim().is_empty() {
                config.client_id = client_id.trim().to_string();
            }
        }
        config
    }

    /// Override the client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// The registry file holding all building entries.
    pub fn registry_file(&self) -> PathBuf {
        self.data_root.join("buildings.json")
    }

    /// Administrative state (audit log, alias map).
    pub fn admin_dir(&self) -> PathBuf {
        self.data_root.join("_admin")
    }

    /// Timestamped registry backups.
    pub fn registry_backup_dir(&self) -> PathBuf {
        self.data_root.join("_backups").join("registry")
    }

    /// Archived directory trees from delete operations.
    pub fn data_backup_dir(&self) -> PathBuf {
        self.data_root.join("_backups").join("data")
    }

    /// Mutex markers.
    pub fn lock_dir(&self) -> PathBuf {
        self.data_root.join("_locks")
    }

    /// Stray directories parked by maintenance.
    pub fn archive_dir(&self) -> PathBuf {
        self.data_root.join("_archive")
    }

    /// The append-only audit log.
    pub fn audit_log_file(&self) -> PathBuf {
        self.admin_dir().join("audit.log")
    }

    /// Map of renamed foundation ids to their current id.
    pub fn foundation_aliases_file(&self) -> PathBuf {
        self.admin_dir().join("foundation-aliases.json")
    }

    /// Root of all org subtrees.
    pub fn orgs_root(&self) -> PathBuf {
        self.data_root.join("orgs")
    }

    /// Root holding this tenant's foundation directories.
    pub fn foundations_root(&self) -> PathBuf {
        self.orgs_root().join(&self.client_id).join("foundations")
    }

    /// Canonical directory for a building's data.
    pub fn building_dir(&self, foundation_id: &str, building_id: &str) -> PathBuf {
        self.foundations_root()
            .join(foundation_id)
            .join("buildings")
            .join(building_id)
    }

    /// The relative suffix a building directory path must end with.
    pub fn building_dir_suffix(&self, foundation_id: &str, building_id: &str) -> PathBuf {
        Path::new("foundations")
            .join(foundation_id)
            .join("buildings")
            .join(building_id)
    }

    /// Create the administrative directories and an empty registry file
    /// when missing. Idempotent.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        for dir in [
            self.admin_dir(),
            self.registry_backup_dir(),
            self.data_backup_dir(),
            self.lock_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        let registry = self.registry_file();
        if !registry.exists() {
            std::fs::write(&registry, "[]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_layout() {
        let config = StoreConfig::new("/srv/data");
        assert_eq!(
            config.registry_file(),
            PathBuf::from("/srv/data/buildings.json")
        );
        assert_eq!(
            config.building_dir("fa", "a-b1"),
            PathBuf::from("/srv/data/orgs/main/foundations/fa/buildings/a-b1")
        );
    }

    #[test]
    fn test_client_id_override() {
        let config = StoreConfig::new("/srv/data").with_client_id("acme");
        assert!(
            config
                .foundations_root()
                .to_string_lossy()
                .contains("orgs/acme/foundations")
        );
    }

    #[test]
    fn test_ensure_layout_creates_registry() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::new(tmp.path());
        config.ensure_layout().unwrap();
        assert!(config.registry_file().exists());
        assert!(config.lock_dir().is_dir());
        // idempotent
        config.ensure_layout().unwrap();
        let raw = std::fs::read_to_string(config.registry_file()).unwrap();
        assert_eq!(raw, "[]");
    }
}
