//! Persistence layer for Cadastre.
//!
//! This crate provides the file-backed registry of foundations and
//! buildings, filesystem mutual exclusion, atomic writes, the backup
//! vault, directory discovery and relocation, identifier renames, the
//! per-building versioned document store, the audit log, and the
//! reconciliation tooling. All state lives under a single data root
//! described by `cadastre_core::StoreConfig`.

pub mod audit;
pub mod backup;
pub mod document;
pub mod fsx;
pub mod locate;
pub mod lock;
pub mod maintenance;
pub mod mover;
pub mod registry;
pub mod rename;

pub use audit::{AuditLog, RequestContext};
pub use backup::BackupVault;
pub use document::{DEFAULT_TEMPLATE_VERSION, DocumentStore};
pub use locate::{DirectoryLocator, SIDECAR_FILE, ScanReport};
pub use lock::{LockGuard, MutexLock, REGISTRY_LOCK};
pub use maintenance::{AuditReport, Maintenance, NormalizeItem, StrayItem};
pub use mover::{ArchiveResult, MoveOutcome, MoveStrategy};
pub use registry::{
    AddedFoundation, DeleteOptions, DeleteReport, RegistryStore, validate_registry,
};
pub use rename::{IdentifierRenamer, RenameOutcome};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::audit::{AuditLog, RequestContext};
    pub use crate::backup::BackupVault;
    pub use crate::document::DocumentStore;
    pub use crate::locate::DirectoryLocator;
    pub use crate::lock::{LockGuard, MutexLock};
    pub use crate::maintenance::Maintenance;
    pub use crate::registry::{DeleteOptions, RegistryStore};
    pub use crate::rename::IdentifierRenamer;
    pub use cadastre_core::prelude::*;
}
