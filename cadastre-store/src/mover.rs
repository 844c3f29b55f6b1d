//! Directory relocation: atomic rename with copy fallback, merge moves,
//! and archive-before-erase for delete operations.

use cadastre_core::id::iso_safe_now;
use cadastre_core::{Result, StoreConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// How a move was carried out, for audit reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveStrategy {
    /// Destination did not exist; the tree was renamed (or copied
    /// wholesale when rename was not possible, e.g. cross-device).
    Moved,
    /// Destination existed; source files were copied in without
    /// overwriting, then the source was removed.
    Merged,
}

/// Outcome of a directory move.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MoveOutcome {
    pub strategy: MoveStrategy,
}

/// Move `src` to `dest`, preferring an atomic rename and falling back to
/// recursive copy + delete when rename fails.
pub async fn move_dir(src: &Path, dest: &Path) -> Result<MoveOutcome> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    match fs::rename(src, dest).await {
        Ok(()) => {
            debug!(src = %src.display(), dest = %dest.display(), "renamed");
            return Ok(MoveOutcome {
                strategy: MoveStrategy::Moved,
            });
        }
        Err(e) => {
            debug!(src = %src.display(), error = %e, "rename failed, copying");
        }
    }
    copy_recursive(src, dest, true).await?;
    fs::remove_dir_all(src).await?;
    info!(src = %src.display(), dest = %dest.display(), "moved via copy fallback");
    Ok(MoveOutcome {
        strategy: MoveStrategy::Moved,
    })
}

/// Move `src` into `dest`, merging when `dest` already exists.
///
/// The merge copies files from `src` without overwriting anything already
/// present, so an interrupted prior merge is resumable and never destroys
/// newer data at the destination. `src` is removed afterwards.
pub async fn move_with_merge(src: &Path, dest: &Path) -> Result<MoveOutcome> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    if fs::metadata(dest).await.is_err() {
        return move_dir(src, dest).await;
    }
    copy_recursive(src, dest, false).await?;
    fs::remove_dir_all(src).await?;
    info!(src = %src.display(), dest = %dest.display(), "merged");
    Ok(MoveOutcome {
        strategy: MoveStrategy::Merged,
    })
}

/// Iterative recursive copy. With `overwrite` false, existing destination
/// files are left in place.
async fn copy_recursive(src: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    let mut stack = vec![(src.to_path_buf(), dest.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        let meta = fs::metadata(&from).await?;
        if meta.is_dir() {
            fs::create_dir_all(&to).await?;
            let mut rd = fs::read_dir(&from).await?;
            while let Some(entry) = rd.next_entry().await? {
                stack.push((entry.path(), to.join(entry.file_name())));
            }
        } else {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).await?;
            }
            if overwrite || fs::metadata(&to).await.is_err() {
                fs::copy(&from, &to).await?;
            }
        }
    }
    Ok(())
}

/// Result of archiving a set of directories.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveResult {
    /// Archive root for this batch (`<data backups>/<ts>-<tag>`)
    pub root: PathBuf,
    /// (from, to) pairs actually copied
    pub archived: Vec<(PathBuf, PathBuf)>,
    /// Number of source trees erased
    pub erased: usize,
}

/// Copy each directory into a timestamped, tagged archive under the data
/// backup root, preserving its path relative to the data root. Erasing
/// the originals is opt-in; the archive copy is made regardless, so
/// erased data stays recoverable.
pub async fn archive_dirs(
    config: &StoreConfig,
    paths: &[PathBuf],
    tag: &str,
    erase: bool,
) -> Result<ArchiveResult> {
    let root = config
        .data_backup_dir()
        .join(format!("{}-{}", iso_safe_now(), tag));
    let mut result = ArchiveResult {
        root: root.clone(),
        archived: Vec::new(),
        erased: 0,
    };
    for p in paths {
        let rel = p
            .strip_prefix(&config.data_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(p.file_name().unwrap_or_default()));
        let dest = root.join(rel);
        copy_recursive(p, &dest, true).await?;
        result.archived.push((p.clone(), dest));
        if erase {
            if let Err(e) = fs::remove_dir_all(p).await {
                warn!(path = %p.display(), error = %e, "failed to erase archived directory");
            } else {
                result.erased += 1;
            }
        }
    }
    Ok(result)
}
