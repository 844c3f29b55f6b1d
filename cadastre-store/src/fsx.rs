//! Atomic file primitives.
//!
//! All persistent state in Cadastre is committed through [`write_atomic`]:
//! content goes to a temporary sibling first and is renamed over the
//! target, so a concurrent reader sees either the old complete file or
//! the new complete file, never a mix. A crash between write and rename
//! leaves the original untouched; the orphaned temp file is inert.

use cadastre_core::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Create a directory and all of its parents. Idempotent.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let nonce = Uuid::new_v4().simple().to_string();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!(
        "{}.tmp.{}.{}",
        name,
        std::process::id(),
        &nonce[..8]
    ))
}

/// Write `bytes` to `path` atomically via a temporary sibling + rename.
///
/// If the temp write fails, no visible state changes; the error is
/// returned to the caller.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Serialize `value` as pretty-printed JSON and commit it atomically.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

/// Read and parse a JSON file. Absent or malformed files are errors.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Read and parse a JSON file, substituting `fallback` when the file is
/// absent or malformed. Used for the tolerant readers (registry load,
/// alias map) where an empty store is a valid state.
pub async fn read_json_or<T: DeserializeOwned>(path: &Path, fallback: T) -> T {
    match fs::read(path).await {
        Ok(raw) => serde_json::from_slice(&raw).unwrap_or(fallback),
        Err(_) => fallback,
    }
}

/// Whether a path exists (file or directory).
pub async fn path_exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}
