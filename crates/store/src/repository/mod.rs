//! Repository functions: one function per persistence operation.
//!
//! Every function takes the directory it works in and returns a
//! `Result<T, StoreError>`. Files are written through a temporary sibling
//! and renamed into place, so readers never observe a half-written record.

pub mod executions;
pub mod workflows;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::StoreError;

/// Reject names that could escape the directory they are joined onto.
pub(crate) fn check_name(name: &str) -> Result<(), StoreError> {
    let escapes = name.is_empty()
        || name.contains(['/', '\\', '\0'])
        || name.contains("..");
    if escapes {
        return Err(StoreError::InvalidName(name.to_owned()));
    }
    Ok(())
}

pub(crate) fn json_path(dir: &Path, name: &str) -> Result<PathBuf, StoreError> {
    check_name(name)?;
    Ok(dir.join(format!("{name}.json")))
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    path: &Path,
    kind: &'static str,
    name: &str,
) -> Result<T, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound { kind, name: name.to_owned() });
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&bytes).map_err(|e| StoreError::json(path, e))
}

pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::json(path, e))?;

    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, bytes)
        .await
        .map_err(|e| StoreError::io(&staging, e))?;
    tokio::fs::rename(&staging, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

/// Paths of the `*.json` files directly under `dir`, sorted by file name.
/// A missing directory has no entries.
pub(crate) async fn json_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(dir, e))? {
        let path = entry.path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        if is_json && is_file {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
