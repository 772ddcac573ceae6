//! Small file helpers shared by the JSON stores

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Result, StorageError};

/// Serialize `value` as 2-space pretty JSON and replace `path` with it.
///
/// The document is written next to the target and renamed over it, so a crash
/// mid-write leaves the previous file intact.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::io(dir, e))?;
        }
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp = tmp_path(path);

    fs::write(&tmp, json.as_bytes())
        .await
        .map_err(|e| StorageError::io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::io(path, e))?;

    Ok(())
}

/// Read a whole file, mapping "not found" to `None`.
pub async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
