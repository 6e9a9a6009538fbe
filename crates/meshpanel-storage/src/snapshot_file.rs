//! Atomic JSON file I/O for snapshots and exported artifacts.
//!
//! All writes are atomic: serialize → write tmp → fsync → rename.
//! A reader never observes a half-written file; a crash mid-write
//! leaves the previous file in place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use meshpanel_types::{MeshPanelError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// JSON file helper.
pub struct SnapshotFile;

impl SnapshotFile {
    /// Loads and deserializes a JSON file.
    ///
    /// Returns `Ok(None)` if the file does not exist or is empty.
    ///
    /// # Errors
    ///
    /// [`MeshPanelError::StorageError`] if the file cannot be read or
    /// does not parse as `T`.
    pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read(path).map_err(|e| storage_error(path, "read", e))?;

        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let value = serde_json::from_slice(&raw).map_err(|e| MeshPanelError::StorageError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;

        Ok(Some(value))
    }

    /// Serializes `value` as pretty JSON and writes it atomically.
    ///
    /// The parent directory is created if missing. If any step fails
    /// the original file is untouched.
    pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value).map_err(|e| MeshPanelError::StorageError {
            reason: format!("failed to serialize {}: {e}", path.display()),
        })?;

        let tmp_path = Self::tmp_path(path)?;

        {
            let mut file =
                fs::File::create(&tmp_path).map_err(|e| storage_error(&tmp_path, "create", e))?;

            file.write_all(&json)
                .map_err(|e| storage_error(&tmp_path, "write", e))?;

            file.sync_all()
                .map_err(|e| storage_error(&tmp_path, "fsync", e))?;
        }

        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            storage_error(path, "rename into", e)
        })?;

        Ok(())
    }

    /// Temporary sibling of `path`, creating the directory if needed.
    fn tmp_path(path: &Path) -> Result<PathBuf> {
        let parent = path.parent().ok_or_else(|| MeshPanelError::StorageError {
            reason: format!("{} has no parent directory", path.display()),
        })?;

        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| storage_error(parent, "create directory", e))?;
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("snapshot.json");

        Ok(parent.join(format!(".{file_name}.tmp")))
    }
}

fn storage_error(path: &Path, op: &str, e: std::io::Error) -> MeshPanelError {
    MeshPanelError::StorageError {
        reason: format!("failed to {op} {}: {e}", path.display()),
    }
}
