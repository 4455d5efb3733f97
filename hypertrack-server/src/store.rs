//! JSON file persistence for subscriber registrations.

use hypertrack_core::subscriptions::RegistrySnapshot;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subscriber store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("subscriber store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Keeps the registry snapshot in one JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes writers so two saves never share the temp file.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored snapshot. A missing file means a fresh install.
    pub async fn load(&self) -> Result<Option<RegistrySnapshot>, StoreError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Write atomically: write to temp file, then rename.
    pub async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
