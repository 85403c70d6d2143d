use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MirrorError;

/// Where one resource lives locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub url: String,
    /// `resdir/filename`, as written back into the markup.
    pub local_path: String,
    /// Destination root joined with the local path.
    pub destination: PathBuf,
}

/// On-disk layout of one mirror: the destination root and its resource
/// subdirectory.
#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
    resdir: String,
}

impl FileManager {
    /// Does not touch the filesystem; see [`FileManager::create_directories`].
    pub fn new(base_dir: &Path, resdir: &str) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            resdir: resdir.trim_matches('/').to_string(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resource_dir(&self) -> PathBuf {
        self.base_dir.join(&self.resdir)
    }

    pub fn create_directories(&self) -> Result<(), MirrorError> {
        let resource_dir = self.resource_dir();
        fs::create_dir_all(&resource_dir).map_err(|e| MirrorError::io(resource_dir, e))
    }

    pub fn asset(&self, url: &str, filename: &str) -> LocalAsset {
        let local_path = if self.resdir.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.resdir, filename)
        };
        LocalAsset {
            url: url.to_string(),
            destination: self.resource_dir().join(filename),
            local_path,
        }
    }

    /// A regular file at the destination counts as already mirrored,
    /// whatever its content.
    pub async fn is_materialized(&self, asset: &LocalAsset) -> bool {
        tokio::fs::metadata(&asset.destination)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Writes a file directly under the destination root.
    pub fn save_file(&self, name: &str, content: &[u8]) -> Result<PathBuf, MirrorError> {
        let file_path = self.base_dir.join(name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| MirrorError::io(parent, e))?;
        }
        fs::write(&file_path, content).map_err(|e| MirrorError::io(&file_path, e))?;
        Ok(file_path)
    }
}
