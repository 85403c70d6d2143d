use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::MirrorError;
use crate::file_manager::FileManager;

pub const MANIFEST_FILE: &str = "url-log.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub mainpage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    pub local: PathBuf,
}

/// Every URL a session attempted to mirror, in discovery order, and where it
/// was (or would have been) stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorManifest {
    pub info: ManifestInfo,
    pub urls: Vec<ManifestEntry>,
}

impl MirrorManifest {
    pub fn new(mainpage: &str) -> Self {
        Self {
            info: ManifestInfo {
                mainpage: mainpage.to_string(),
            },
            urls: Vec::new(),
        }
    }

    pub fn record(&mut self, url: &str, local: &Path) {
        self.urls.push(ManifestEntry {
            url: url.to_string(),
            local: local.to_path_buf(),
        });
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ManifestEntry>) {
        self.urls.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn to_json(&self) -> Result<String, MirrorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, files: &FileManager) -> Result<PathBuf, MirrorError> {
        files.save_file(MANIFEST_FILE, self.to_json()?.as_bytes())
    }
}
