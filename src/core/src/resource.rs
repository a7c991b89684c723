//! Resource documents the engine's results are written into.
//!
//! The engine itself never persists anything; callers load a document,
//! apply the references the engine returned, and save it back when the
//! execution mode allows.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{KpError, Result};

/// Build and run image references of a stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackImages {
    /// Stack id shared by both images
    pub id: String,
    /// Canonical build image reference
    pub build_image: String,
    /// Canonical run image reference
    pub run_image: String,
}

/// One buildpackage entry of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreImage {
    /// Canonical buildpackage reference
    pub image: String,
    /// Buildpackage id, when the artifact carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Buildpackage version, when the artifact carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl StoreImage {
    /// Whether this entry is identified by `identity` (`id` or `id@version`).
    pub fn matches(&self, identity: &str) -> bool {
        let Some(id) = self.id.as_deref() else {
            return self.image == identity;
        };
        match identity.split_once('@') {
            Some((want_id, want_version)) => {
                id == want_id && self.version.as_deref() == Some(want_version)
            }
            None => id == identity,
        }
    }
}

/// Ordered buildpackage sources of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSources {
    #[serde(default)]
    pub sources: Vec<StoreImage>,
}

impl StoreSources {
    /// Find an entry whose canonical reference is exactly `image`.
    pub fn find_image(&self, image: &str) -> Option<&StoreImage> {
        self.sources.iter().find(|s| s.image == image)
    }

    /// Append an entry unless the same canonical reference is already present.
    ///
    /// Returns true if the entry was added.
    pub fn add(&mut self, entry: StoreImage) -> bool {
        if self.find_image(&entry.image).is_some() {
            return false;
        }
        self.sources.push(entry);
        true
    }

    /// Remove every entry matching `identity`, preserving the order of the rest.
    ///
    /// Returns the number of removed entries.
    pub fn remove_matching(&mut self, identity: &str) -> usize {
        let before = self.sources.len();
        self.sources.retain(|s| !s.matches(identity));
        before - self.sources.len()
    }
}

/// Relocated lifecycle image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleImage {
    pub image: String,
}

/// Document encoding, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => DocumentFormat::Yaml,
            _ => DocumentFormat::Json,
        }
    }

    pub fn render<T: Serialize>(self, value: &T) -> Result<String> {
        Ok(match self {
            DocumentFormat::Json => {
                let mut s = serde_json::to_string_pretty(value)?;
                s.push('\n');
                s
            }
            DocumentFormat::Yaml => serde_yaml::to_string(value)?,
        })
    }
}

/// Load a document, returning `None` if the file does not exist.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value = match DocumentFormat::for_path(path) {
        DocumentFormat::Json => serde_json::from_str(&data)?,
        DocumentFormat::Yaml => serde_yaml::from_str(&data)?,
    };
    Ok(Some(value))
}

/// Load a document that must exist.
pub fn require_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    load_document(path)?.ok_or_else(|| {
        KpError::NotFoundError(format!("resource file '{}' does not exist", path.display()))
    })
}

/// Save a document atomically (write tmp, rename).
pub fn save_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let data = DocumentFormat::for_path(path).render(value)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
