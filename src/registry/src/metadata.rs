//! Identity metadata read from artifact labels.
//!
//! # Label Schema
//!
//! - `io.buildpacks.buildpackage.metadata` - JSON object `{"id": ..., "version": ...}`
//!   identifying a buildpackage. Absent on plain images.
//! - `io.buildpacks.stack.id` - stack id shared by a build and run image pair.

use kp_core::error::{KpError, Result};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// Label carrying buildpackage identity.
pub const BUILDPACKAGE_METADATA_LABEL: &str = "io.buildpacks.buildpackage.metadata";

/// Label carrying the stack id.
pub const STACK_ID_LABEL: &str = "io.buildpacks.stack.id";

/// Buildpackage id and version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackageIdentity {
    pub id: String,
    #[serde(default)]
    pub version: String,
}

impl BuildpackageIdentity {
    /// `id@version`, or just `id` when the version is empty.
    pub fn qualified(&self) -> String {
        if self.version.is_empty() {
            self.id.clone()
        } else {
            format!("{}@{}", self.id, self.version)
        }
    }
}

/// Read the buildpackage identity of `artifact`.
///
/// A missing label yields `None`; a label that is present but does not
/// decode is a format error.
pub fn extract_identity(artifact: &Artifact) -> Result<Option<BuildpackageIdentity>> {
    let Some(raw) = artifact.label(BUILDPACKAGE_METADATA_LABEL)? else {
        return Ok(None);
    };
    let identity: BuildpackageIdentity = serde_json::from_str(&raw).map_err(|e| {
        KpError::FormatError(format!(
            "label {} is not valid buildpackage metadata: {}",
            BUILDPACKAGE_METADATA_LABEL, e
        ))
    })?;
    if identity.id.trim().is_empty() {
        return Err(KpError::FormatError(format!(
            "label {} has an empty id",
            BUILDPACKAGE_METADATA_LABEL
        )));
    }
    Ok(Some(identity))
}

/// Read the stack id of `artifact`, failing if the label is missing.
pub fn stack_id(artifact: &Artifact) -> Result<String> {
    match artifact.label(STACK_ID_LABEL)? {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(KpError::FormatError(format!(
            "image is missing the {} label",
            STACK_ID_LABEL
        ))),
    }
}
