//! On-disk artifact layouts.
//!
//! Handles the two layouts local archives unpack into: an OCI image layout
//! (`oci-layout`, `index.json`, `blobs/`) and a `docker save` tree
//! (`manifest.json` naming config and layer files).

use std::path::{Path, PathBuf};

use kp_core::error::{KpError, Result};
use oci_distribution::client::{Config, ImageLayer};
use oci_distribution::manifest::OciImageManifest;
use oci_spec::image::{Arch, Descriptor, ImageIndex, MediaType, Os};
use serde::Deserialize;

use crate::artifact::{Artifact, Digest, OCI_CONFIG_MEDIA_TYPE, OCI_LAYER_TAR_MEDIA_TYPE};

/// Nested indexes deeper than this are rejected.
const MAX_INDEX_DEPTH: usize = 4;

/// Layout detected in a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Oci,
    DockerArchive,
}

impl LayoutKind {
    /// Detect the layout of `root`, if it holds one.
    pub fn detect(root: &Path) -> Option<Self> {
        if root.join("oci-layout").is_file() && root.join("index.json").is_file() {
            Some(LayoutKind::Oci)
        } else if root.join("manifest.json").is_file() {
            Some(LayoutKind::DockerArchive)
        } else {
            None
        }
    }
}

/// Load the artifact stored in the layout at `root`.
pub fn load_artifact(root: &Path) -> Result<Artifact> {
    match LayoutKind::detect(root) {
        Some(LayoutKind::Oci) => load_oci_layout(root),
        Some(LayoutKind::DockerArchive) => load_docker_archive(root),
        None => Err(KpError::FormatError(format!(
            "{} is neither an OCI image layout nor a docker archive",
            root.display()
        ))),
    }
}

/// Load the image an OCI layout's `index.json` points at.
///
/// Nested indexes are followed, preferring a linux/amd64 entry.
pub fn load_oci_layout(root: &Path) -> Result<Artifact> {
    validate_oci_layout(root)?;

    let index: ImageIndex = read_json(&root.join("index.json"), "index.json")?;
    let mut descriptor = select_manifest(&index)?.clone();
    let mut depth = 0;
    while *descriptor.media_type() == MediaType::ImageIndex {
        depth += 1;
        if depth > MAX_INDEX_DEPTH {
            return Err(KpError::FormatError(format!(
                "image index nesting in {} is too deep",
                root.display()
            )));
        }
        let nested_bytes = read_verified_blob(root, descriptor.digest())?;
        let nested: ImageIndex = parse_json(&nested_bytes, "image index")?;
        descriptor = select_manifest(&nested)?.clone();
    }

    let manifest_digest = Digest::parse(descriptor.digest())?;
    let manifest_bytes = read_blob(root, &manifest_digest)?;
    let manifest: OciImageManifest = parse_json(&manifest_bytes, "image manifest")?;

    let config_data = read_blob(root, &Digest::parse(&manifest.config.digest)?)?;
    let config = Config::new(config_data, manifest.config.media_type.clone(), None);

    let layers = manifest
        .layers
        .iter()
        .map(|layer| {
            Ok(ImageLayer::new(
                read_blob(root, &Digest::parse(&layer.digest)?)?,
                layer.media_type.clone(),
                None,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Artifact::verified(&manifest_digest, manifest_bytes, config, layers)
}

/// One image entry of a `docker save` manifest.json.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DockerArchiveEntry {
    config: String,
    #[serde(default)]
    layers: Vec<String>,
}

/// Load the first image of a `docker save` tree.
///
/// Docker layers are uncompressed tars; they are carried as such.
pub fn load_docker_archive(root: &Path) -> Result<Artifact> {
    let entries: Vec<DockerArchiveEntry> =
        read_json(&root.join("manifest.json"), "docker manifest.json")?;
    let entry = entries.into_iter().next().ok_or_else(|| {
        KpError::FormatError(format!("No images in {}/manifest.json", root.display()))
    })?;

    let config = Config::new(
        read_file(&root.join(&entry.config))?,
        OCI_CONFIG_MEDIA_TYPE.to_string(),
        None,
    );
    let layers = entry
        .layers
        .iter()
        .map(|layer| {
            Ok(ImageLayer::new(
                read_file(&root.join(layer))?,
                OCI_LAYER_TAR_MEDIA_TYPE.to_string(),
                None,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Artifact::from_blobs(config, layers)
}

fn validate_oci_layout(root: &Path) -> Result<()> {
    for required in ["oci-layout", "index.json", "blobs"] {
        if !root.join(required).exists() {
            return Err(KpError::FormatError(format!(
                "Not a valid OCI layout: missing {} in {}",
                required,
                root.display()
            )));
        }
    }
    Ok(())
}

fn select_manifest(index: &ImageIndex) -> Result<&Descriptor> {
    let manifests = index.manifests();
    let linux_amd64 = manifests.iter().find(|d| {
        d.platform()
            .as_ref()
            .is_some_and(|p| *p.os() == Os::Linux && *p.architecture() == Arch::Amd64)
    });
    linux_amd64
        .or_else(|| manifests.first())
        .ok_or_else(|| KpError::FormatError("No manifests in image index".to_string()))
}

/// Path of a blob by digest (`sha256:abc` -> `blobs/sha256/abc`).
fn blob_path(root: &Path, digest: &Digest) -> PathBuf {
    root.join("blobs").join("sha256").join(digest.hex())
}

fn read_blob(root: &Path, digest: &Digest) -> Result<Vec<u8>> {
    read_file(&blob_path(root, digest))
}

/// Read the blob named by an untrusted digest string and check its content.
fn read_verified_blob(root: &Path, digest: &str) -> Result<Vec<u8>> {
    let digest = Digest::parse(digest)?;
    let data = read_blob(root, &digest)?;
    if Digest::of(&data) != digest {
        return Err(KpError::FormatError(format!(
            "blob {} in {} does not match its digest",
            digest,
            root.display()
        )));
    }
    Ok(data)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        KpError::FormatError(format!("Failed to read {}: {}", path.display(), e))
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    parse_json(&read_file(path)?, what)
}

fn parse_json<T: serde::de::DeserializeOwned>(data: &[u8], what: &str) -> Result<T> {
    serde_json::from_slice(data)
        .map_err(|e| KpError::FormatError(format!("Failed to parse {}: {}", what, e)))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Write `artifact` as an OCI image layout under `root`.
    pub fn write_oci_layout(artifact: &Artifact, root: &Path) {
        let blobs = root.join("blobs").join("sha256");
        std::fs::create_dir_all(&blobs).unwrap();
        std::fs::write(root.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();

        let manifest_bytes = artifact.manifest_bytes();
        let write_blob = |digest: &str, data: &[u8]| {
            let hex = digest.trim_start_matches("sha256:");
            std::fs::write(blobs.join(hex), data).unwrap();
        };
        write_blob(artifact.digest().as_str(), manifest_bytes);
        write_blob(&artifact.manifest().config.digest, &artifact.config().data);
        for (descriptor, layer) in artifact.manifest().layers.iter().zip(artifact.layers()) {
            write_blob(&descriptor.digest, &layer.data);
        }

        let index = serde_json::json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": artifact.digest().as_str(),
                "size": manifest_bytes.len(),
            }]
        });
        std::fs::write(root.join("index.json"), serde_json::to_vec(&index).unwrap()).unwrap();
    }
}
