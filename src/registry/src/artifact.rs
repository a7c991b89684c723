//! Immutable OCI artifacts and their content digests.
//!
//! An [`Artifact`] holds a manifest, a config blob, and the ordered layer
//! blobs. Its digest is the SHA256 of the manifest bytes exactly as they were
//! read from a registry or bundle, or as they were first serialized for a
//! freshly built image. Those same bytes are what a relocation pushes.

use std::collections::HashMap;
use std::fmt;

use kp_core::error::{KpError, Result};
use oci_distribution::client::{Config, ImageLayer};
use oci_distribution::manifest::{OciImageManifest, OCI_IMAGE_MEDIA_TYPE};
use serde::Deserialize;
use sha2::{Digest as _, Sha256};

/// Media type of an OCI image config blob.
pub const OCI_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";

/// Media type of a gzip-compressed OCI layer.
pub const OCI_LAYER_GZIP_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Media type of an uncompressed OCI layer.
pub const OCI_LAYER_TAR_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar";

/// A `sha256:<hex>` content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    /// Digest of a byte slice.
    pub fn of(bytes: &[u8]) -> Self {
        Digest(format!("sha256:{}", hex::encode(Sha256::digest(bytes))))
    }

    /// Parse a `sha256:<64 hex>` string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.strip_prefix("sha256:") {
            Some(hex) if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
                Ok(Digest(format!("sha256:{}", hex.to_ascii_lowercase())))
            }
            _ => Err(KpError::FormatError(format!(
                "invalid digest '{}': expected sha256:<64 hex chars>",
                s
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex portion without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.0["sha256:".len()..]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable bundle of manifest, config, and ordered layers.
///
/// The manifest is kept as the exact bytes it was read or first serialized
/// as; those bytes are what get pushed and what the digest covers.
#[derive(Clone)]
pub struct Artifact {
    manifest: OciImageManifest,
    manifest_bytes: Vec<u8>,
    config: Config,
    layers: Vec<ImageLayer>,
    digest: Digest,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("digest", &self.digest)
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl Artifact {
    /// Assemble an artifact from raw manifest bytes and the blobs they name.
    ///
    /// Every blob must hash to the digest its manifest descriptor names.
    pub fn from_manifest_bytes(
        manifest_bytes: Vec<u8>,
        config: Config,
        layers: Vec<ImageLayer>,
    ) -> Result<Self> {
        let manifest: OciImageManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| KpError::FormatError(format!("invalid image manifest: {}", e)))?;

        if Digest::of(&config.data).as_str() != manifest.config.digest {
            return Err(KpError::FormatError(format!(
                "config blob does not match manifest digest {}",
                manifest.config.digest
            )));
        }
        if manifest.layers.len() != layers.len() {
            return Err(KpError::FormatError(format!(
                "manifest lists {} layers but {} were provided",
                manifest.layers.len(),
                layers.len()
            )));
        }
        for (descriptor, layer) in manifest.layers.iter().zip(&layers) {
            if Digest::of(&layer.data).as_str() != descriptor.digest {
                return Err(KpError::FormatError(format!(
                    "layer blob does not match manifest digest {}",
                    descriptor.digest
                )));
            }
        }

        let digest = Digest::of(&manifest_bytes);
        Ok(Self {
            manifest,
            manifest_bytes,
            config,
            layers,
            digest,
        })
    }

    /// Like [`from_manifest_bytes`](Self::from_manifest_bytes), but the
    /// manifest bytes must hash to `expected`.
    pub fn verified(
        expected: &Digest,
        manifest_bytes: Vec<u8>,
        config: Config,
        layers: Vec<ImageLayer>,
    ) -> Result<Self> {
        let actual = Digest::of(&manifest_bytes);
        if actual != *expected {
            return Err(KpError::FormatError(format!(
                "manifest content {} does not match digest {}",
                actual, expected
            )));
        }
        Self::from_manifest_bytes(manifest_bytes, config, layers)
    }

    /// Build an artifact with a fresh OCI manifest over `config` and `layers`.
    ///
    /// The manifest is serialized once here and those bytes are kept.
    pub fn from_blobs(config: Config, layers: Vec<ImageLayer>) -> Result<Self> {
        let manifest = OciImageManifest::build(&layers, &config, None);
        let manifest_bytes = serde_json::to_vec(&manifest)?;
        Self::from_manifest_bytes(manifest_bytes, config, layers)
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn manifest(&self) -> &OciImageManifest {
        &self.manifest
    }

    /// The manifest exactly as stored and pushed.
    pub fn manifest_bytes(&self) -> &[u8] {
        &self.manifest_bytes
    }

    /// Content type the manifest is pushed with.
    pub fn manifest_media_type(&self) -> &str {
        self.manifest
            .media_type
            .as_deref()
            .unwrap_or(OCI_IMAGE_MEDIA_TYPE)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layers(&self) -> &[ImageLayer] {
        &self.layers
    }

    /// Total bytes of config and layer blobs.
    pub fn size(&self) -> u64 {
        self.config.data.len() as u64
            + self
                .layers
                .iter()
                .map(|l| l.data.len() as u64)
                .sum::<u64>()
    }

    /// Labels from the config's `config.Labels` map.
    pub fn labels(&self) -> Result<HashMap<String, String>> {
        let file: ConfigFile = serde_json::from_slice(&self.config.data).map_err(|e| {
            KpError::FormatError(format!("artifact config is not valid JSON: {}", e))
        })?;
        Ok(file.config.and_then(|c| c.labels).unwrap_or_default())
    }

    /// A single label value, if present.
    pub fn label(&self, key: &str) -> Result<Option<String>> {
        Ok(self.labels()?.remove(key))
    }
}

/// The parts of an image config file this crate reads.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    config: Option<ContainerConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerConfig {
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
}
