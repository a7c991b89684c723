//! OCI registry client for pulling and pushing artifacts.
//!
//! Uses the `oci-distribution` crate to talk to container registries and
//! maps its failures onto the engine's error kinds.

use kp_core::config::RegistryOptions;
use kp_core::error::{KpError, Result};
use oci_distribution::client::{
    Certificate, CertificateEncoding, ClientConfig, ClientProtocol, Config, ImageLayer,
};
use oci_distribution::errors::{OciDistributionError, OciErrorCode};
use oci_distribution::manifest::{
    ImageIndexEntry, OciImageIndex, OciImageManifest, IMAGE_MANIFEST_LIST_MEDIA_TYPE,
    IMAGE_MANIFEST_MEDIA_TYPE, OCI_IMAGE_INDEX_MEDIA_TYPE, OCI_IMAGE_MEDIA_TYPE,
};
use oci_distribution::{Client, Reference, RegistryOperation};

use crate::artifact::{Artifact, Digest};
use crate::keychain::RegistryAuth;
use crate::reference::ImageReference;

const MANIFEST_MEDIA_TYPES: &[&str] = &[
    OCI_IMAGE_MEDIA_TYPE,
    IMAGE_MANIFEST_MEDIA_TYPE,
    OCI_IMAGE_INDEX_MEDIA_TYPE,
    IMAGE_MANIFEST_LIST_MEDIA_TYPE,
];

/// TLS and protocol settings for registry connections.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Extra PEM-encoded CA certificate to trust
    pub ca_cert_pem: Option<Vec<u8>>,
    /// Verify registry TLS certificates
    pub verify_certs: bool,
    /// Registries reached over plain HTTP
    pub insecure_registries: Vec<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            ca_cert_pem: None,
            verify_certs: true,
            insecure_registries: Vec::new(),
        }
    }
}

impl ClientOptions {
    /// Build client options from configured registry options, reading the CA file.
    pub fn from_registry_options(options: &RegistryOptions) -> Result<Self> {
        let ca_cert_pem = match &options.ca_cert_path {
            Some(path) => Some(std::fs::read(path).map_err(|e| {
                KpError::ConfigurationError(format!(
                    "failed to read registry CA certificate {}: {}",
                    path.display(),
                    e
                ))
            })?),
            None => None,
        };
        Ok(Self {
            ca_cert_pem,
            verify_certs: options.verify_certs,
            insecure_registries: options.insecure_registries.clone(),
        })
    }

    fn client_config(&self) -> ClientConfig {
        let protocol = if self.insecure_registries.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(self.insecure_registries.clone())
        };
        let extra_root_certificates = self
            .ca_cert_pem
            .iter()
            .map(|pem| Certificate {
                encoding: CertificateEncoding::Pem,
                data: pem.clone(),
            })
            .collect();

        ClientConfig {
            protocol,
            accept_invalid_certificates: !self.verify_certs,
            extra_root_certificates,
            ..Default::default()
        }
    }
}

/// Pulls and pushes whole artifacts.
pub struct RegistryClient {
    client: Client,
}

impl RegistryClient {
    pub fn new(options: &ClientOptions) -> Self {
        Self {
            client: Client::new(options.client_config()),
        }
    }

    /// Pull manifest, config, and every layer of `reference`.
    ///
    /// The manifest is kept exactly as served so the artifact digest is the
    /// registry's. Indexes resolve to the linux entry for the host architecture.
    pub async fn pull(&self, reference: &ImageReference, auth: &RegistryAuth) -> Result<Artifact> {
        let mut oci_ref = to_oci_reference(reference)?;
        let oci_auth = auth.to_oci_auth();

        tracing::debug!(reference = %reference, "Pulling image manifest");
        let (mut manifest_bytes, mut registry_digest) = self
            .client
            .pull_manifest_raw(&oci_ref, &oci_auth, MANIFEST_MEDIA_TYPES)
            .await
            .map_err(|e| map_registry_error(reference, "pull manifest", e))?;
        let mut expected = reference.digest.as_deref().map(Digest::parse).transpose()?;

        if is_image_index(&manifest_bytes) {
            if let Some(expected) = &expected {
                verify_manifest_digest(reference, expected, &manifest_bytes)?;
            }
            let index: OciImageIndex = serde_json::from_slice(&manifest_bytes)
                .map_err(|e| KpError::FormatError(format!("invalid image index: {}", e)))?;
            let selected = linux_platform_resolver(&index.manifests).ok_or_else(|| {
                KpError::FormatError(format!("image index '{}' has no manifests", reference))
            })?;
            tracing::debug!(reference = %reference, digest = %selected, "Resolved image index entry");

            oci_ref = Reference::with_digest(
                oci_ref.registry().to_string(),
                oci_ref.repository().to_string(),
                selected.clone(),
            );
            (manifest_bytes, registry_digest) = self
                .client
                .pull_manifest_raw(&oci_ref, &oci_auth, MANIFEST_MEDIA_TYPES)
                .await
                .map_err(|e| map_registry_error(reference, "pull manifest", e))?;
            expected = Some(Digest::parse(&selected)?);
        }

        let manifest: OciImageManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| KpError::FormatError(format!("invalid image manifest: {}", e)))?;

        let mut config_data: Vec<u8> = Vec::new();
        self.client
            .pull_blob(&oci_ref, &manifest.config, &mut config_data)
            .await
            .map_err(|e| map_registry_error(reference, "pull config blob", e))?;
        let config = Config::new(config_data, manifest.config.media_type.clone(), None);

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for layer in &manifest.layers {
            tracing::debug!(digest = %layer.digest, size = layer.size, "Pulling layer");
            let mut layer_data: Vec<u8> = Vec::new();
            self.client
                .pull_blob(&oci_ref, layer, &mut layer_data)
                .await
                .map_err(|e| map_registry_error(reference, "pull layer", e))?;
            layers.push(ImageLayer::new(layer_data, layer.media_type.clone(), None));
        }

        let artifact = match &expected {
            Some(expected) => Artifact::verified(expected, manifest_bytes, config, layers)?,
            None => Artifact::from_manifest_bytes(manifest_bytes, config, layers)?,
        };
        tracing::debug!(
            reference = %reference,
            registry_digest = %registry_digest,
            digest = %artifact.digest(),
            "Image pulled"
        );
        Ok(artifact)
    }

    /// Push every blob of `artifact`, then its manifest bytes unchanged, to `reference` (a tag).
    pub async fn push(
        &self,
        reference: &ImageReference,
        artifact: &Artifact,
        auth: &RegistryAuth,
    ) -> Result<String> {
        let oci_ref = to_oci_reference(reference)?;
        let payload = PushPayload::of(artifact);

        self.client
            .auth(&oci_ref, &auth.to_oci_auth(), RegistryOperation::Push)
            .await
            .map_err(|e| map_registry_error(reference, "authenticate", e))?;

        for (digest, data) in &payload.blobs {
            tracing::debug!(digest = %digest, size = data.len(), "Pushing blob");
            self.client
                .push_blob(&oci_ref, data, digest)
                .await
                .map_err(|e| map_registry_error(reference, "push blob", e))?;
        }

        let content_type = match payload.media_type.parse() {
            Ok(value) => value,
            Err(_) => {
                return Err(KpError::FormatError(format!(
                    "invalid manifest media type '{}'",
                    payload.media_type
                )))
            }
        };
        let manifest_url = self
            .client
            .push_manifest_raw(&oci_ref, payload.manifest.to_vec(), content_type)
            .await
            .map_err(|e| map_registry_error(reference, "push manifest", e))?;

        tracing::debug!(
            reference = %reference,
            manifest_url = %manifest_url,
            digest = %artifact.digest(),
            "Image pushed"
        );
        Ok(manifest_url)
    }
}

/// What a push sends: blobs by digest, then the manifest bytes.
struct PushPayload<'a> {
    blobs: Vec<(&'a str, &'a [u8])>,
    manifest: &'a [u8],
    media_type: &'a str,
}

impl<'a> PushPayload<'a> {
    fn of(artifact: &'a Artifact) -> Self {
        let manifest = artifact.manifest();
        let mut blobs = vec![(manifest.config.digest.as_str(), artifact.config().data.as_slice())];
        blobs.extend(
            manifest
                .layers
                .iter()
                .zip(artifact.layers())
                .map(|(descriptor, layer)| (descriptor.digest.as_str(), layer.data.as_slice())),
        );
        Self {
            blobs,
            manifest: artifact.manifest_bytes(),
            media_type: artifact.manifest_media_type(),
        }
    }
}

fn is_image_index(manifest_bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(manifest_bytes)
        .map(|value| value.get("manifests").is_some())
        .unwrap_or(false)
}

fn verify_manifest_digest(reference: &ImageReference, expected: &Digest, bytes: &[u8]) -> Result<()> {
    let actual = Digest::of(bytes);
    if &actual != expected {
        return Err(KpError::FormatError(format!(
            "manifest of '{}' has digest {}, expected {}",
            reference, actual, expected
        )));
    }
    Ok(())
}

/// Convert an ImageReference to an oci-distribution Reference.
fn to_oci_reference(reference: &ImageReference) -> Result<Reference> {
    let ref_str = if let Some(ref digest) = reference.digest {
        format!("{}@{}", reference.repository_path(), digest)
    } else {
        let tag = reference.tag.as_deref().unwrap_or("latest");
        format!("{}:{}", reference.repository_path(), tag)
    };

    ref_str.parse::<Reference>().map_err(|e| {
        KpError::FormatError(format!("Invalid OCI reference '{}': {}", ref_str, e))
    })
}

/// Map a client failure onto an error kind, naming the registry host.
fn map_registry_error(
    reference: &ImageReference,
    action: &str,
    err: OciDistributionError,
) -> KpError {
    let registry = reference.registry.clone();
    match &err {
        OciDistributionError::AuthenticationFailure(_)
        | OciDistributionError::UnauthorizedError { .. } => {
            KpError::AuthenticationFailure { registry }
        }
        OciDistributionError::ServerError { code: 401 | 403, .. } => {
            KpError::AuthenticationFailure { registry }
        }
        OciDistributionError::ImageManifestNotFoundError(_)
        | OciDistributionError::ServerError { code: 404, .. } => {
            KpError::NotFoundError(format!("image '{}' not found", reference))
        }
        OciDistributionError::RegistryError { envelope, .. } => {
            let codes: Vec<&OciErrorCode> = envelope.errors.iter().map(|e| &e.code).collect();
            if codes
                .iter()
                .any(|c| matches!(c, OciErrorCode::Unauthorized | OciErrorCode::Denied))
            {
                KpError::AuthenticationFailure { registry }
            } else if codes.iter().any(|c| {
                matches!(c, OciErrorCode::ManifestUnknown | OciErrorCode::NameUnknown)
            }) {
                KpError::NotFoundError(format!("image '{}' not found", reference))
            } else {
                KpError::RegistryError {
                    registry,
                    message: format!("Failed to {}: {}", action, err),
                }
            }
        }
        _ => KpError::RegistryError {
            registry,
            message: format!("Failed to {}: {}", action, err),
        },
    }
}

/// Platform resolver that selects linux images matching the host architecture.
fn linux_platform_resolver(manifests: &[ImageIndexEntry]) -> Option<String> {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };

    manifests
        .iter()
        .find(|entry| {
            entry
                .platform
                .as_ref()
                .is_some_and(|p| p.os == "linux" && p.architecture == arch)
        })
        .or_else(|| manifests.first())
        .map(|entry| entry.digest.clone())
}
