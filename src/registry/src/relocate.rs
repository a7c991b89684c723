//! ImageRelocator - copy an artifact into a destination repository.

use std::sync::Arc;

use async_trait::async_trait;
use kp_core::error::Result;

use crate::artifact::Artifact;
use crate::client::{ClientOptions, RegistryClient};
use crate::keychain::Keychain;
use crate::naming::CanonicalReference;
use crate::reference::ImageReference;

/// Tag used for the write; the returned reference is addressed by digest.
pub const RELOCATION_TAG: &str = "latest";

/// Trait for relocation targets.
#[async_trait]
pub trait ImageRelocator: Send + Sync {
    /// Copy `artifact` to `<repository>[/<path_segment>]:<tag>`.
    ///
    /// Returns the digest-addressed reference of the written artifact.
    async fn relocate_tagged(
        &self,
        keychain: &dyn Keychain,
        artifact: &Artifact,
        repository: &str,
        path_segment: Option<&str>,
        tag: &str,
    ) -> Result<CanonicalReference>;

    /// Copy `artifact` using the transient [`RELOCATION_TAG`].
    async fn relocate(
        &self,
        keychain: &dyn Keychain,
        artifact: &Artifact,
        repository: &str,
        path_segment: Option<&str>,
    ) -> Result<CanonicalReference> {
        self.relocate_tagged(keychain, artifact, repository, path_segment, RELOCATION_TAG)
            .await
    }
}

/// Relocator that pushes to a registry.
pub struct RegistryRelocator {
    client: Arc<RegistryClient>,
}

impl RegistryRelocator {
    pub fn new(options: &ClientOptions) -> Self {
        Self {
            client: Arc::new(RegistryClient::new(options)),
        }
    }

    pub fn with_client(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageRelocator for RegistryRelocator {
    async fn relocate_tagged(
        &self,
        keychain: &dyn Keychain,
        artifact: &Artifact,
        repository: &str,
        path_segment: Option<&str>,
        tag: &str,
    ) -> Result<CanonicalReference> {
        let canonical = CanonicalReference::new(repository, path_segment, artifact.digest().clone());
        let destination = ImageReference::parse(&canonical.destination())?.with_tag(tag);
        let auth = keychain.resolve(&destination.registry);

        tracing::info!(
            destination = %destination,
            digest = %artifact.digest(),
            size = artifact.size(),
            "Relocating artifact"
        );
        self.client.push(&destination, artifact, &auth).await?;
        Ok(canonical)
    }
}
