//! Buildpackage relocation.
//!
//! A buildpackage is fetched from a bundle on disk or a registry, named by
//! its identity label (or its source name when unlabeled), and relocated to
//! `<repository>/<segment>@<digest>`.

use kp_core::error::Result;

use crate::artifact::Artifact;
use crate::engine::SyncEngine;
use crate::gate::RelocationDecision;
use crate::keychain::Keychain;
use crate::metadata::{self, BuildpackageIdentity};
use crate::naming::{self, CanonicalReference};

/// A fetched buildpackage and the name it will be relocated under.
#[derive(Debug, Clone)]
pub struct PreparedBuildpackage {
    pub artifact: Artifact,
    pub identity: Option<BuildpackageIdentity>,
    pub path_segment: String,
    pub reference: CanonicalReference,
}

/// Relocates buildpackages through a [`SyncEngine`].
pub struct BuildpackageUploader<'a> {
    engine: &'a SyncEngine,
}

impl<'a> BuildpackageUploader<'a> {
    pub fn new(engine: &'a SyncEngine) -> Self {
        Self { engine }
    }

    /// Fetch `source` and derive its canonical reference under `repository`.
    pub async fn prepare(
        &self,
        keychain: &dyn Keychain,
        source: &str,
        repository: &str,
    ) -> Result<PreparedBuildpackage> {
        naming::require_repository(repository)?;
        let (location, artifact) = self.engine.fetch(keychain, source).await?;
        let identity = metadata::extract_identity(&artifact)
            .map_err(|e| e.with_context(&location.to_string()))?;
        let path_segment = naming::path_segment(identity.as_ref(), &location);
        let reference =
            CanonicalReference::new(repository, Some(&path_segment), artifact.digest().clone());
        Ok(PreparedBuildpackage {
            artifact,
            identity,
            path_segment,
            reference,
        })
    }

    /// Relocate a prepared buildpackage, returning the reference it now lives at.
    pub async fn relocate(
        &self,
        keychain: &dyn Keychain,
        prepared: &PreparedBuildpackage,
        repository: &str,
    ) -> Result<String> {
        naming::require_repository(repository)?;
        let decision = RelocationDecision::Relocate {
            digest: prepared.artifact.digest().clone(),
        };
        let outcome = self
            .engine
            .controller()
            .apply(
                keychain,
                &prepared.artifact,
                repository,
                Some(&prepared.path_segment),
                decision,
            )
            .await?;
        Ok(outcome.reference)
    }

    /// Fetch `source` and relocate it to `repository`.
    pub async fn upload_buildpackage(
        &self,
        keychain: &dyn Keychain,
        source: &str,
        repository: &str,
    ) -> Result<String> {
        let prepared = self.prepare(keychain, source, repository).await?;
        self.relocate(keychain, &prepared, repository).await
    }

    /// The reference [`upload_buildpackage`](Self::upload_buildpackage) would
    /// return, without relocating anything.
    pub async fn uploaded_buildpackage_ref(
        &self,
        keychain: &dyn Keychain,
        source: &str,
        repository: &str,
    ) -> Result<String> {
        let prepared = self.prepare(keychain, source, repository).await?;
        Ok(prepared.reference.to_string())
    }
}
