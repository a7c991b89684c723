//! SyncEngine - fetch, decide, and relocate one artifact at a time.
//!
//! Holds the capabilities a single invocation runs with: the fetcher, the
//! relocator, the execution mode, and where status lines go. The per-resource
//! flows (buildpackages, stores, stacks, lifecycle, source) are built on it.

use std::sync::Arc;

use kp_core::error::Result;
use kp_core::mode::ExecutionMode;

use crate::artifact::Artifact;
use crate::client::{ClientOptions, RegistryClient};
use crate::dryrun::{DryRunController, SyncOutcome};
use crate::fetch::{DefaultFetcher, ImageFetcher};
use crate::gate;
use crate::keychain::Keychain;
use crate::printer::Printer;
use crate::reference::Location;
use crate::relocate::{ImageRelocator, RegistryRelocator};

/// Capabilities for one invocation.
pub struct SyncEngine {
    fetcher: Arc<dyn ImageFetcher>,
    relocator: Arc<dyn ImageRelocator>,
    mode: ExecutionMode,
    printer: Printer,
}

impl SyncEngine {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        relocator: Arc<dyn ImageRelocator>,
        mode: ExecutionMode,
        printer: Printer,
    ) -> Self {
        Self {
            fetcher,
            relocator,
            mode,
            printer,
        }
    }

    /// Engine backed by a real registry client shared by fetcher and relocator.
    pub fn with_registry(options: &ClientOptions, mode: ExecutionMode, printer: Printer) -> Self {
        let client = Arc::new(RegistryClient::new(options));
        Self::new(
            Arc::new(DefaultFetcher::with_client(client.clone())),
            Arc::new(RegistryRelocator::with_client(client)),
            mode,
            printer,
        )
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn printer(&self) -> &Printer {
        &self.printer
    }

    pub fn fetcher(&self) -> &dyn ImageFetcher {
        self.fetcher.as_ref()
    }

    pub(crate) fn controller(&self) -> DryRunController<'_> {
        DryRunController::new(self.mode, self.relocator.as_ref(), &self.printer)
    }

    /// Parse `source` and fetch the artifact it names.
    pub async fn fetch(&self, keychain: &dyn Keychain, source: &str) -> Result<(Location, Artifact)> {
        let location = Location::parse(source)?;
        tracing::debug!(location = %location, "Fetching artifact");
        let artifact = self
            .fetcher
            .fetch(keychain, &location)
            .await
            .map_err(|e| e.with_context(&location.to_string()))?;
        tracing::debug!(location = %location, digest = %artifact.digest(), "Fetched artifact");
        Ok((location, artifact))
    }

    /// Gate `artifact` against `existing`, then relocate it if needed.
    pub async fn sync(
        &self,
        keychain: &dyn Keychain,
        artifact: &Artifact,
        repository: &str,
        path_segment: Option<&str>,
        existing: Option<&str>,
    ) -> Result<SyncOutcome> {
        let decision = gate::decide(self.fetcher(), keychain, artifact.digest(), existing).await?;
        self.controller()
            .apply(keychain, artifact, repository, path_segment, decision)
            .await
    }
}
