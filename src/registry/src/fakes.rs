//! In-memory fetcher and relocator for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kp_core::error::{KpError, Result};
use parking_lot::Mutex;

use crate::artifact::Artifact;
use crate::fetch::ImageFetcher;
use crate::keychain::Keychain;
use crate::layout::testing::write_oci_layout;
use crate::naming::CanonicalReference;
use crate::reference::{ImageReference, Location};
use crate::relocate::ImageRelocator;

/// Serves artifacts registered by location string.
#[derive(Default)]
pub struct FakeFetcher {
    artifacts: HashMap<String, Artifact>,
    auth_failures: HashSet<String>,
    fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `artifact` for `location`.
    pub fn with(mut self, location: &str, artifact: Artifact) -> Self {
        self.artifacts.insert(key(location), artifact);
        self
    }

    /// Reject credentials when `location` is fetched.
    pub fn with_auth_failure(mut self, location: &str) -> Self {
        self.auth_failures.insert(key(location));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn key(location: &str) -> String {
    Location::parse(location)
        .map(|l| l.to_string())
        .unwrap_or_else(|_| location.to_string())
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, _keychain: &dyn Keychain, location: &Location) -> Result<Artifact> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let key = location.to_string();
        if self.auth_failures.contains(&key) {
            let registry = match location {
                Location::RegistryRef(reference) => reference.registry.clone(),
                Location::LocalFile { .. } => "localhost".to_string(),
            };
            return Err(KpError::AuthenticationFailure { registry });
        }
        self.artifacts
            .get(&key)
            .cloned()
            .ok_or_else(|| KpError::NotFoundError(format!("image '{}' not found", key)))
    }
}

/// One recorded relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocateCall {
    pub destination: String,
    pub tag: String,
    pub digest: String,
}

/// Records relocations instead of pushing.
#[derive(Default)]
pub struct FakeRelocator {
    calls: Mutex<Vec<RelocateCall>>,
    auth_failures: HashSet<String>,
}

impl FakeRelocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject credentials for pushes under `destination`.
    pub fn with_auth_failure(mut self, destination: &str) -> Self {
        self.auth_failures.insert(destination.to_string());
        self
    }

    pub fn relocate_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<RelocateCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ImageRelocator for FakeRelocator {
    async fn relocate_tagged(
        &self,
        _keychain: &dyn Keychain,
        artifact: &Artifact,
        repository: &str,
        path_segment: Option<&str>,
        tag: &str,
    ) -> Result<CanonicalReference> {
        let reference = CanonicalReference::new(repository, path_segment, artifact.digest().clone());
        let destination = reference.destination();
        if self.auth_failures.contains(&destination) {
            let registry = ImageReference::parse(&destination)?.registry;
            return Err(KpError::AuthenticationFailure { registry });
        }
        self.calls.lock().push(RelocateCall {
            destination,
            tag: tag.to_string(),
            digest: artifact.digest().to_string(),
        });
        Ok(reference)
    }
}

/// Write `artifact` as an OCI layout tar (a `.cnb`-style bundle) at `path`.
pub fn write_bundle(artifact: &Artifact, path: &Path) -> PathBuf {
    let layout = tempfile::tempdir().unwrap();
    write_oci_layout(artifact, layout.path());
    let file = std::fs::File::create(path).unwrap();
    crate::archive::tar_directory(layout.path(), file).unwrap();
    path.to_path_buf()
}
