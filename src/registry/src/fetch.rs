//! ImageFetcher - retrieve an immutable artifact from a location.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use kp_core::error::{KpError, Result};

use crate::artifact::Artifact;
use crate::client::{ClientOptions, RegistryClient};
use crate::keychain::Keychain;
use crate::layout::{self, LayoutKind};
use crate::reference::{LocalKind, Location};

/// Trait for artifact sources.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the artifact at `location`, resolving credentials through `keychain`.
    async fn fetch(&self, keychain: &dyn Keychain, location: &Location) -> Result<Artifact>;
}

/// Fetches packaged archives from disk and images from registries.
pub struct DefaultFetcher {
    client: Arc<RegistryClient>,
}

impl DefaultFetcher {
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
impl ImageFetcher for DefaultFetcher {
    async fn fetch(&self, keychain: &dyn Keychain, location: &Location) -> Result<Artifact> {
        match location {
            Location::RegistryRef(reference) => {
                let auth = keychain.resolve(&reference.registry);
                self.client.pull(reference, &auth).await
            }
            Location::LocalFile { path, kind } => {
                let path = path.clone();
                let kind = *kind;
                tokio::task::spawn_blocking(move || load_local(&path, kind))
                    .await
                    .map_err(|e| KpError::Other(format!("archive loading task failed: {}", e)))?
            }
        }
    }
}

/// Load a packaged artifact from disk without touching the network.
pub fn load_local(path: &Path, kind: LocalKind) -> Result<Artifact> {
    tracing::debug!(path = %path.display(), ?kind, "Reading local artifact");
    let result = match kind {
        LocalKind::Archive => load_archive(path),
        LocalKind::Directory if LayoutKind::detect(path).is_some() => layout::load_artifact(path),
        LocalKind::Directory | LocalKind::Zip => Err(KpError::FormatError(
            "not a packaged image; directories and zip files are source, not images".to_string(),
        )),
    };
    result.map_err(|e| e.with_context(&path.display().to_string()))
}

/// Unpack a tar (optionally gzip) archive into a scratch directory and load its layout.
fn load_archive(path: &Path) -> Result<Artifact> {
    let scratch = tempfile::tempdir()?;
    crate::archive::unpack(path, scratch.path())?;
    layout::load_artifact(scratch.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::testing::artifact;
    use crate::fakes::write_bundle;
    use crate::keychain::AnonymousKeychain;
    use crate::layout::testing::write_oci_layout;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_local_bundle() {
        let dir = TempDir::new().unwrap();
        let original = artifact("bundle", &[("k", "v")], 2);
        let bundle = write_bundle(&original, &dir.path().join("sample-bp.cnb"));

        let fetcher = DefaultFetcher::new(&ClientOptions::default());
        let location = Location::parse(bundle.to_str().unwrap()).unwrap();
        let fetched = fetcher.fetch(&AnonymousKeychain, &location).await.unwrap();
        assert_eq!(fetched.digest(), original.digest());
    }

    #[tokio::test]
    async fn test_fetch_layout_directory() {
        let dir = TempDir::new().unwrap();
        let original = artifact("dir", &[], 1);
        write_oci_layout(&original, dir.path());

        let fetcher = DefaultFetcher::new(&ClientOptions::default());
        let location = Location::parse(dir.path().to_str().unwrap()).unwrap();
        let fetched = fetcher.fetch(&AnonymousKeychain, &location).await.unwrap();
        assert_eq!(fetched.digest(), original.digest());
    }

    #[test]
    fn test_plain_directory_is_format_error() {
        let dir = TempDir::new().unwrap();
        let err = load_local(dir.path(), LocalKind::Directory).unwrap_err();
        assert!(matches!(err, KpError::FormatError(_)));
        assert!(err.to_string().contains(&dir.path().display().to_string()));
    }

    #[test]
    fn test_garbage_archive_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.cnb");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();
        let err = load_local(&path, LocalKind::Archive).unwrap_err();
        assert!(matches!(err, KpError::FormatError(_)));
    }
}
