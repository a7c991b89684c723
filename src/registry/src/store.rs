//! Store sources: add and remove buildpackages.

use futures::future::try_join_all;
use kp_core::error::{KpError, Result};
use kp_core::resource::{StoreImage, StoreSources};

use crate::buildpackage::BuildpackageUploader;
use crate::engine::SyncEngine;
use crate::gate::{self, RelocationDecision};
use crate::keychain::Keychain;
use crate::naming::{self, CanonicalReference};
use crate::printer::Printer;

/// Updated store and whether it differs from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUpdate {
    pub store: StoreSources,
    pub changed: bool,
}

/// Relocate each buildpackage in `sources` and append the new entries to `store`.
///
/// Buildpackages already present with the same canonical reference are
/// skipped. All sources are fetched before anything is relocated, so one bad
/// source leaves the store untouched.
pub async fn add_buildpackages(
    engine: &SyncEngine,
    keychain: &dyn Keychain,
    store: &StoreSources,
    repository: &str,
    sources: &[String],
) -> Result<StoreUpdate> {
    naming::require_repository(repository)?;
    let uploader = BuildpackageUploader::new(engine);
    let prepared = try_join_all(
        sources
            .iter()
            .map(|source| uploader.prepare(keychain, source, repository)),
    )
    .await?;

    let mut updated = store.clone();
    let mut changed = false;
    for buildpackage in prepared {
        let candidate = &buildpackage.reference;
        let existing = updated
            .sources
            .iter()
            .map(|entry| entry.image.as_str())
            .find(|image| same_reference(image, candidate));

        let decision =
            gate::decide(engine.fetcher(), keychain, candidate.digest(), existing).await?;
        if let RelocationDecision::Unchanged { existing, .. } = decision {
            engine
                .printer()
                .line(format!("\tBuildpackage '{}' already exists in the store", existing));
            continue;
        }

        let reference = uploader.relocate(keychain, &buildpackage, repository).await?;
        let (id, version) = match buildpackage.identity {
            Some(identity) => (Some(identity.id), Some(identity.version).filter(|v| !v.is_empty())),
            None => (None, None),
        };
        changed |= updated.add(StoreImage {
            image: reference,
            id,
            version,
        });
    }

    Ok(StoreUpdate {
        store: updated,
        changed,
    })
}

fn same_reference(image: &str, candidate: &CanonicalReference) -> bool {
    CanonicalReference::parse(image)
        .map(|existing| existing.destination() == candidate.destination())
        .unwrap_or(false)
        && image.ends_with(candidate.digest().as_str())
}

/// Remove every entry matching each of `identities` (`id` or `id@version`).
///
/// Every identity must match at least one entry; otherwise nothing is removed.
pub fn remove_buildpackages(
    store: &StoreSources,
    identities: &[String],
    printer: &Printer,
) -> Result<StoreUpdate> {
    for identity in identities {
        if !store.sources.iter().any(|entry| entry.matches(identity)) {
            return Err(KpError::NotFoundError(format!(
                "Buildpackage '{}' does not exist in the store",
                identity
            )));
        }
    }

    let mut updated = store.clone();
    for identity in identities {
        printer.line(format!("\tRemoving buildpackage {}", identity));
        updated.remove_matching(identity);
    }

    Ok(StoreUpdate {
        changed: updated != *store,
        store: updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::testing::artifact;
    use crate::artifact::Artifact;
    use crate::fakes::{FakeFetcher, FakeRelocator};
    use crate::keychain::AnonymousKeychain;
    use crate::metadata::BUILDPACKAGE_METADATA_LABEL;
    use kp_core::mode::ExecutionMode;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const REPO: &str = "kpackcr.org/somepath";

    fn buildpackage(seed: &str, id: &str, version: &str) -> Artifact {
        artifact(
            seed,
            &[(
                BUILDPACKAGE_METADATA_LABEL,
                &format!(r#"{{"id": "{}", "version": "{}"}}"#, id, version),
            )],
            1,
        )
    }

    fn setup(
        fetcher: FakeFetcher,
        mode: ExecutionMode,
    ) -> (SyncEngine, Arc<FakeRelocator>, Arc<Mutex<Vec<u8>>>) {
        let relocator = Arc::new(FakeRelocator::new());
        let (printer, buffer) = Printer::buffer();
        let engine = SyncEngine::new(Arc::new(fetcher), relocator.clone(), mode, printer);
        (engine, relocator, buffer)
    }

    #[tokio::test]
    async fn test_add_requires_repository() {
        let go = buildpackage("go", "paketo/go", "1.0.0");
        let fetcher = FakeFetcher::new().with("registry.io/go:1", go);
        let (engine, relocator, _) = setup(fetcher, ExecutionMode::DryRunWithUpload);

        let err = add_buildpackages(
            &engine,
            &AnonymousKeychain,
            &StoreSources::default(),
            " ",
            &["registry.io/go:1".to_string()],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, kp_core::error::KpError::ConfigurationError(_)));
        assert_eq!(relocator.relocate_count(), 0);
    }

    #[tokio::test]
    async fn test_add_new_buildpackages() {
        let go = buildpackage("go", "paketo/go", "1.0.0");
        let node = buildpackage("node", "paketo/node", "2.0.0");
        let fetcher = FakeFetcher::new()
            .with("registry.io/go:1", go.clone())
            .with("registry.io/node:2", node.clone());
        let (engine, relocator, _) = setup(fetcher, ExecutionMode::Live);

        let update = add_buildpackages(
            &engine,
            &AnonymousKeychain,
            &StoreSources::default(),
            REPO,
            &["registry.io/go:1".to_string(), "registry.io/node:2".to_string()],
        )
        .await
        .unwrap();

        assert!(update.changed);
        assert_eq!(relocator.relocate_count(), 2);
        assert_eq!(update.store.sources.len(), 2);
        assert_eq!(
            update.store.sources[0].image,
            format!("{}/paketo_go@{}", REPO, go.digest())
        );
        assert_eq!(update.store.sources[0].id.as_deref(), Some("paketo/go"));
        assert_eq!(update.store.sources[1].version.as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn test_add_existing_is_skipped() {
        let go = buildpackage("go", "paketo/go", "1.0.0");
        let fetcher = FakeFetcher::new().with("registry.io/go:1", go.clone());
        let (engine, relocator, buffer) = setup(fetcher, ExecutionMode::Live);

        let existing_ref = format!("{}/paketo_go@{}", REPO, go.digest());
        let store = StoreSources {
            sources: vec![StoreImage {
                image: existing_ref.clone(),
                id: Some("paketo/go".to_string()),
                version: Some("1.0.0".to_string()),
            }],
        };

        let update = add_buildpackages(
            &engine,
            &AnonymousKeychain,
            &store,
            REPO,
            &["registry.io/go:1".to_string()],
        )
        .await
        .unwrap();

        assert!(!update.changed);
        assert_eq!(update.store, store);
        assert_eq!(relocator.relocate_count(), 0);
        let output = String::from_utf8(buffer.lock().clone()).unwrap();
        assert_eq!(
            output,
            format!("\tBuildpackage '{}' already exists in the store\n", existing_ref)
        );
    }

    #[tokio::test]
    async fn test_add_fails_before_relocating_anything() {
        let go = buildpackage("go", "paketo/go", "1.0.0");
        let fetcher = FakeFetcher::new().with("registry.io/go:1", go);
        let (engine, relocator, _) = setup(fetcher, ExecutionMode::Live);

        let err = add_buildpackages(
            &engine,
            &AnonymousKeychain,
            &StoreSources::default(),
            REPO,
            &["registry.io/go:1".to_string(), "registry.io/missing:1".to_string()],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KpError::NotFoundError(_)));
        assert_eq!(relocator.relocate_count(), 0);
    }

    #[test]
    fn test_remove_preserves_order() {
        let entry = |image: &str, id: &str, version: &str| StoreImage {
            image: image.to_string(),
            id: Some(id.to_string()),
            version: Some(version.to_string()),
        };
        let store = StoreSources {
            sources: vec![
                entry("r.io/a@sha256:1", "a", "1"),
                entry("r.io/b@sha256:2", "b", "1"),
                entry("r.io/c@sha256:3", "c", "1"),
            ],
        };
        let (printer, buffer) = Printer::buffer();

        let update = remove_buildpackages(&store, &["b@1".to_string()], &printer).unwrap();
        assert!(update.changed);
        let ids: Vec<_> = update
            .store
            .sources
            .iter()
            .map(|s| s.id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(
            String::from_utf8(buffer.lock().clone()).unwrap(),
            "\tRemoving buildpackage b@1\n"
        );
    }

    #[test]
    fn test_remove_unknown_is_not_found() {
        let store = StoreSources {
            sources: vec![StoreImage {
                image: "r.io/a@sha256:1".to_string(),
                id: Some("a".to_string()),
                version: None,
            }],
        };
        let (printer, _) = Printer::buffer();

        let err =
            remove_buildpackages(&store, &["a".to_string(), "missing".to_string()], &printer)
                .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Not found: Buildpackage 'missing' does not exist in the store"
        );
    }
}
