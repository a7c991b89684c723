//! Lifecycle image relocation.

use kp_core::error::Result;

use crate::dryrun::SyncOutcome;
use crate::engine::SyncEngine;
use crate::keychain::Keychain;
use crate::naming;

/// Path segment of the relocated lifecycle image.
pub const LIFECYCLE_IMAGE_NAME: &str = "lifecycle";

/// Relocate the lifecycle `image` to `<repository>/lifecycle`, gated against `existing`.
pub async fn update_lifecycle(
    engine: &SyncEngine,
    keychain: &dyn Keychain,
    image: &str,
    repository: &str,
    existing: Option<&str>,
) -> Result<SyncOutcome> {
    naming::require_repository(repository)?;
    let (_, artifact) = engine.fetch(keychain, image).await?;
    let outcome = engine
        .sync(
            keychain,
            &artifact,
            repository,
            Some(LIFECYCLE_IMAGE_NAME),
            existing,
        )
        .await?;
    if !outcome.changed {
        engine
            .printer()
            .line(format!("\tLifecycle image '{}' already exists", outcome.reference));
    }
    Ok(outcome)
}
