//! Source upload: package a directory or zip and push it under a time tag.

use std::path::PathBuf;

use kp_core::error::{KpError, Result};

use crate::engine::SyncEngine;
use crate::gate::RelocationDecision;
use crate::keychain::Keychain;
use crate::naming;
use crate::package;

/// Package `path` and push it to `<repository>:<unix-nanos>`.
///
/// Returns `<repository>@<digest>`; the tag only makes the push visible in
/// registries that list by tag.
pub async fn upload_source(
    engine: &SyncEngine,
    keychain: &dyn Keychain,
    repository: &str,
    path: PathBuf,
) -> Result<String> {
    naming::require_repository(repository)?;
    let artifact = tokio::task::spawn_blocking(move || {
        package::package(&path).map_err(|e| e.with_context(&path.display().to_string()))
    })
    .await
    .map_err(|e| KpError::Other(format!("source packaging task failed: {}", e)))??;

    let tag = unique_tag();
    tracing::debug!(repository, tag = %tag, digest = %artifact.digest(), "Uploading source");

    let decision = RelocationDecision::Relocate {
        digest: artifact.digest().clone(),
    };
    let outcome = engine
        .controller()
        .apply_tagged(keychain, &artifact, repository, None, &tag, decision)
        .await?;
    Ok(outcome.reference)
}

fn unique_tag() -> String {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros() * 1000)
        .to_string()
}
