//! Dry-run controller.
//!
//! Executes (or simulates) relocation decisions according to the invocation's
//! [`ExecutionMode`]. It never changes a decision, only whether a `Relocate`
//! decision reaches the registry.

use kp_core::error::Result;
use kp_core::mode::ExecutionMode;

use crate::artifact::Artifact;
use crate::gate::RelocationDecision;
use crate::keychain::Keychain;
use crate::naming::{self, CanonicalReference};
use crate::printer::Printer;
use crate::relocate::{ImageRelocator, RELOCATION_TAG};

/// Reference produced for one artifact, and whether it differs from the existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub reference: String,
    pub changed: bool,
}

/// Gates relocations on the execution mode and reports them.
pub struct DryRunController<'a> {
    mode: ExecutionMode,
    relocator: &'a dyn ImageRelocator,
    printer: &'a Printer,
}

impl<'a> DryRunController<'a> {
    pub fn new(mode: ExecutionMode, relocator: &'a dyn ImageRelocator, printer: &'a Printer) -> Self {
        Self {
            mode,
            relocator,
            printer,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Carry out `decision` for `artifact` bound for `<repository>[/<path_segment>]`.
    pub async fn apply(
        &self,
        keychain: &dyn Keychain,
        artifact: &Artifact,
        repository: &str,
        path_segment: Option<&str>,
        decision: RelocationDecision,
    ) -> Result<SyncOutcome> {
        self.apply_tagged(keychain, artifact, repository, path_segment, RELOCATION_TAG, decision)
            .await
    }

    /// Like [`apply`](Self::apply), writing under `tag` instead of the transient tag.
    pub async fn apply_tagged(
        &self,
        keychain: &dyn Keychain,
        artifact: &Artifact,
        repository: &str,
        path_segment: Option<&str>,
        tag: &str,
        decision: RelocationDecision,
    ) -> Result<SyncOutcome> {
        naming::require_repository(repository)?;
        let digest = match decision {
            RelocationDecision::Unchanged { existing, .. } => {
                return Ok(SyncOutcome {
                    reference: existing,
                    changed: false,
                });
            }
            RelocationDecision::Relocate { digest } => digest,
        };

        let target = CanonicalReference::new(repository, path_segment, digest);
        self.printer.line(format!("\t{} '{}'", self.mode.verb(), target));

        let reference = if self.mode.uploads() {
            self.relocator
                .relocate_tagged(keychain, artifact, repository, path_segment, tag)
                .await?
        } else {
            tracing::debug!(destination = %target, "Dry run: relocation skipped");
            target
        };

        Ok(SyncOutcome {
            reference: reference.to_string(),
            changed: true,
        })
    }
}
