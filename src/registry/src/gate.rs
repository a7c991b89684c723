//! Idempotence gate - decide whether an artifact needs relocating.
//!
//! The existing reference is returned untouched when its digest equals the
//! candidate's, so repeated invocations converge on stable references.

use kp_core::error::{KpError, Result};

use crate::artifact::Digest;
use crate::fetch::ImageFetcher;
use crate::keychain::Keychain;
use crate::reference::Location;

/// Outcome of comparing a candidate digest against the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationDecision {
    /// The destination already holds identical content at `existing`.
    Unchanged { digest: Digest, existing: String },
    /// The candidate must be relocated.
    Relocate { digest: Digest },
}

impl RelocationDecision {
    /// The candidate digest that was compared.
    pub fn digest(&self) -> &Digest {
        match self {
            RelocationDecision::Unchanged { digest, .. } => digest,
            RelocationDecision::Relocate { digest } => digest,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, RelocationDecision::Unchanged { .. })
    }
}

/// Compare `candidate` against the digest of `existing`.
///
/// A digest embedded in the existing reference is reused; otherwise the
/// existing reference is fetched to learn its digest. An existing reference
/// that no longer resolves is treated as absent.
pub async fn decide(
    fetcher: &dyn ImageFetcher,
    keychain: &dyn Keychain,
    candidate: &Digest,
    existing: Option<&str>,
) -> Result<RelocationDecision> {
    let Some(existing) = existing.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(relocate(candidate));
    };

    let existing_digest = match embedded_digest(existing) {
        Some(digest) => digest,
        None => {
            let location = Location::parse(existing)?;
            match fetcher.fetch(keychain, &location).await {
                Ok(artifact) => artifact.digest().clone(),
                Err(KpError::NotFoundError(_)) => {
                    tracing::debug!(existing, "Existing reference not found");
                    return Ok(relocate(candidate));
                }
                Err(e) => return Err(e),
            }
        }
    };

    Ok(compare(candidate, existing, &existing_digest))
}

/// Pure comparison once both digests are known.
pub fn compare(candidate: &Digest, existing: &str, existing_digest: &Digest) -> RelocationDecision {
    if candidate == existing_digest {
        tracing::debug!(digest = %candidate, existing, "Digest unchanged");
        RelocationDecision::Unchanged {
            digest: candidate.clone(),
            existing: existing.to_string(),
        }
    } else {
        tracing::debug!(candidate = %candidate, existing_digest = %existing_digest, "Digest changed");
        relocate(candidate)
    }
}

fn relocate(candidate: &Digest) -> RelocationDecision {
    RelocationDecision::Relocate {
        digest: candidate.clone(),
    }
}

fn embedded_digest(reference: &str) -> Option<Digest> {
    reference
        .rsplit_once('@')
        .and_then(|(_, digest)| Digest::parse(digest).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::testing::artifact;
    use crate::fakes::FakeFetcher;
    use crate::keychain::AnonymousKeychain;

    #[tokio::test]
    async fn test_no_existing_always_relocates() {
        let fetcher = FakeFetcher::new();
        let candidate = Digest::of(b"a");
        let decision = decide(&fetcher, &AnonymousKeychain, &candidate, None)
            .await
            .unwrap();
        assert_eq!(decision, RelocationDecision::Relocate { digest: candidate.clone() });

        let decision = decide(&fetcher, &AnonymousKeychain, &candidate, Some("  "))
            .await
            .unwrap();
        assert!(!decision.is_unchanged());
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_embedded_digest_is_reused() {
        let fetcher = FakeFetcher::new();
        let candidate = Digest::of(b"a");
        let existing = format!("kpackcr.org/somepath/build@{}", candidate);

        let decision = decide(&fetcher, &AnonymousKeychain, &candidate, Some(&existing))
            .await
            .unwrap();
        assert_eq!(
            decision,
            RelocationDecision::Unchanged {
                digest: candidate.clone(),
                existing: existing.clone(),
            }
        );
        assert_eq!(fetcher.fetch_count(), 0);

        let other = Digest::of(b"b");
        let decision = decide(&fetcher, &AnonymousKeychain, &other, Some(&existing))
            .await
            .unwrap();
        assert_eq!(decision, RelocationDecision::Relocate { digest: other });
    }

    #[tokio::test]
    async fn test_tag_reference_is_fetched() {
        let stored = artifact("stored", &[], 1);
        let fetcher = FakeFetcher::new().with("kpackcr.org/somepath/run:latest", stored.clone());

        let decision = decide(
            &fetcher,
            &AnonymousKeychain,
            stored.digest(),
            Some("kpackcr.org/somepath/run:latest"),
        )
        .await
        .unwrap();
        assert!(decision.is_unchanged());
        assert_eq!(decision.digest(), stored.digest());
        assert_eq!(fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_existing_relocates() {
        let fetcher = FakeFetcher::new();
        let candidate = Digest::of(b"a");
        let decision = decide(
            &fetcher,
            &AnonymousKeychain,
            &candidate,
            Some("kpackcr.org/somepath/gone:latest"),
        )
        .await
        .unwrap();
        assert!(!decision.is_unchanged());
    }
}
