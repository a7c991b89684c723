//! Canonical destination names.

use std::fmt;

use kp_core::error::{KpError, Result};

use crate::artifact::Digest;
use crate::metadata::BuildpackageIdentity;
use crate::reference::{ImageReference, Location};

/// Derive the destination path segment for an artifact.
///
/// An identity wins: its id with every `/` folded to `_`. Otherwise the
/// location's base name is sanitized into a registry-safe token.
pub fn path_segment(identity: Option<&BuildpackageIdentity>, location: &Location) -> String {
    match identity {
        Some(identity) => identity.id.replace('/', "_"),
        None => sanitize(&location.base_name()),
    }
}

/// Lowercase `name` and replace anything outside `[a-z0-9._-]` with `_`.
pub fn sanitize(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "artifact".to_string()
    } else {
        sanitized
    }
}

/// Fail unless a destination repository was supplied.
pub fn require_repository(repository: &str) -> Result<()> {
    if repository.trim().is_empty() {
        return Err(KpError::ConfigurationError(
            "destination repository is required; pass --repository or set \
             `kp config default-repository`"
                .to_string(),
        ));
    }
    Ok(())
}

/// A digest-addressed reference into a destination repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalReference {
    repository: String,
    path_segment: Option<String>,
    digest: Digest,
}

impl CanonicalReference {
    pub fn new(repository: &str, path_segment: Option<&str>, digest: Digest) -> Self {
        Self {
            repository: repository.trim_end_matches('/').to_string(),
            path_segment: path_segment.map(str::to_string),
            digest,
        }
    }

    /// Parse `<repository>@sha256:<hex>`, as stored in resource documents.
    pub fn parse(reference: &str) -> Result<Self> {
        let (repository, digest) = reference.rsplit_once('@').ok_or_else(|| {
            KpError::FormatError(format!(
                "'{}' is not a digest reference (expected <repository>@sha256:<hex>)",
                reference
            ))
        })?;
        Ok(Self {
            repository: repository.to_string(),
            path_segment: None,
            digest: Digest::parse(digest)?,
        })
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// `<repository>[/<segment>]` without the digest.
    pub fn destination(&self) -> String {
        match &self.path_segment {
            Some(segment) => format!("{}/{}", self.repository, segment),
            None => self.repository.clone(),
        }
    }

    /// Parsed destination, for registry calls.
    pub fn image_reference(&self) -> Result<ImageReference> {
        let mut reference = ImageReference::parse(&self.destination())?;
        reference.tag = None;
        reference.digest = Some(self.digest.to_string());
        Ok(reference)
    }
}

impl fmt::Display for CanonicalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.destination(), self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::LocalKind;
    use std::path::PathBuf;

    fn digest() -> Digest {
        Digest::of(b"content")
    }

    #[test]
    fn test_identity_folds_namespace() {
        let identity = BuildpackageIdentity {
            id: "sample-buildpack/name".to_string(),
            version: "1.0.0".to_string(),
        };
        let location = Location::parse("registry.io/whatever:tag").unwrap();
        assert_eq!(
            path_segment(Some(&identity), &location),
            "sample-buildpack_name"
        );
    }

    #[test]
    fn test_fallback_to_local_base_name() {
        let location = Location::LocalFile {
            path: PathBuf::from("/tmp/My Buildpack.cnb"),
            kind: LocalKind::Archive,
        };
        assert_eq!(path_segment(None, &location), "my_buildpack");

        let location = Location::LocalFile {
            path: PathBuf::from("/tmp/node-engine.tar.gz"),
            kind: LocalKind::Archive,
        };
        assert_eq!(path_segment(None, &location), "node-engine");
    }

    #[test]
    fn test_fallback_to_registry_name() {
        let location = Location::parse("gcr.io/paketo/go-buildpack:1.0").unwrap();
        assert_eq!(path_segment(None, &location), "go-buildpack");
    }

    #[test]
    fn test_require_repository() {
        require_repository("kpackcr.org/somepath").unwrap();
        for blank in ["", " \t"] {
            let err = require_repository(blank).unwrap_err();
            assert!(matches!(err, KpError::ConfigurationError(_)));
            assert!(err.to_string().contains("default-repository"));
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a+b@c"), "a_b_c");
        assert_eq!(sanitize("Already.Fine-1_2"), "already.fine-1_2");
        assert_eq!(sanitize(""), "artifact");
    }

    #[test]
    fn test_render_with_segment() {
        let reference =
            CanonicalReference::new("kpackcr.org/somepath", Some("sample-buildpack_name"), digest());
        assert_eq!(
            reference.to_string(),
            format!("kpackcr.org/somepath/sample-buildpack_name@{}", digest())
        );
    }

    #[test]
    fn test_render_without_segment() {
        let reference = CanonicalReference::new("kpackcr.org/source/", None, digest());
        assert_eq!(reference.to_string(), format!("kpackcr.org/source@{}", digest()));
    }

    #[test]
    fn test_parse_roundtrip() {
        let rendered = format!("kpackcr.org/somepath/build@{}", digest());
        let parsed = CanonicalReference::parse(&rendered).unwrap();
        assert_eq!(parsed.digest(), &digest());
        assert_eq!(parsed.to_string(), rendered);

        assert!(CanonicalReference::parse("kpackcr.org/somepath/build:latest").is_err());
    }

    #[test]
    fn test_image_reference() {
        let reference = CanonicalReference::new("kpackcr.org/somepath", Some("run"), digest());
        let image = reference.image_reference().unwrap();
        assert_eq!(image.registry, "kpackcr.org");
        assert_eq!(image.repository, "somepath/run");
        assert_eq!(image.tag, None);
        assert_eq!(image.digest.as_deref(), Some(digest().as_str()));
    }
}
