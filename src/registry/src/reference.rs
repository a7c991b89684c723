//! Location and OCI image reference parsing.
//!
//! A location string is either a path on the local filesystem (a directory,
//! a zip archive, or a packaged artifact archive such as a `.cnb` bundle) or a
//! registry reference like `ghcr.io/org/image:tag@sha256:...`. Parsing never
//! touches the network.

use std::fmt;
use std::path::{Path, PathBuf};

use kp_core::error::{KpError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Extensions read as zip archives.
const ZIP_EXTENSIONS: &[&str] = &["zip", "jar"];

/// Extensions stripped from local file names when deriving a path segment.
pub(crate) const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".tar", ".cnb", ".zip", ".jar"];

/// Parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "paketo/builder")
    pub repository: String,
    /// Tag (e.g., "latest", "v0.1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `myuser/myimage:v1` → docker.io/myuser/myimage:v1
    /// - `ghcr.io/org/image:tag` → ghcr.io/org/image:tag
    /// - `registry:5000/org/image@sha256:abc...` → registry:5000/org/image@sha256:abc...
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(KpError::FormatError("empty image reference".to_string()));
        }

        // Split off digest first (@ separator)
        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name_tag, digest)) => {
                validate_digest(reference, digest)?;
                (name_tag, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // Tag is the part after the last colon that follows the last slash;
        // a colon before any slash is a registry port.
        let last_component_start = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_component_start..].rfind(':') {
            Some(colon) => {
                let colon = last_component_start + colon;
                let tag = &name_tag[colon + 1..];
                if last_component_start == 0 && tag.chars().all(|c| c.is_ascii_digit()) {
                    // `host:5000` with no repository is not a tag
                    (name_tag, None)
                } else {
                    (&name_tag[..colon], Some(tag.to_string()))
                }
            }
            None => (name_tag, None),
        };

        if let Some(ref tag) = tag {
            validate_tag(reference, tag)?;
        }

        let (registry, repository) = split_registry_repository(reference, name)?;

        // Apply default tag if no tag and no digest
        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Last component of the repository path (`org/sub/image` → `image`).
    pub fn name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// `registry/repository` without tag or digest.
    pub fn repository_path(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Same repository, addressed by `tag` only.
    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: Some(tag.to_string()),
            digest: None,
        }
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = self.repository_path();
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Split a name into registry and repository components.
fn split_registry_repository(reference: &str, name: &str) -> Result<(String, String)> {
    // The first component is a registry host if it has a dot, a port, or is localhost
    let (registry, repository) = match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        }
        _ if name.contains('/') => (DEFAULT_REGISTRY.to_string(), name.to_string()),
        // Single name like "nginx" → "library/nginx" on Docker Hub
        _ => (DEFAULT_REGISTRY.to_string(), format!("library/{}", name)),
    };

    if repository.is_empty() {
        return Err(KpError::FormatError(format!(
            "empty repository in reference '{}'",
            reference
        )));
    }

    let valid_component = |c: &str| {
        !c.is_empty()
            && c.chars().all(|ch| {
                ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '.' | '_' | '-')
            })
            && c.starts_with(|ch: char| ch.is_ascii_alphanumeric())
    };
    if !repository.split('/').all(valid_component) {
        return Err(KpError::FormatError(format!(
            "invalid repository '{}' in reference '{}'",
            repository, reference
        )));
    }

    Ok((registry, repository))
}

fn validate_tag(reference: &str, tag: &str) -> Result<()> {
    let valid = !tag.is_empty()
        && tag.len() <= 128
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && !tag.starts_with(['.', '-']);
    if valid {
        Ok(())
    } else {
        Err(KpError::FormatError(format!(
            "invalid tag '{}' in reference '{}'",
            tag, reference
        )))
    }
}

fn validate_digest(reference: &str, digest: &str) -> Result<()> {
    let Some((algorithm, encoded)) = digest.split_once(':') else {
        return Err(KpError::FormatError(format!(
            "invalid digest format in reference '{}': expected algorithm:hex",
            reference
        )));
    };
    let valid = match algorithm {
        "sha256" => encoded.len() == 64 && encoded.chars().all(|c| c.is_ascii_hexdigit()),
        _ => !algorithm.is_empty() && !encoded.is_empty(),
    };
    if valid {
        Ok(())
    } else {
        Err(KpError::FormatError(format!(
            "invalid digest '{}' in reference '{}'",
            digest, reference
        )))
    }
}

/// How a local path is turned into an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    /// Plain directory (packaged as a single layer), or an OCI layout directory
    Directory,
    /// Zip archive (re-expanded into a tar layer)
    Zip,
    /// Tar archive holding an OCI layout or a `docker save` image (`.cnb`, `.tar`, `.tgz`)
    Archive,
}

/// Where an artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A path on the local filesystem
    LocalFile { path: PathBuf, kind: LocalKind },
    /// A reference into a container registry
    RegistryRef(ImageReference),
}

impl Location {
    /// Classify a location string.
    ///
    /// Existing local paths win; anything else must parse as a registry reference.
    pub fn parse(location: &str) -> Result<Self> {
        let trimmed = location.trim();
        if trimmed.is_empty() {
            return Err(KpError::FormatError("empty location".to_string()));
        }

        let path = Path::new(trimmed);
        if path.exists() {
            let kind = if path.is_dir() {
                LocalKind::Directory
            } else if has_extension(path, ZIP_EXTENSIONS) {
                LocalKind::Zip
            } else {
                LocalKind::Archive
            };
            return Ok(Location::LocalFile {
                path: path.to_path_buf(),
                kind,
            });
        }

        ImageReference::parse(trimmed)
            .map(Location::RegistryRef)
            .map_err(|e| match e {
                KpError::FormatError(msg) => KpError::FormatError(format!(
                    "'{}' is neither an existing path nor a valid image reference: {}",
                    trimmed, msg
                )),
                other => other,
            })
    }

    /// Base name used when the artifact carries no identity.
    ///
    /// Local files use their file name minus known archive extensions;
    /// registry references use the last repository component.
    pub fn base_name(&self) -> String {
        match self {
            Location::LocalFile { path, .. } => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let lower = file_name.to_ascii_lowercase();
                ARCHIVE_EXTENSIONS
                    .iter()
                    .find(|ext| lower.ends_with(*ext) && lower.len() > ext.len())
                    .map(|ext| file_name[..file_name.len() - ext.len()].to_string())
                    .unwrap_or(file_name)
            }
            Location::RegistryRef(reference) => reference.name().to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Location::LocalFile { .. })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::LocalFile { path, .. } => write!(f, "{}", path.display()),
            Location::RegistryRef(reference) => write!(f, "{}", reference),
        }
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}
