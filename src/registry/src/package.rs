//! Source packager - wrap a directory or zip archive as a single-layer artifact.
//!
//! The tree is written to an intermediate tar inside a scratch directory that
//! is removed on every exit path, then gzipped into the artifact's only layer.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use kp_core::error::{KpError, Result};
use oci_distribution::client::{Config, ImageLayer};
use serde::Serialize;

use crate::archive;
use crate::artifact::{Artifact, Digest, OCI_CONFIG_MEDIA_TYPE, OCI_LAYER_GZIP_MEDIA_TYPE};

const ZIP_MAGIC: &[&[u8]] = &[b"PK\x03\x04", b"PK\x05\x06"];

/// Config blob of a packaged source artifact.
#[derive(Debug, Serialize)]
struct SourceConfig<'a> {
    architecture: &'a str,
    os: &'a str,
    config: EmptyObject,
    rootfs: RootFs,
}

#[derive(Debug, Serialize)]
struct EmptyObject {}

#[derive(Debug, Serialize)]
struct RootFs {
    #[serde(rename = "type")]
    kind: &'static str,
    diff_ids: Vec<String>,
}

/// Package the directory or zip archive at `path`.
pub fn package(path: &Path) -> Result<Artifact> {
    let scratch = tempfile::tempdir()?;
    let tar_path = scratch.path().join("layer.tar");

    let writer = BufWriter::new(File::create(&tar_path)?);
    let mut writer = if path.is_dir() {
        tracing::debug!(path = %path.display(), "Packaging directory");
        archive::tar_directory(path, writer)?
    } else if is_zip(path)? {
        tracing::debug!(path = %path.display(), "Packaging zip archive");
        archive::tar_zip(path, writer)?
    } else {
        return Err(KpError::FormatError(format!(
            "'{}' is neither a directory nor a zip archive",
            path.display()
        )));
    };
    writer.flush()?;
    drop(writer);

    let tar_bytes = std::fs::read(&tar_path)?;
    let diff_id = Digest::of(&tar_bytes);
    let layer = ImageLayer::new(
        archive::gzip(&tar_bytes)?,
        OCI_LAYER_GZIP_MEDIA_TYPE.to_string(),
        None,
    );

    let config = SourceConfig {
        architecture: "amd64",
        os: "linux",
        config: EmptyObject {},
        rootfs: RootFs {
            kind: "layers",
            diff_ids: vec![diff_id.to_string()],
        },
    };
    let config = Config::new(
        serde_json::to_vec(&config)?,
        OCI_CONFIG_MEDIA_TYPE.to_string(),
        None,
    );

    Artifact::from_blobs(config, vec![layer])
}

/// Whether `path` starts with a zip signature.
fn is_zip(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path).map_err(|e| {
        KpError::NotFoundError(format!("cannot open source '{}': {}", path.display(), e))
    })?;
    let read = file.read(&mut magic)?;
    Ok(ZIP_MAGIC.iter().any(|m| magic[..read] == **m))
}
