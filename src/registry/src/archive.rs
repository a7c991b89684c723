//! Deterministic tar layers and archive unpacking.
//!
//! Layers are written with entries in sorted order and with timestamps and
//! ownership zeroed, so packing the same tree twice produces identical bytes.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use kp_core::error::{KpError, Result};
use tar::{EntryType, Header};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Write a tar stream of every entry under `root`, in sorted path order.
pub fn tar_directory<W: Write>(root: &Path, out: W) -> Result<W> {
    let mut builder = tar::Builder::new(out);
    builder.follow_symlinks(false);
    append_tree(&mut builder, root, Path::new(""))?;
    builder
        .into_inner()
        .map_err(|e| KpError::Other(format!("Failed to finalize layer: {}", e)))
}

fn append_tree<W: Write>(builder: &mut tar::Builder<W>, root: &Path, relative: &Path) -> Result<()> {
    let current = root.join(relative);
    let mut names: Vec<_> = std::fs::read_dir(&current)
        .map_err(|e| {
            KpError::Other(format!(
                "Failed to read directory {}: {}",
                current.display(),
                e
            ))
        })?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<io::Result<_>>()?;
    names.sort();

    for name in names {
        let rel_path = relative.join(&name);
        let full_path = root.join(&rel_path);
        let metadata = std::fs::symlink_metadata(&full_path)?;
        let file_type = metadata.file_type();

        if file_type.is_symlink() {
            let target = std::fs::read_link(&full_path)?;
            let mut header = normalized_header(EntryType::Symlink, 0o777, 0);
            builder.append_link(&mut header, &rel_path, &target)?;
        } else if file_type.is_dir() {
            let mut header = normalized_header(EntryType::Directory, mode_of(&metadata, 0o755), 0);
            builder.append_data(&mut header, &rel_path, io::empty())?;
            append_tree(builder, root, &rel_path)?;
        } else if file_type.is_file() {
            let mut header =
                normalized_header(EntryType::Regular, mode_of(&metadata, 0o644), metadata.len());
            builder.append_data(&mut header, &rel_path, File::open(&full_path)?)?;
        } else {
            tracing::debug!(path = %full_path.display(), "Skipping special file");
        }
    }

    Ok(())
}

/// Write a tar stream holding the entries of the zip archive at `path`.
///
/// Entries are emitted sorted by name regardless of their order in the zip.
pub fn tar_zip<W: Write>(path: &Path, out: W) -> Result<W> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| zip_error(path, e))?;

    let mut entries: Vec<(PathBuf, usize)> = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| zip_error(path, e))?;
        let Some(name) = entry.enclosed_name().map(Path::to_path_buf) else {
            tracing::debug!(entry = entry.name(), "Skipping zip entry outside archive root");
            continue;
        };
        entries.push((name, i));
    }
    entries.sort();

    let mut builder = tar::Builder::new(out);
    for (name, index) in entries {
        let mut entry = archive.by_index(index).map_err(|e| zip_error(path, e))?;
        let mode = entry.unix_mode().map(|m| m & 0o7777);
        if entry.is_dir() {
            let mut header = normalized_header(EntryType::Directory, mode.unwrap_or(0o755), 0);
            builder.append_data(&mut header, &name, io::empty())?;
        } else {
            // Declared sizes come from the archive; let the reader grow the buffer.
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            let mut header =
                normalized_header(EntryType::Regular, mode.unwrap_or(0o644), data.len() as u64);
            builder.append_data(&mut header, &name, data.as_slice())?;
        }
    }

    builder
        .into_inner()
        .map_err(|e| KpError::Other(format!("Failed to finalize layer: {}", e)))
}

/// Gzip `data` with a zeroed header timestamp.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Whether `bytes` start with the gzip magic number.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Unpack a tar or tar.gz archive into `dest`.
pub fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    let mut file = File::open(archive)?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    let file = File::open(archive)?;

    let result = if is_gzip(&magic[..read]) {
        tar::Archive::new(flate2::read::GzDecoder::new(file)).unpack(dest)
    } else {
        tar::Archive::new(file).unpack(dest)
    };

    result.map_err(|e| {
        KpError::FormatError(format!(
            "'{}' is not a readable tar archive: {}",
            archive.display(),
            e
        ))
    })
}

fn normalized_header(entry_type: EntryType, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

#[cfg(unix)]
fn mode_of(metadata: &std::fs::Metadata, _default: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_metadata: &std::fs::Metadata, default: u32) -> u32 {
    default
}

fn zip_error(path: &Path, err: zip::result::ZipError) -> KpError {
    KpError::FormatError(format!("'{}' is not a valid zip archive: {}", path.display(), err))
}
