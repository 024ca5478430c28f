//! Moving build output to where the runtime loads it from

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::core::{Error, Result};

/// Build by-products that are never staged
const SKIPPED_EXTENSIONS: &[&str] = &["meta", "manifest"];

/// Recursively copy `source` into `destination`, overwriting existing files
///
/// Returns the number of files copied.
pub fn copy_folder(source: &Path, destination: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source folder {} does not exist", source.display()),
        )));
    }

    std::fs::create_dir_all(destination)?;

    let mut copied = 0;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let target = destination.join(entry.file_name());

        if path.is_dir() {
            copied += copy_folder(&path, &target)?;
        } else if !is_skipped(&path) {
            std::fs::copy(&path, &target)?;
            copied += 1;
        }
    }

    log::debug!("Copied {} files from {} to {}", copied, source.display(), destination.display());
    Ok(copied)
}

/// Copy one file, creating the destination directory when needed
pub fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    if !source.is_file() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source file {} does not exist", source.display()),
        )));
    }
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(source, destination)?;
    Ok(())
}

/// Delete `dir` and everything in it; a missing directory is not an error
pub fn clear_dir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            log::info!("Cleared {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Lower-case hex SHA-256 of a file's contents
pub fn file_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(to_hex(&hasher.finalize()))
}

/// Lower-case hex SHA-256 of `data`
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    to_hex(&hasher.finalize())
}

fn to_hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn is_skipped(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SKIPPED_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)))
}
