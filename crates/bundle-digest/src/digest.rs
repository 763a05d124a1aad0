//! Bundle hashing - fingerprint packaged code for edge versioning
//!
//! Hashes a file or a whole bundle directory into one SHA-256 digest.
//! Bytes are hashed verbatim: unlike source hashing there is no line-ending
//! normalization, because the packaged payload is exactly what ships.

use crate::error::BundleError;
use crate::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Generate a SHA-256 hex digest of a bundle
///
/// A directory is walked recursively; entries are sorted by relative path
/// and each contributes `relative_path \0 bytes \0`, so renames and content
/// edits both change the digest.
pub fn hash_bundle(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();

    if path.is_file() {
        let content = std::fs::read(path)?;
        hasher.update(&content);
    } else if path.is_dir() {
        let mut files = collect_files(path)?;
        files.sort();

        for file in files {
            // Relative path keeps the digest stable across checkout locations
            let relative = file.strip_prefix(path).unwrap_or(&file);
            hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
            hasher.update(b"\0");

            let content = std::fs::read(&file)?;
            hasher.update(&content);
            hasher.update(b"\0");
        }
    } else {
        return Err(BundleError::MissingArtifact(path.to_path_buf()));
    }

    let hash = hex::encode(hasher.finalize());
    debug!(path = %path.display(), "bundle hash: {}", &hash[..12]);
    Ok(hash)
}

/// Total size in bytes of a file or every file under a directory
pub fn bundle_size(path: &Path) -> Result<u64> {
    if path.is_file() {
        return Ok(std::fs::metadata(path)?.len());
    }
    if !path.is_dir() {
        return Err(BundleError::MissingArtifact(path.to_path_buf()));
    }

    let mut total = 0;
    for file in collect_files(path)? {
        total += std::fs::metadata(&file)?.len();
    }
    Ok(total)
}

fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files_recursive(dir, &mut files)?;
    Ok(files)
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files_recursive(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}
